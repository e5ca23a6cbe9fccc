//! Board catalog with built-in fallback.

use std::sync::Arc;

use fpvgate_config::{BoardDefinition, VisibilityTier, board::BoardCatalogJson};
use fpvgate_downloader::Fetch;
use url::Url;

/// Remote board catalog. Never fails: any fetch or parse problem substitutes the built-in boards.
#[derive(Debug)]
pub struct BoardCatalog<F> {
    fetcher: F,
    url: Url,
    boards: Option<Arc<[BoardDefinition]>>,
    fallback: bool,
}

impl<F: Fetch> BoardCatalog<F> {
    pub const fn new(fetcher: F, url: Url) -> Self {
        Self {
            fetcher,
            url,
            boards: None,
            fallback: false,
        }
    }

    /// Fetch the catalog on first call. Later calls return the cached boards.
    pub async fn load(&mut self) -> Arc<[BoardDefinition]> {
        if let Some(x) = &self.boards {
            return x.clone();
        }

        let boards: Arc<[BoardDefinition]> = match self.fetch().await {
            Some(x) => x.into(),
            None => {
                tracing::warn!("Using built-in board catalog");
                self.fallback = true;
                fpvgate_config::board::fallback_boards().into()
            }
        };

        tracing::info!("Loaded {} boards", boards.len());
        self.boards = Some(boards.clone());
        boards
    }

    async fn fetch(&self) -> Option<Vec<BoardDefinition>> {
        let catalog: BoardCatalogJson = match self.fetcher.fetch_json(&self.url).await {
            Ok(x) => x,
            Err(e) => {
                tracing::warn!("Failed to fetch board catalog: {e}");
                return None;
            }
        };

        let (boards, rejected) = catalog.into_boards();
        for e in rejected {
            tracing::warn!("Skipping board: {e}");
        }

        if boards.is_empty() {
            tracing::warn!("Board catalog has no usable entries");
            None
        } else {
            Some(boards)
        }
    }
}

impl<F> BoardCatalog<F> {
    /// Loaded boards. Empty before [`BoardCatalog::load`].
    pub fn boards(&self) -> &[BoardDefinition] {
        self.boards.as_deref().unwrap_or_default()
    }

    /// Boards visible in `tier`, standard boards first.
    pub fn list_for(&self, tier: VisibilityTier) -> Vec<&BoardDefinition> {
        let boards = self.boards();

        boards
            .iter()
            .filter(|x| x.tier() == VisibilityTier::Standard)
            .chain(
                boards
                    .iter()
                    .filter(|x| x.tier() != VisibilityTier::Standard),
            )
            .filter(|x| tier.includes(x.tier()))
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&BoardDefinition> {
        self.boards().iter().find(|x| x.id() == id)
    }

    /// The built-in boards are in use because the remote catalog was unusable.
    pub const fn is_fallback(&self) -> bool {
        self.fallback
    }
}
