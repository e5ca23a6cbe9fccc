//! Glue between the catalogs, the user selection and manifest building.

use std::sync::Arc;

use fpvgate_config::{BoardDefinition, ReleaseDescriptor};
use fpvgate_downloader::Fetch;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    BoardCatalog, DeviceLocator, Error, FlashController, FlashEvent, FlashManifest, FlashOptions,
    FlasherConfig, ManifestBuilder, ReleaseCatalog, Result,
    driver::FlashDriver,
    resolver::{AssetResolver, Resolution},
    selection::SelectionState,
};

const LOAD_FAILED: &str = "Failed to load versions";
const NO_RELEASES: &str = "No versions available";

/// State of the release list offered to the user.
#[derive(Debug, Clone, Default)]
pub enum ReleaseListing {
    #[default]
    NotLoaded,
    Loaded(Arc<[ReleaseDescriptor]>),
    Failed,
}

/// Entry of the version selector. Placeholders have no tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseOption {
    pub tag: Option<String>,
    pub label: String,
    pub info: Option<String>,
}

impl ReleaseOption {
    fn placeholder(label: &str) -> Self {
        Self {
            tag: None,
            label: label.to_string(),
            info: None,
        }
    }
}

pub struct Orchestrator<F> {
    config: FlasherConfig,
    fetcher: F,
    boards: BoardCatalog<F>,
    releases: ReleaseCatalog<F>,
    listing: ReleaseListing,
    resolver: AssetResolver,
    builder: ManifestBuilder,
    selection: SelectionState,
}

impl<F: Fetch + Clone> Orchestrator<F> {
    pub fn new(config: FlasherConfig, fetcher: F) -> Self {
        let builder = if config.product_name.is_empty() {
            ManifestBuilder::new()
        } else {
            ManifestBuilder::with_product_name(config.product_name.clone())
        };

        Self {
            boards: BoardCatalog::new(fetcher.clone(), config.boards_url.clone()),
            releases: ReleaseCatalog::new(fetcher.clone(), config.releases_url.clone()),
            listing: ReleaseListing::NotLoaded,
            resolver: AssetResolver::from_config(&config),
            builder,
            selection: SelectionState::new(),
            fetcher,
            config,
        }
    }

    /// Load both catalogs.
    ///
    /// The board catalog always succeeds. A release catalog failure leaves the listing in
    /// [`ReleaseListing::Failed`] and is returned.
    pub async fn initialize(&mut self) -> Result<()> {
        self.load_boards().await;
        self.load_releases().await
    }

    /// Load the board catalog, falling back to the built-in boards.
    pub async fn load_boards(&mut self) {
        let boards = self.boards.load().await;
        self.selection.set_known_boards(boards.iter());
    }

    /// Load the release catalog and select the latest stable release if nothing is selected.
    pub async fn load_releases(&mut self) -> Result<()> {
        match self.releases.load().await {
            Ok(releases) => {
                self.selection
                    .set_known_releases(releases.iter().map(|x| x.tag.as_str()));

                if self.selection.release_tag().is_none() {
                    if let Some(latest) = fpvgate_config::release::latest_stable(&releases) {
                        tracing::info!("Selecting latest release {}", latest.tag);
                        self.selection.select_release(&latest.tag)?;
                    }
                }

                self.listing = ReleaseListing::Loaded(releases);
                Ok(())
            }
            Err(e) => {
                self.listing = ReleaseListing::Failed;
                self.selection.set_known_releases([]);
                Err(e)
            }
        }
    }

    /// Build a manifest for the current selection.
    pub fn prepare_manifest(&self) -> Result<FlashManifest> {
        let (board, release) = self.pairing()?;
        let res = self.resolve_pair(board, release)?;

        self.builder.build(board, release, res.resolved)
    }

    /// Prepare a manifest and run a session on `controller`.
    pub async fn flash<D: FlashDriver>(
        &self,
        controller: &FlashController<D>,
        events: Option<mpsc::UnboundedSender<FlashEvent>>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let manifest = self.prepare_manifest()?;

        controller
            .start(
                self.fetcher.clone(),
                &manifest,
                self.flash_options(),
                events,
                cancel,
            )
            .await
    }
}

impl<F> Orchestrator<F> {
    pub const fn config(&self) -> &FlasherConfig {
        &self.config
    }

    pub const fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub const fn boards(&self) -> &BoardCatalog<F> {
        &self.boards
    }

    pub const fn releases(&self) -> &ReleaseCatalog<F> {
        &self.releases
    }

    pub const fn listing(&self) -> &ReleaseListing {
        &self.listing
    }

    pub const fn resolver(&self) -> &AssetResolver {
        &self.resolver
    }

    pub const fn selection(&self) -> &SelectionState {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionState {
        &mut self.selection
    }

    /// Boards visible in the current tier.
    pub fn board_options(&self) -> Vec<&BoardDefinition> {
        self.boards.list_for(self.selection.visibility_tier())
    }

    /// Version selector entries. The first release is marked as latest.
    pub fn release_options(&self) -> Vec<ReleaseOption> {
        match &self.listing {
            ReleaseListing::NotLoaded => Vec::new(),
            ReleaseListing::Failed => vec![ReleaseOption::placeholder(LOAD_FAILED)],
            ReleaseListing::Loaded(x) if x.is_empty() => {
                vec![ReleaseOption::placeholder(NO_RELEASES)]
            }
            ReleaseListing::Loaded(x) => x
                .iter()
                .enumerate()
                .map(|(i, r)| ReleaseOption {
                    tag: Some(r.tag.clone()),
                    label: r.label(i == 0),
                    info: Some(r.info()),
                })
                .collect(),
        }
    }

    pub const fn flash_options(&self) -> FlashOptions {
        self.selection.flash_options()
    }

    pub fn device_locator(&self) -> DeviceLocator {
        DeviceLocator::from_config(&self.config)
    }

    /// Resolve the segments of the current selection.
    pub fn resolve(&self) -> Result<Resolution> {
        let (board, release) = self.pairing()?;
        self.resolve_pair(board, release)
    }

    fn pairing(&self) -> Result<(&BoardDefinition, &ReleaseDescriptor)> {
        if !self.selection.is_ready() {
            return Err(Error::NotReady);
        }

        let board_id = self.selection.board_id().unwrap_or_default();
        let tag = self.selection.release_tag().unwrap_or_default();

        match (self.boards.get(board_id), self.releases.get(tag)) {
            (Some(board), Some(release)) => Ok((board, release)),
            _ => {
                tracing::error!("Cannot pair board {board_id} with release {tag}");
                Err(Error::AssetResolutionAmbiguous {
                    board: board_id.to_string(),
                    release: tag.to_string(),
                    missing: Vec::new(),
                })
            }
        }
    }

    fn resolve_pair(
        &self,
        board: &BoardDefinition,
        release: &ReleaseDescriptor,
    ) -> Result<Resolution> {
        let res = self
            .resolver
            .resolve(board, release, self.selection.custom_binaries());

        if res.is_complete() {
            Ok(res)
        } else {
            Err(Error::AssetResolutionAmbiguous {
                board: board.id().to_string(),
                release: release.tag.clone(),
                missing: res.missing.into_iter().collect(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use fpvgate_downloader::MemoryFetcher;

    use super::*;

    #[tokio::test]
    async fn not_ready_without_selection() {
        let config = FlasherConfig::default();
        let fetcher = MemoryFetcher::new()
            .with_status(config.boards_url.clone(), 404)
            .with_body(config.releases_url.clone(), "[]");
        let mut orch = Orchestrator::new(config, fetcher);

        orch.initialize().await.unwrap();

        assert!(orch.boards().is_fallback());
        assert_eq!(
            orch.release_options(),
            [ReleaseOption::placeholder(NO_RELEASES)]
        );
        assert!(matches!(orch.prepare_manifest(), Err(Error::NotReady)));
        assert!(matches!(orch.resolve(), Err(Error::NotReady)));
    }
}
