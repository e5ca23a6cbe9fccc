//! Release catalog.

use std::sync::Arc;

use fpvgate_config::{ReleaseDescriptor, release::ReleaseListJson};
use fpvgate_downloader::Fetch;
use url::Url;

use crate::{Catalog, Error, Result};

/// Published firmware releases. Unlike boards there is nothing to fall back on, so fetch errors
/// are returned to the caller.
#[derive(Debug)]
pub struct ReleaseCatalog<F> {
    fetcher: F,
    url: Url,
    releases: Option<Arc<[ReleaseDescriptor]>>,
}

impl<F: Fetch> ReleaseCatalog<F> {
    pub const fn new(fetcher: F, url: Url) -> Self {
        Self {
            fetcher,
            url,
            releases: None,
        }
    }

    /// Eligible releases in remote order. Only a successful fetch is cached.
    pub async fn load(&mut self) -> Result<Arc<[ReleaseDescriptor]>> {
        if let Some(x) = &self.releases {
            return Ok(x.clone());
        }

        let list: ReleaseListJson = self.fetcher.fetch_json(&self.url).await.map_err(|e| {
            tracing::error!("Failed to fetch releases: {e}");
            Error::CatalogUnavailable {
                catalog: Catalog::Releases,
                source: e,
            }
        })?;

        let total = list.0.len();
        let releases: Arc<[ReleaseDescriptor]> = list.into_releases().into();
        tracing::info!("Loaded {} of {total} releases", releases.len());

        self.releases = Some(releases.clone());
        Ok(releases)
    }
}

impl<F> ReleaseCatalog<F> {
    /// Loaded releases. Empty before a successful [`ReleaseCatalog::load`].
    pub fn releases(&self) -> &[ReleaseDescriptor] {
        self.releases.as_deref().unwrap_or_default()
    }

    /// First stable release, or the first release if all are pre-releases.
    pub fn latest_stable(&self) -> Option<&ReleaseDescriptor> {
        fpvgate_config::release::latest_stable(self.releases())
    }

    pub fn get(&self, tag: &str) -> Option<&ReleaseDescriptor> {
        self.releases().iter().find(|x| x.tag == tag)
    }
}
