//! Resolve board segments to fetchable binaries.
//!
//! Each segment is offered to an ordered list of [`Strategy`] implementations and the first one
//! producing a location wins. The default order is:
//!
//! 1. A binary uploaded by the user.
//! 2. A release asset whose name matches `<prefix>-<role>.bin`.
//! 3. The locally hosted firmware directory, if configured.
//! 4. The CDN mirror, if configured.
//! 5. The release download path `{base}/{version}/{file}`.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use fpvgate_config::{BoardDefinition, ReleaseDescriptor, Segment};
use serde::Serialize;
use url::Url;

use crate::{
    FlasherConfig,
    selection::{CustomBinary, CustomRole},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionStrategy {
    LocalHosted,
    OriginRelease,
    CdnMirror,
    UserUpload,
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalHosted => f.write_str("local-hosted"),
            Self::OriginRelease => f.write_str("origin-release"),
            Self::CdnMirror => f.write_str("cdn-mirror"),
            Self::UserUpload => f.write_str("user-upload"),
        }
    }
}

/// Where the bytes of a segment come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentSource {
    Remote(Url),
    Upload(CustomBinary),
}

impl SegmentSource {
    /// Path as written into the manifest. Uploads become `blob:<role>/<name>` references.
    pub fn manifest_path(&self, role: &str) -> String {
        match self {
            Self::Remote(url) => url.to_string(),
            Self::Upload(bin) => format!("blob:{role}/{}", bin.name()),
        }
    }
}

impl fmt::Display for SegmentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => url.fmt(f),
            Self::Upload(bin) => write!(f, "upload {}", bin.name()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSegment {
    pub role: String,
    pub offset: u32,
    pub source: SegmentSource,
    pub strategy: ResolutionStrategy,
}

/// Everything a strategy needs to locate one segment.
#[derive(Debug, Clone, Copy)]
pub struct SegmentRequest<'a> {
    pub board: &'a BoardDefinition,
    pub release: &'a ReleaseDescriptor,
    pub segment: &'a Segment,
    pub custom: &'a BTreeMap<CustomRole, CustomBinary>,
}

impl SegmentRequest<'_> {
    /// `<prefix>-<role>.bin`
    pub fn file_name(&self) -> String {
        self.board.expected_file_name(self.segment)
    }
}

/// A way of hosting firmware binaries.
pub trait Strategy: fmt::Debug + Send + Sync {
    fn kind(&self) -> ResolutionStrategy;

    /// Location of the segment, or `None` to defer to the next strategy. Must not do I/O.
    fn locate(&self, req: &SegmentRequest<'_>) -> Option<SegmentSource>;
}

/// Binaries uploaded by the user replace firmware and filesystem segments.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserUpload;

impl Strategy for UserUpload {
    fn kind(&self) -> ResolutionStrategy {
        ResolutionStrategy::UserUpload
    }

    fn locate(&self, req: &SegmentRequest<'_>) -> Option<SegmentSource> {
        let role = CustomRole::for_segment(req.segment.role())?;
        req.custom
            .get(&role)
            .map(|x| SegmentSource::Upload(x.clone()))
    }
}

/// Direct download location of a matching release asset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseAssets;

impl Strategy for ReleaseAssets {
    fn kind(&self) -> ResolutionStrategy {
        ResolutionStrategy::OriginRelease
    }

    fn locate(&self, req: &SegmentRequest<'_>) -> Option<SegmentSource> {
        req.release
            .asset(&req.file_name())
            .map(|x| SegmentSource::Remote(x.download_url.clone()))
    }
}

/// `{base}/{version}/{file}`. Always produces a URL for bases which can carry a path, so nothing
/// tells in advance whether it is reachable.
#[derive(Debug, Clone)]
pub struct ArchivePath {
    base: Url,
    kind: ResolutionStrategy,
}

impl ArchivePath {
    pub const fn new(base: Url, kind: ResolutionStrategy) -> Self {
        Self { base, kind }
    }

    pub const fn local(base: Url) -> Self {
        Self::new(base, ResolutionStrategy::LocalHosted)
    }

    pub const fn cdn(base: Url) -> Self {
        Self::new(base, ResolutionStrategy::CdnMirror)
    }

    pub const fn origin(base: Url) -> Self {
        Self::new(base, ResolutionStrategy::OriginRelease)
    }
}

impl Strategy for ArchivePath {
    fn kind(&self) -> ResolutionStrategy {
        self.kind
    }

    fn locate(&self, req: &SegmentRequest<'_>) -> Option<SegmentSource> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .ok()?
            .pop_if_empty()
            .push(&req.release.tag)
            .push(&req.file_name());

        Some(SegmentSource::Remote(url))
    }
}

/// Result of resolving every segment of a board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Resolved segments in board order
    pub resolved: Vec<ResolvedSegment>,
    /// Roles no strategy could locate
    pub missing: BTreeSet<String>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

#[derive(Debug)]
pub struct AssetResolver {
    strategies: Vec<Box<dyn Strategy>>,
}

impl AssetResolver {
    pub fn new(strategies: Vec<Box<dyn Strategy>>) -> Self {
        Self { strategies }
    }

    pub fn from_config(config: &FlasherConfig) -> Self {
        let mut strategies: Vec<Box<dyn Strategy>> = vec![Box::new(UserUpload), Box::new(ReleaseAssets)];

        if let Some(local) = &config.local_firmware_url {
            strategies.push(Box::new(ArchivePath::local(local.clone())));
        }
        if let Some(cdn) = &config.cdn_mirror_url {
            strategies.push(Box::new(ArchivePath::cdn(cdn.clone())));
        }
        strategies.push(Box::new(ArchivePath::origin(config.asset_base_url.clone())));

        Self::new(strategies)
    }

    /// Strategies in evaluation order.
    pub fn strategies(&self) -> impl Iterator<Item = ResolutionStrategy> + '_ {
        self.strategies.iter().map(|x| x.kind())
    }

    /// Resolve every segment of `board`. Deterministic for equal inputs.
    pub fn resolve(
        &self,
        board: &BoardDefinition,
        release: &ReleaseDescriptor,
        custom: &BTreeMap<CustomRole, CustomBinary>,
    ) -> Resolution {
        let mut res = Resolution::default();

        for segment in board.segments() {
            let req = SegmentRequest {
                board,
                release,
                segment,
                custom,
            };

            let found = self
                .strategies
                .iter()
                .find_map(|s| s.locate(&req).map(|source| (s.kind(), source)));

            match found {
                Some((strategy, source)) => {
                    tracing::debug!("{} resolved through {strategy}: {source}", segment.role());
                    res.resolved.push(ResolvedSegment {
                        role: segment.role().to_string(),
                        offset: segment.offset(),
                        source,
                        strategy,
                    });
                }
                None => {
                    tracing::warn!("No source for {} of {}", segment.role(), board.id());
                    res.missing.insert(segment.role().to_string());
                }
            }
        }

        res
    }
}

impl Default for AssetResolver {
    fn default() -> Self {
        Self::from_config(&FlasherConfig::default())
    }
}
