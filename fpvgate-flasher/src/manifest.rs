//! Flash manifest assembly.

use fpvgate_config::{
    BoardDefinition, ChipFamily, ReleaseDescriptor,
    manifest::{Build, Manifest, Part},
};

use crate::{Error, Result, resolver::ResolvedSegment};

/// Everything needed to flash one board with one release. Built fresh for every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashManifest {
    display_name: String,
    version: String,
    chip_family: ChipFamily,
    segments: Vec<ResolvedSegment>,
}

impl FlashManifest {
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub const fn chip_family(&self) -> ChipFamily {
        self.chip_family
    }

    /// Segments in ascending offset order.
    pub fn segments(&self) -> &[ResolvedSegment] {
        &self.segments
    }

    /// Manifest in the form consumed by device programmers.
    pub fn to_wire(&self) -> Manifest {
        Manifest {
            name: self.display_name.clone(),
            version: self.version.clone(),
            chip_family: self.chip_family,
            new_install_prompt_erase: true,
            builds: vec![Build {
                chip_family: self.chip_family,
                parts: self
                    .segments
                    .iter()
                    .map(|x| Part {
                        path: x.source.manifest_path(&x.role),
                        offset: x.offset,
                    })
                    .collect(),
            }],
        }
    }

    pub fn to_json(&self) -> fpvgate_config::Result<String> {
        self.to_wire().to_json()
    }
}

/// Combines a board layout with resolved segments.
#[derive(Debug, Clone, Default)]
pub struct ManifestBuilder {
    product_name: Option<String>,
}

impl ManifestBuilder {
    pub const fn new() -> Self {
        Self { product_name: None }
    }

    /// Prefix the display name with `name`.
    pub fn with_product_name(name: impl Into<String>) -> Self {
        Self {
            product_name: Some(name.into()),
        }
    }

    /// Fails if `resolved` does not match the board segments one to one, in order.
    pub fn build(
        &self,
        board: &BoardDefinition,
        release: &ReleaseDescriptor,
        resolved: Vec<ResolvedSegment>,
    ) -> Result<FlashManifest> {
        let expected = board.segments();

        if expected.len() != resolved.len() {
            return Err(Error::IncompleteManifest {
                reason: format!(
                    "{} has {} segments but {} were resolved",
                    board.id(),
                    expected.len(),
                    resolved.len()
                ),
            });
        }

        if let Some((e, r)) = expected
            .iter()
            .zip(&resolved)
            .find(|(e, r)| e.role() != r.role || e.offset() != r.offset)
        {
            return Err(Error::IncompleteManifest {
                reason: format!(
                    "expected {} at {:#x}, got {} at {:#x}",
                    e.role(),
                    e.offset(),
                    r.role,
                    r.offset
                ),
            });
        }

        let display_name = match &self.product_name {
            Some(name) => format!("{name} {}", release.tag),
            None => release.tag.clone(),
        };

        Ok(FlashManifest {
            display_name,
            version: release.tag.clone(),
            chip_family: board.chip_family(),
            segments: resolved,
        })
    }
}
