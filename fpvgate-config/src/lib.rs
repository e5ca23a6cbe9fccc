//! # Introduction
//!
//! FPVGate publishes a `boards.json` describing every supported board (chip family and flash
//! partition layout) and ships firmware as GitHub releases. This crate provides strongly typed
//! abstractions for both catalogs along with the flash manifest consumed by device programmers.
//!
//! Remote documents are parsed into loose wire shapes first and then validated into the typed
//! model, so malformed entries are dropped at the boundary instead of leaking inward.
//!
//! # Usage
//!
//! ```
//! let data = br#"{ "boards": [ { "value": "esp32c3", "label": "ESP32-C3", "expert_mode": 1 } ] }"#;
//! let catalog = fpvgate_config::board::BoardCatalogJson::from_json(data).unwrap();
//! let (boards, rejected) = catalog.into_boards();
//!
//! assert_eq!(boards.len(), 1);
//! assert!(rejected.is_empty());
//! ```

pub mod board;
mod error;
pub mod manifest;
pub mod release;

/// URL for the FPVGate `boards.json` file
pub const BOARDS_URL: &str =
    "https://raw.githubusercontent.com/LouisHitchcock/FPVGate/main/boards.json";

/// URL for the FPVGate GitHub releases API
pub const RELEASES_URL: &str = "https://api.github.com/repos/LouisHitchcock/FPVGate/releases";

pub use board::{BoardDefinition, ChipFamily, Segment, VisibilityTier};
pub use error::{Error, Result};
pub use release::{ReleaseAsset, ReleaseDescriptor};
