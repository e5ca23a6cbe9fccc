//! # Introduction
//!
//! This crate turns FPVGate board and release catalogs into flash manifests and drives flashing
//! sessions against a device programming driver. It is used by the FPVGate flasher CLI and can be
//! used by any other front end.
//!
//! The main pieces are:
//!
//! - [`BoardCatalog`] and [`ReleaseCatalog`]: remote catalogs with in-memory caching.
//! - [`SelectionState`]: the board, release and option choices of the user.
//! - [`AssetResolver`]: maps each board segment to a binary using ordered hosting strategies.
//! - [`ManifestBuilder`]: combines a board layout with resolved segments.
//! - [`FlashSession`]: the connect, erase, write, verify state machine.
//!
//! [`Orchestrator`] ties them together.
//!
//! # Usage
//!
//! ```no_run
//! use fpvgate_flasher::{FileDriver, FlashController, FlasherConfig, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = FlasherConfig::default();
//!     let downloader = fpvgate_downloader::Downloader::new(config.connect_timeout()).unwrap();
//!     let mut orch = Orchestrator::new(config, downloader);
//!
//!     orch.initialize().await.unwrap();
//!     orch.selection_mut().select_board("esp32s3").unwrap();
//!
//!     let controller = FlashController::new(FileDriver::new("/tmp/flash.bin", 8 * 1024 * 1024));
//!     orch.flash(&controller, None, CancellationToken::new())
//!         .await
//!         .unwrap();
//! }
//! ```

mod boards;
mod config;
mod device;
pub mod driver;
mod error;
mod manifest;
mod orchestrator;
mod releases;
pub mod resolver;
pub mod selection;
mod session;

pub use boards::BoardCatalog;
pub use config::FlasherConfig;
pub use device::{DeviceAddress, DeviceLocator};
pub use driver::{FileDriver, FlashDriver};
pub use error::{Catalog, Error, FlashError, Result};
pub use manifest::{FlashManifest, ManifestBuilder};
pub use orchestrator::{Orchestrator, ReleaseListing, ReleaseOption};
pub use releases::ReleaseCatalog;
pub use resolver::{AssetResolver, ResolutionStrategy, ResolvedSegment};
pub use selection::{CustomRole, SelectionError, SelectionState};
pub use session::{FlashController, FlashEvent, FlashOptions, FlashSession, FlashState, LogLine};
