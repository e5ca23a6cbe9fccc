//! Error types for this crate

use std::{fmt, io, sync::Arc};

use thiserror::Error;

use crate::selection::SelectionError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Catalog {
    Boards,
    Releases,
}

impl fmt::Display for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boards => f.write_str("board"),
            Self::Releases => f.write_str("release"),
        }
    }
}

/// Errors raised while preparing a flash.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to load {catalog} catalog")]
    CatalogUnavailable {
        catalog: Catalog,
        #[source]
        source: fpvgate_downloader::Error,
    },
    /// The board id or release tag does not refer to a known entry.
    #[error("Board {board:?} cannot be paired with release {release:?}")]
    AssetResolutionAmbiguous {
        board: String,
        release: String,
        missing: Vec<String>,
    },
    /// Resolved segments do not line up with the board layout. This is a bug.
    #[error("Manifest does not match board layout: {reason}")]
    IncompleteManifest { reason: String },
    #[error(transparent)]
    InvalidSelection(#[from] SelectionError),
    #[error("No board or firmware version selected")]
    NotReady,
    #[error("A flashing session is already in progress")]
    SessionBusy,
    #[error(transparent)]
    Flash(#[from] FlashError),
}

impl Error {
    /// Single sentence suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::CatalogUnavailable {
                catalog: Catalog::Releases,
                ..
            } => "Failed to load firmware versions. Please try again later.".to_string(),
            Self::CatalogUnavailable {
                catalog: Catalog::Boards,
                ..
            } => "Failed to load the board list. Please try again later.".to_string(),
            Self::AssetResolutionAmbiguous { .. } => {
                "The selected board and firmware version do not match. Please select them again."
                    .to_string()
            }
            Self::IncompleteManifest { .. } => {
                "Internal error while preparing the firmware. Please report this issue.".to_string()
            }
            Self::InvalidSelection(e) => format!("{e}."),
            Self::NotReady => "Please select a board and a firmware version.".to_string(),
            Self::SessionBusy => "Flashing is already in progress.".to_string(),
            Self::Flash(e) => e.user_message(),
        }
    }
}

/// Errors ending a flashing session. Segment numbers are 1-based.
#[derive(Error, Debug, Clone)]
pub enum FlashError {
    #[error("Failed to connect to device")]
    ConnectionError {
        #[source]
        source: Arc<io::Error>,
    },
    #[error("Failed to fetch {role} binary (segment {segment})")]
    AssetUnavailable {
        segment: usize,
        role: String,
        #[source]
        source: Arc<fpvgate_downloader::Error>,
    },
    #[error("Failed to erase flash")]
    EraseError {
        #[source]
        source: Arc<io::Error>,
    },
    #[error("Failed to write {role} (segment {segment})")]
    WriteError {
        segment: usize,
        role: String,
        #[source]
        source: Arc<io::Error>,
    },
    #[error("Verification failed for {role} (segment {segment})")]
    VerificationError {
        segment: usize,
        role: String,
        #[source]
        source: Option<Arc<io::Error>>,
    },
    #[error("Flashing cancelled by user")]
    Cancelled,
}

impl FlashError {
    pub fn user_message(&self) -> String {
        const RETRY: &str = "The device may be in an inconsistent state. Please retry flashing from the beginning.";

        match self {
            Self::ConnectionError { .. } => {
                "Could not connect to the device. Check the cable and put the board in download mode.".to_string()
            }
            Self::AssetUnavailable { .. } | Self::Cancelled => format!("{self}."),
            Self::EraseError { .. } | Self::WriteError { .. } | Self::VerificationError { .. } => {
                format!("{self}. {RETRY}")
            }
        }
    }

    /// Segment the error refers to, if any.
    pub const fn segment(&self) -> Option<usize> {
        match self {
            Self::AssetUnavailable { segment, .. }
            | Self::WriteError { segment, .. }
            | Self::VerificationError { segment, .. } => Some(*segment),
            _ => None,
        }
    }
}
