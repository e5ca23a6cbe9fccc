//! Error type for this crate

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Board {board} has no flash segments")]
    NoSegments { board: String },
    #[error("Board {board} does not start with a bootloader at offset 0x0")]
    MissingBootloader { board: String },
    #[error("Board {board} has segment {role} at {offset:#x} which does not follow the previous one")]
    UnorderedSegment {
        board: String,
        role: String,
        offset: u32,
    },
    #[error("Board {board} has invalid offset {offset:?}")]
    InvalidOffset { board: String, offset: String },
    #[error("Board {board} has no chip family and no built-in layout")]
    UnknownLayout { board: String },
    #[error("Board {board} uses unsupported chip family {chip}")]
    UnknownChipFamily { board: String, chip: String },
    #[error("Board {board} is listed more than once")]
    DuplicateBoard { board: String },
}
