//! Device programming drivers.
//!
//! The serial protocol itself lives outside this crate. A driver only has to expose the handful
//! of steps a [`FlashSession`](crate::FlashSession) sequences.

mod file;

use std::io;

use fpvgate_config::ChipFamily;
use tokio::sync::mpsc;

pub use file::FileDriver;

/// Low level access to device flash.
///
/// A session calls `connect` once, then `erase`, `write_segment` and `flash_digest` any number of
/// times, and always ends with `disconnect`, including after failures.
pub trait FlashDriver {
    /// Handshake with a device of the given chip family.
    fn connect(&mut self, chip: ChipFamily) -> impl Future<Output = io::Result<()>>;

    /// Erase the whole flash.
    fn erase(&mut self) -> impl Future<Output = io::Result<()>>;

    /// Write `data` at the absolute flash `offset`.
    ///
    /// # Progress
    ///
    /// Progress between 0 and 1 for this segment can be reported through `chan`.
    fn write_segment(
        &mut self,
        offset: u32,
        data: &[u8],
        chan: Option<mpsc::Sender<f32>>,
    ) -> impl Future<Output = io::Result<()>>;

    /// SHA-256 of `len` bytes of flash starting at `offset`.
    fn flash_digest(&mut self, offset: u32, len: usize)
    -> impl Future<Output = io::Result<[u8; 32]>>;

    fn disconnect(&mut self) -> impl Future<Output = io::Result<()>>;
}

pub(crate) fn chan_send(chan: Option<&mut mpsc::Sender<f32>>, msg: f32) {
    if let Some(c) = chan {
        let _ = c.try_send(msg);
    }
}
