//! Command line interface of the FPVGate flasher.
//!
//! The argument definitions live in a library so that `xtask` can render man pages from them.

pub mod cli;

pub use cli::Opt;
