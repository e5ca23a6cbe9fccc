use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use url::Url;

#[derive(Parser, Debug)]
#[command(version, about)]
pub struct Opt {
    #[arg(long, global = true)]
    /// JSON configuration file. Defaults to `config.json` in the platform config directory.
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    /// Override the board catalog URL.
    pub boards_url: Option<Url>,

    #[arg(long, global = true)]
    /// Override the release listing URL.
    pub releases_url: Option<Url>,

    #[arg(long, global = true)]
    /// Firmware directory hosted next to the web flasher.
    pub local_firmware_url: Option<Url>,

    #[arg(long, global = true)]
    /// Mirror queried for binaries missing from a release.
    pub cdn_mirror_url: Option<Url>,

    #[command(subcommand)]
    /// Specifies the subcommand to execute.
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List supported boards.
    Boards {
        #[arg(long)]
        /// Include boards reserved for expert mode.
        expert: bool,

        #[arg(long)]
        /// Only print board ids seperated by newline
        no_frills: bool,
    },

    /// List published firmware releases.
    Releases {
        #[arg(long)]
        /// Only print release tags seperated by newline
        no_frills: bool,
    },

    /// Print the flash manifest for a board and release.
    Manifest {
        #[command(flatten)]
        target: SelectedTarget,
    },

    /// Flash firmware into a flash image file.
    Flash {
        #[command(flatten)]
        target: SelectedTarget,

        #[arg(long)]
        /// File holding the emulated flash contents. Created if missing.
        output: PathBuf,

        #[arg(long, default_value_t = 8 * 1024 * 1024)]
        /// Size of the flash in bytes.
        flash_size: u64,

        #[arg(long)]
        /// Erase the whole flash before writing.
        erase: bool,

        #[arg(long)]
        /// Disable checksum verification after flashing to speed up the process.
        no_verify: bool,

        #[arg(long)]
        /// Suppress standard output messages for a quieter experience.
        quiet: bool,
    },

    /// Open the web interface of a flashed device.
    OpenDevice {
        #[arg(long)]
        /// Only print the address.
        no_browser: bool,
    },

    /// Command to generate shell completion
    GenerateCompletion {
        /// Specifies the target shell type for completion
        shell: clap_complete::Shell,
    },
}

#[derive(Args, Debug)]
pub struct SelectedTarget {
    #[arg(long)]
    /// Board id, as listed by `boards`.
    pub board: String,

    #[arg(long)]
    /// Release tag. Defaults to the latest stable release.
    pub release: Option<String>,

    #[arg(long)]
    /// Allow boards reserved for expert mode.
    pub expert: bool,

    #[arg(long)]
    /// Custom firmware binary replacing the one from the release.
    pub firmware: Option<PathBuf>,

    #[arg(long)]
    /// Custom filesystem image replacing the one from the release.
    pub filesystem: Option<PathBuf>,
}
