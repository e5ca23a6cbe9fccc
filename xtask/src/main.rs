use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};

const CLI_NAME: &str = "fpvgate-cli";

#[derive(Parser)]
struct Opt {
    #[command(subcommand)]
    /// Specifies the subcommand to execute.
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate Manpage for CLI
    CliMan {
        /// Directory to save manpages
        out_dir: PathBuf,
    },
    /// Generate shell completions for CLI
    CliShellComplete {
        /// Directory to save completion scripts
        out_dir: PathBuf,
    },
}

fn main() -> std::io::Result<()> {
    let opts = Opt::parse();

    match opts.command {
        Commands::CliMan { out_dir } => {
            std::fs::create_dir_all(&out_dir)?;
            let cmd = fpvgate_cli::Opt::command().name(CLI_NAME);
            clap_mangen::generate_to(cmd, out_dir)
        }
        Commands::CliShellComplete { out_dir } => {
            std::fs::create_dir_all(&out_dir)?;
            let mut cmd = fpvgate_cli::Opt::command();
            for shell in [clap_complete::Shell::Bash, clap_complete::Shell::Zsh] {
                clap_complete::generate_to(shell, &mut cmd, CLI_NAME, &out_dir)?;
            }
            Ok(())
        }
    }
}
