use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{CommandFactory, Parser};
use fpvgate_cli::cli::{Commands, Opt, SelectedTarget};
use fpvgate_config::VisibilityTier;
use fpvgate_downloader::Downloader;
use fpvgate_flasher::{
    CustomRole, DeviceAddress, FileDriver, FlashController, FlashEvent, FlashState,
    FlasherConfig, Orchestrator,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{
    EnvFilter, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

const APP_QUALIFIER: (&str, &str, &str) = ("org", "fpvgate", "fpvgate-flasher");
const CONFIG_FILE: &str = "config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Commands::GenerateCompletion { shell } = opt.command {
        generate_completion(shell);
        return Ok(());
    }

    let config = load_config(&opt)?;

    match opt.command {
        Commands::Boards { expert, no_frills } => boards(config, expert, no_frills).await,
        Commands::Releases { no_frills } => releases(config, no_frills).await,
        Commands::Manifest { target } => manifest(config, target).await,
        Commands::Flash {
            target,
            output,
            flash_size,
            erase,
            no_verify,
            quiet,
        } => {
            let mut orch = orchestrator(config)?;
            select(&mut orch, &target).await?;

            let selection = orch.selection_mut();
            selection.set_erase_before_flash(erase);
            selection.set_verify_after_flash(!no_verify);

            flash(&orch, output, flash_size, quiet).await
        }
        Commands::OpenDevice { no_browser } => open_device(&config, no_browser).await,
        Commands::GenerateCompletion { shell } => {
            generate_completion(shell);
            Ok(())
        }
    }
}

fn load_config(opt: &Opt) -> anyhow::Result<FlasherConfig> {
    let path = opt.config.clone().or_else(|| {
        directories::ProjectDirs::from(APP_QUALIFIER.0, APP_QUALIFIER.1, APP_QUALIFIER.2)
            .map(|x| x.config_dir().join(CONFIG_FILE))
            .filter(|x| x.exists())
    });

    let mut config = match path {
        Some(p) => {
            tracing::info!("Loading configuration from {}", p.display());
            let data = std::fs::read(&p)
                .with_context(|| format!("Failed to read {}", p.display()))?;
            FlasherConfig::from_json(&data)
                .with_context(|| format!("Invalid configuration in {}", p.display()))?
        }
        None => FlasherConfig::default(),
    };

    if let Some(x) = &opt.boards_url {
        config.boards_url = x.clone();
    }
    if let Some(x) = &opt.releases_url {
        config.releases_url = x.clone();
    }
    if let Some(x) = &opt.local_firmware_url {
        config.local_firmware_url = Some(x.clone());
    }
    if let Some(x) = &opt.cdn_mirror_url {
        config.cdn_mirror_url = Some(x.clone());
    }

    Ok(config)
}

fn orchestrator(config: FlasherConfig) -> anyhow::Result<Orchestrator<Downloader>> {
    let downloader =
        Downloader::new(config.connect_timeout()).context("Failed to create HTTP client")?;
    Ok(Orchestrator::new(config, downloader))
}

/// Keeps the full error chain while leading with the message meant for users.
fn user_error(e: fpvgate_flasher::Error) -> anyhow::Error {
    let msg = e.user_message();
    anyhow::Error::new(e).context(msg)
}

async fn select(orch: &mut Orchestrator<Downloader>, target: &SelectedTarget) -> anyhow::Result<()> {
    orch.initialize().await.map_err(user_error)?;

    let selection = orch.selection_mut();
    if target.expert {
        selection.set_visibility_tier(VisibilityTier::Expert);
    }

    selection
        .select_board(&target.board)
        .with_context(|| format!("Cannot select board {}", target.board))?;

    if let Some(tag) = &target.release {
        selection
            .select_release(tag)
            .with_context(|| format!("Cannot select release {tag}"))?;
    }

    for (role, path) in [
        (CustomRole::Firmware, &target.firmware),
        (CustomRole::Filesystem, &target.filesystem),
    ] {
        if let Some(p) = path {
            let data = tokio::fs::read(p)
                .await
                .with_context(|| format!("Failed to read {}", p.display()))?;
            tracing::info!("Using {} ({} bytes) as {role}", p.display(), data.len());
            selection.set_custom_binary(role, file_name(p), data);
        }
    }

    Ok(())
}

fn file_name(p: &Path) -> String {
    p.file_name()
        .map(|x| x.to_string_lossy().into_owned())
        .unwrap_or_else(|| "custom.bin".to_string())
}

async fn boards(config: FlasherConfig, expert: bool, no_frills: bool) -> anyhow::Result<()> {
    let mut orch = orchestrator(config)?;
    orch.load_boards().await;

    if expert {
        orch.selection_mut()
            .set_visibility_tier(VisibilityTier::Expert);
    }

    let term = console::Term::stdout();
    let boards = orch.board_options();

    if no_frills {
        for b in boards {
            term.write_line(b.id())?;
        }
        return Ok(());
    }

    let rows: Vec<[String; 4]> = boards
        .into_iter()
        .map(|b| {
            [
                b.id().to_string(),
                b.display_name().to_string(),
                b.chip_family().to_string(),
                b.tier().to_string(),
            ]
        })
        .collect();

    print_table(&term, ["Board", "Name", "Chip", "Mode"], &rows)?;

    if orch.boards().is_fallback() {
        term.write_line(&format!(
            "{}",
            console::style("Board catalog unavailable, showing built-in boards").yellow()
        ))?;
    }

    Ok(())
}

async fn releases(config: FlasherConfig, no_frills: bool) -> anyhow::Result<()> {
    let mut orch = orchestrator(config)?;
    let res = orch.load_releases().await;

    let term = console::Term::stdout();
    let options = orch.release_options();

    if no_frills {
        for tag in options.iter().filter_map(|x| x.tag.as_deref()) {
            term.write_line(tag)?;
        }
    } else {
        let rows: Vec<[String; 2]> = options
            .into_iter()
            .map(|x| [x.label, x.info.unwrap_or_default()])
            .collect();

        print_table(&term, ["Version", "Info"], &rows)?;
    }

    res.map_err(user_error)
}

async fn manifest(config: FlasherConfig, target: SelectedTarget) -> anyhow::Result<()> {
    let mut orch = orchestrator(config)?;
    select(&mut orch, &target).await?;

    let manifest = orch.prepare_manifest().map_err(user_error)?;
    for x in manifest.segments() {
        tracing::info!("{} at {:#x} via {}", x.role, x.offset, x.strategy);
    }

    let json = manifest
        .to_json()
        .context("Failed to serialize manifest")?;
    console::Term::stdout().write_line(&json)?;

    Ok(())
}

async fn flash(
    orch: &Orchestrator<Downloader>,
    output: PathBuf,
    flash_size: u64,
    quiet: bool,
) -> anyhow::Result<()> {
    let controller = FlashController::new(FileDriver::new(output, flash_size));
    let cancel = CancellationToken::new();

    let (tx, rx) = mpsc::unbounded_channel();
    let progress = tokio::spawn(show_progress(rx, quiet));

    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Stopping after the current segment");
                cancel.cancel();
            }
        })
    };

    let res = orch.flash(&controller, Some(tx), cancel).await;
    ctrl_c.abort();
    // The session drops its sender when done, which ends the progress task.
    let _ = progress.await;

    res.map_err(user_error)?;

    if !quiet {
        console::Term::stdout().write_line("Flashing successful")?;
    }

    Ok(())
}

async fn show_progress(mut rx: mpsc::UnboundedReceiver<FlashEvent>, quiet: bool) {
    let term = console::Term::stdout();
    let bar_style = indicatif::ProgressStyle::with_template("{msg:15}  [{wide_bar}] [{percent:3} %]")
        .expect("Failed to create progress bar");

    let bar = indicatif::ProgressBar::new(100);
    bar.set_style(bar_style);
    if quiet {
        bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let mut last_state: Option<FlashState> = None;
    let mut stage = 0;

    while let Some(event) = rx.recv().await {
        match event {
            FlashEvent::Progress {
                state,
                percent,
                status,
            } => {
                if last_state != Some(state) && !state.is_terminal() {
                    stage += 1;
                    if !quiet {
                        bar.suspend(|| {
                            let _ = term.write_line(&format!("[{stage}] {state}"));
                        });
                    }
                }
                last_state = Some(state);

                bar.set_message(status);
                bar.set_position(percent.into());
            }
            FlashEvent::Log(line) => tracing::debug!("{line}"),
            FlashEvent::Error(e) => {
                bar.abandon_with_message(console::style("Failed").red().to_string());
                tracing::debug!("Session failed: {e}");
            }
            FlashEvent::Complete => bar.finish_with_message("Done"),
        }
    }
}

async fn open_device(config: &FlasherConfig, no_browser: bool) -> anyhow::Result<()> {
    let term = console::Term::stdout();
    let addr = fpvgate_flasher::DeviceLocator::from_config(config)
        .locate()
        .await;

    match &addr {
        DeviceAddress::Hostname(x) => term.write_line(&format!("Device found at {x}"))?,
        DeviceAddress::Fallback(x) => term.write_line(&format!(
            "{} did not resolve. Connect to the device access point and open {x}",
            config.device_hostname
        ))?,
    }

    if !no_browser {
        webbrowser::open(addr.url().as_str()).context("Failed to open browser")?;
    }

    Ok(())
}

fn print_table<const N: usize>(
    term: &console::Term,
    headers: [&str; N],
    rows: &[[String; N]],
) -> std::io::Result<()> {
    let widths: Vec<usize> = (0..N)
        .map(|i| {
            rows.iter()
                .map(|r| console::measure_text_width(&r[i]))
                .chain([headers[i].len()])
                .max()
                .unwrap_or_default()
        })
        .collect();

    let table_border = format!(
        "+-{}-+",
        widths
            .iter()
            .map(|w| std::iter::repeat_n('-', *w).collect::<String>())
            .collect::<Vec<_>>()
            .join("-+-")
    );
    let row = |cells: Vec<&str>| {
        let cells: Vec<_> = cells
            .into_iter()
            .zip(&widths)
            .map(|(c, w)| console::pad_str(c, *w, console::Alignment::Left, None))
            .collect();
        format!("| {} |", cells.join(" | "))
    };

    term.write_line(&table_border)?;
    term.write_line(&row(headers.to_vec()))?;
    term.write_line(&table_border)?;
    for r in rows {
        term.write_line(&row(r.iter().map(String::as_str).collect()))?;
    }
    term.write_line(&table_border)
}

fn generate_completion(target: clap_complete::Shell) {
    let mut cmd = Opt::command();
    const BIN_NAME: &str = env!("CARGO_PKG_NAME");

    clap_complete::generate(target, &mut cmd, BIN_NAME, &mut std::io::stdout())
}
