//! Flashing session state machine.
//!
//! ```text
//! Idle -> Connecting -> [Erasing] -> WritingSegments -> [Verifying] -> Completed
//!                    \___________________\____________________\______-> Failed
//! ```
//!
//! Segment binaries are fetched while in `Connecting`, before the device handshake. Every session
//! ends with a disconnect attempt and exactly one [`FlashEvent::Complete`] or
//! [`FlashEvent::Error`].

use std::{fmt, sync::Arc};

use chrono::{DateTime, Local};
use fpvgate_config::ChipFamily;
use fpvgate_downloader::Fetch;
use sha2::{Digest, Sha256};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;

use crate::{
    Error, FlashError, FlashManifest, Result, driver::FlashDriver, resolver::ResolvedSegment,
    resolver::SegmentSource,
};

const STAGED: u8 = 8;
const CONNECTED: u8 = 10;
const ERASED: u8 = 15;
const WRITTEN: u8 = 90;
const DONE: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlashState {
    Idle,
    Connecting,
    Erasing,
    WritingSegments,
    Verifying,
    Completed,
    Failed,
}

impl FlashState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for FlashState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "Idle",
            Self::Connecting => "Connecting",
            Self::Erasing => "Erasing",
            Self::WritingSegments => "Writing",
            Self::Verifying => "Verifying",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashOptions {
    pub erase_before_flash: bool,
    pub verify_after_flash: bool,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            erase_before_flash: false,
            verify_after_flash: true,
        }
    }
}

/// Timestamped session log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub at: DateTime<Local>,
    pub message: String,
}

impl LogLine {
    fn now(message: String) -> Self {
        Self {
            at: Local::now(),
            message,
        }
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.at.format("%H:%M:%S"), self.message)
    }
}

#[derive(Debug, Clone)]
pub enum FlashEvent {
    Progress {
        state: FlashState,
        /// 0 to 100
        percent: u8,
        status: String,
    },
    Log(LogLine),
    Error(FlashError),
    Complete,
}

/// One segment with its bytes in memory.
struct Staged<'a> {
    /// 1-based
    index: usize,
    segment: &'a ResolvedSegment,
    data: Arc<[u8]>,
    digest: [u8; 32],
}

impl<'a> Staged<'a> {
    fn new(index: usize, segment: &'a ResolvedSegment, data: Arc<[u8]>) -> Self {
        let digest: [u8; 32] = Sha256::digest(&data).into();
        Self {
            index,
            segment,
            data,
            digest,
        }
    }

    fn role(&self) -> &str {
        &self.segment.role
    }

    fn short_digest(&self) -> String {
        const_hex::encode(&self.digest[..4])
    }
}

struct Reporter {
    events: Option<mpsc::UnboundedSender<FlashEvent>>,
    state: FlashState,
    percent: u8,
}

impl Reporter {
    fn send(&self, event: FlashEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    fn progress(&mut self, state: FlashState, percent: u8, status: impl Into<String>) {
        if state != self.state {
            tracing::info!("Flash state {} -> {state}", self.state);
            self.state = state;
        }
        self.percent = percent;

        self.send(FlashEvent::Progress {
            state,
            percent,
            status: status.into(),
        });
    }

    fn log(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!("{message}");
        self.send(FlashEvent::Log(LogLine::now(message)));
    }

    fn fail(&mut self, e: FlashError) -> Result<(), FlashError> {
        tracing::error!("Flashing failed: {e}");
        self.log(format!("Error: {e}"));
        self.progress(FlashState::Failed, self.percent, e.to_string());
        self.send(FlashEvent::Error(e.clone()));
        Err(e)
    }

    fn complete(&mut self) -> Result<(), FlashError> {
        self.progress(FlashState::Completed, DONE, "Flashing complete");
        self.log("Flashing complete");
        self.send(FlashEvent::Complete);
        Ok(())
    }
}

fn check_token(cancel: &CancellationToken) -> Result<(), FlashError> {
    if cancel.is_cancelled() {
        Err(FlashError::Cancelled)
    } else {
        Ok(())
    }
}

fn scale(start: u8, end: u8, frac: f32) -> u8 {
    let span = f32::from(end - start);
    start + (span * frac.clamp(0.0, 1.0)).round() as u8
}

/// A single flashing attempt. Consumed by [`FlashSession::begin`].
pub struct FlashSession<'a, D, F> {
    driver: &'a mut D,
    fetcher: F,
    events: Option<mpsc::UnboundedSender<FlashEvent>>,
    cancel: CancellationToken,
}

impl<'a, D, F> FlashSession<'a, D, F>
where
    D: FlashDriver,
    F: Fetch,
{
    pub fn new(driver: &'a mut D, fetcher: F) -> Self {
        Self {
            driver,
            fetcher,
            events: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_events(mut self, events: mpsc::UnboundedSender<FlashEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Cancelling the token stops the session at the next segment or phase boundary.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn begin(
        self,
        manifest: &FlashManifest,
        options: FlashOptions,
    ) -> Result<(), FlashError> {
        let Self {
            driver,
            fetcher,
            events,
            cancel,
        } = self;

        let mut reporter = Reporter {
            events,
            state: FlashState::Idle,
            percent: 0,
        };

        tracing::info!(
            "Flashing {} ({} segments, erase: {}, verify: {})",
            manifest.display_name(),
            manifest.segments().len(),
            options.erase_before_flash,
            options.verify_after_flash
        );

        let res = run(
            &mut *driver,
            &fetcher,
            manifest,
            options,
            &mut reporter,
            &cancel,
        )
        .await;

        reporter.log("Disconnecting");
        if let Err(e) = driver.disconnect().await {
            tracing::warn!("Failed to disconnect: {e}");
            reporter.log(format!("Disconnect failed: {e}"));
        }

        match res {
            Ok(()) => reporter.complete(),
            Err(e) => reporter.fail(e),
        }
    }
}

async fn run<D: FlashDriver, F: Fetch>(
    driver: &mut D,
    fetcher: &F,
    manifest: &FlashManifest,
    options: FlashOptions,
    reporter: &mut Reporter,
    cancel: &CancellationToken,
) -> Result<(), FlashError> {
    reporter.progress(FlashState::Connecting, 0, "Preparing firmware");
    let staged = stage(fetcher, manifest, reporter, cancel).await?;

    connect(driver, manifest.chip_family(), reporter, cancel).await?;

    if options.erase_before_flash {
        check_token(cancel)?;
        reporter.progress(FlashState::Erasing, CONNECTED, "Erasing flash");
        reporter.log("Erasing flash");

        driver.erase().await.map_err(|e| FlashError::EraseError {
            source: Arc::new(e),
        })?;

        reporter.log("Flash erased");
        reporter.progress(FlashState::Erasing, ERASED, "Flash erased");
    }

    let end = if options.verify_after_flash {
        WRITTEN
    } else {
        DONE
    };
    write(driver, &staged, end, reporter, cancel).await?;

    if options.verify_after_flash {
        verify(driver, &staged, reporter, cancel).await?;
    }

    Ok(())
}

async fn stage<'m, F: Fetch>(
    fetcher: &F,
    manifest: &'m FlashManifest,
    reporter: &mut Reporter,
    cancel: &CancellationToken,
) -> Result<Vec<Staged<'m>>, FlashError> {
    let segments = manifest.segments();
    let mut staged = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        check_token(cancel)?;

        let data: Arc<[u8]> = match &segment.source {
            SegmentSource::Upload(bin) => bin.data().clone(),
            SegmentSource::Remote(url) => {
                reporter.log(format!("Downloading {url}"));
                fetcher
                    .fetch_bytes(url, None)
                    .await
                    .map_err(|e| FlashError::AssetUnavailable {
                        segment: i + 1,
                        role: segment.role.clone(),
                        source: Arc::new(e),
                    })?
                    .into()
            }
        };

        staged.push(Staged::new(i + 1, segment, data));
        reporter.progress(
            FlashState::Connecting,
            scale(0, STAGED, (i + 1) as f32 / segments.len() as f32),
            format!("Prepared {}", segment.role),
        );
    }

    Ok(staged)
}

async fn connect<D: FlashDriver>(
    driver: &mut D,
    chip: ChipFamily,
    reporter: &mut Reporter,
    cancel: &CancellationToken,
) -> Result<(), FlashError> {
    check_token(cancel)?;
    reporter.log(format!("Connecting to {chip}"));

    driver
        .connect(chip)
        .await
        .map_err(|e| FlashError::ConnectionError {
            source: Arc::new(e),
        })?;

    reporter.log("Connected");
    reporter.progress(FlashState::Connecting, CONNECTED, "Connected");
    Ok(())
}

async fn write<D: FlashDriver>(
    driver: &mut D,
    staged: &[Staged<'_>],
    end: u8,
    reporter: &mut Reporter,
    cancel: &CancellationToken,
) -> Result<(), FlashError> {
    let total = staged.iter().map(|x| x.data.len()).sum::<usize>().max(1) as f32;
    let mut done = 0;

    for seg in staged {
        check_token(cancel)?;

        let status = format!("Writing {} ({}/{})", seg.role(), seg.index, staged.len());
        reporter.progress(
            FlashState::WritingSegments,
            scale(ERASED, end, done as f32 / total),
            status.clone(),
        );
        reporter.log(format!(
            "Writing {} at {:#x} ({} bytes, sha256 {})",
            seg.role(),
            seg.segment.offset,
            seg.data.len(),
            seg.short_digest()
        ));

        let (tx, mut rx) = mpsc::channel(16);
        let res = {
            let write = driver.write_segment(seg.segment.offset, &seg.data, Some(tx));
            tokio::pin!(write);

            loop {
                tokio::select! {
                    res = &mut write => break res,
                    Some(x) = rx.recv() => {
                        let frac = (done as f32 + x * seg.data.len() as f32) / total;
                        let percent = scale(ERASED, end, frac);
                        if percent != reporter.percent {
                            reporter.progress(FlashState::WritingSegments, percent, status.clone());
                        }
                    }
                }
            }
        };

        res.map_err(|e| FlashError::WriteError {
            segment: seg.index,
            role: seg.role().to_string(),
            source: Arc::new(e),
        })?;

        done += seg.data.len();
        reporter.log(format!("Wrote {}", seg.role()));
    }

    reporter.progress(FlashState::WritingSegments, end, "All segments written");
    Ok(())
}

async fn verify<D: FlashDriver>(
    driver: &mut D,
    staged: &[Staged<'_>],
    reporter: &mut Reporter,
    cancel: &CancellationToken,
) -> Result<(), FlashError> {
    reporter.progress(FlashState::Verifying, WRITTEN, "Verifying");

    for seg in staged {
        check_token(cancel)?;
        reporter.log(format!("Verifying {}", seg.role()));

        let digest = driver
            .flash_digest(seg.segment.offset, seg.data.len())
            .await
            .map_err(|e| FlashError::VerificationError {
                segment: seg.index,
                role: seg.role().to_string(),
                source: Some(Arc::new(e)),
            })?;

        if digest != seg.digest {
            reporter.log(format!(
                "Digest mismatch for {}: expected {}, found {}",
                seg.role(),
                const_hex::encode(seg.digest),
                const_hex::encode(digest)
            ));
            return Err(FlashError::VerificationError {
                segment: seg.index,
                role: seg.role().to_string(),
                source: None,
            });
        }

        reporter.progress(
            FlashState::Verifying,
            scale(WRITTEN, DONE, seg.index as f32 / staged.len() as f32),
            format!("Verified {}", seg.role()),
        );
    }

    Ok(())
}

/// Owns the device driver and allows a single session at a time.
#[derive(Debug)]
pub struct FlashController<D> {
    driver: Arc<Mutex<D>>,
}

impl<D> Clone for FlashController<D> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
        }
    }
}

impl<D: FlashDriver> FlashController<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver: Arc::new(Mutex::new(driver)),
        }
    }

    /// A session currently holds the driver.
    pub fn is_busy(&self) -> bool {
        self.driver.try_lock().is_err()
    }

    /// Run a session to completion. Fails with [`Error::SessionBusy`] instead of waiting if
    /// another session is active.
    pub async fn start<F: Fetch>(
        &self,
        fetcher: F,
        manifest: &FlashManifest,
        options: FlashOptions,
        events: Option<mpsc::UnboundedSender<FlashEvent>>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let mut driver = self.driver.clone().try_lock_owned().map_err(|_| {
            tracing::warn!("Rejecting flash request, session already active");
            Error::SessionBusy
        })?;

        let mut session = FlashSession::new(&mut *driver, fetcher).with_cancel_token(cancel);
        if let Some(tx) = events {
            session = session.with_events(tx);
        }

        session.begin(manifest, options).await.map_err(Error::from)
    }
}
