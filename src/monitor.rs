use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::detection::ObjectDetector;
use crate::output::ActuationChannel;
use crate::processor::{FrameProcessor, Overlay};

// ─── Collaborators ───────────────────────────────────────────────────────────

/// A camera or any other producer of frames.
pub trait FrameSource {
    type Frame;

    /// `Ok(None)` marks the end of the stream. Errors are per-frame and the
    /// caller decides whether to keep reading.
    fn next_frame(&mut self) -> Result<Option<Self::Frame>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkControl {
    Continue,
    Quit,
}

/// Receives every processed frame together with its overlay description.
pub trait FrameSink<F> {
    fn render(&mut self, frame: &mut F, overlay: &Overlay<'_>) -> Result<SinkControl>;
}

/// No window, no drawing.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessSink;

impl<F> FrameSink<F> for HeadlessSink {
    fn render(&mut self, _frame: &mut F, _overlay: &Overlay<'_>) -> Result<SinkControl> {
        Ok(SinkControl::Continue)
    }
}

// ─── Settings & summary ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub process_every_n_frames: u32,
    pub frame_queue_capacity: usize,
    pub max_capture_failures: u32,
    pub detect_sensitivity: f32,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            process_every_n_frames: 3,
            frame_queue_capacity: 2,
            max_capture_failures: 30,
            detect_sensitivity: 0.5,
        }
    }
}

impl MonitorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            process_every_n_frames: cfg.process_every_n_frames.max(1),
            frame_queue_capacity: cfg.frame_queue_capacity.max(1),
            max_capture_failures: cfg.max_capture_failures,
            detect_sensitivity: cfg.detect_sensitivity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    EndOfStream,
    QuitKey,
    Interrupted,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub frames_captured: u64,
    pub frames_forwarded: u64,
    pub frames_dropped: u64,
    pub frames_processed: u64,
    pub actuations: u64,
    pub stop_reason: StopReason,
}

#[derive(Debug, Default)]
struct CaptureStats {
    captured: u64,
    forwarded: u64,
    dropped: u64,
}

#[derive(Debug, Default)]
struct ProcessStats {
    processed: u64,
    actuations: u64,
}

type StopTx = Arc<watch::Sender<Option<StopReason>>>;
type StopRx = watch::Receiver<Option<StopReason>>;

// ─── Monitor ─────────────────────────────────────────────────────────────────

pub struct Monitor<S, D, K, A> {
    source: S,
    detector: D,
    sink: K,
    actuator: A,
    processor: FrameProcessor,
    settings: MonitorSettings,
    handle_ctrl_c: bool,
}

impl<S, D, K, A> Monitor<S, D, K, A>
where
    S: FrameSource + Send + 'static,
    S::Frame: Send + 'static,
    D: ObjectDetector<S::Frame> + Send + 'static,
    K: FrameSink<S::Frame> + Send + 'static,
    A: ActuationChannel + Send + 'static,
{
    pub fn new(source: S, detector: D, sink: K, actuator: A, processor: FrameProcessor, settings: MonitorSettings) -> Self {
        Self {
            source,
            detector,
            sink,
            actuator,
            processor,
            settings,
            handle_ctrl_c: true,
        }
    }

    /// Leave ctrl-c to the caller (tests, embedding).
    pub fn without_signal_handler(mut self) -> Self {
        self.handle_ctrl_c = false;
        self
    }

    /// Run until quit key, ctrl-c or end of stream. The actuator is back in
    /// the safe state when this returns, whatever the outcome.
    pub async fn run(self) -> Result<RunSummary> {
        let started_at = Utc::now();
        let Monitor {
            source,
            detector,
            sink,
            actuator,
            processor,
            settings,
            handle_ctrl_c,
        } = self;

        let (frame_tx, frame_rx) = flume::bounded::<S::Frame>(settings.frame_queue_capacity);
        let (stop_tx, stop_rx) = watch::channel(None::<StopReason>);
        let stop_tx: StopTx = Arc::new(stop_tx);

        // ── Ctrl-C ───────────────────────────────────────────────────────
        let signal_task = handle_ctrl_c.then(|| {
            let stop = Arc::clone(&stop_tx);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl-C received, stopping");
                    stop.send_replace(Some(StopReason::Interrupted));
                }
            })
        });

        // ── Processing worker ────────────────────────────────────────────
        let proc_settings = settings.clone();
        let proc_stop_tx = Arc::clone(&stop_tx);
        let proc_stop_rx = stop_rx.clone();
        let process_handle = tokio::task::spawn_blocking(move || {
            process_loop(
                frame_rx,
                detector,
                sink,
                actuator,
                processor,
                &proc_settings,
                &proc_stop_tx,
                &proc_stop_rx,
            )
        });

        // ── Capture worker ───────────────────────────────────────────────
        let capture_handle =
            tokio::task::spawn_blocking(move || capture_loop(source, frame_tx, &settings, &stop_rx));

        // the frame sender drops with the capture worker, which ends processing
        let capture = capture_handle.await.context("capture worker panicked")?;
        let processed = process_handle.await.context("processing worker panicked")?;

        if let Some(task) = signal_task {
            task.abort();
        }

        let capture = capture?;
        let processed = processed?;
        let stop_reason = (*stop_tx.borrow()).unwrap_or(StopReason::EndOfStream);

        let summary = RunSummary {
            started_at,
            finished_at: Utc::now(),
            frames_captured: capture.captured,
            frames_forwarded: capture.forwarded,
            frames_dropped: capture.dropped,
            frames_processed: processed.processed,
            actuations: processed.actuations,
            stop_reason,
        };
        info!(
            "Monitor stopped ({:?}): captured={} forwarded={} dropped={} processed={} actuations={}",
            summary.stop_reason,
            summary.frames_captured,
            summary.frames_forwarded,
            summary.frames_dropped,
            summary.frames_processed,
            summary.actuations
        );
        Ok(summary)
    }
}

fn capture_loop<S: FrameSource>(
    mut source: S,
    frame_tx: flume::Sender<S::Frame>,
    settings: &MonitorSettings,
    stop_rx: &StopRx,
) -> Result<CaptureStats> {
    let mut stats = CaptureStats::default();
    let mut failures = 0u32;
    let every = u64::from(settings.process_every_n_frames.max(1));

    info!("Capture running (every {} frame(s) forwarded)", every);

    while stop_rx.borrow().is_none() {
        let frame = match source.next_frame() {
            Ok(Some(f)) => {
                failures = 0;
                f
            }
            Ok(None) => {
                info!("End of stream after {} frames", stats.captured);
                break;
            }
            Err(e) => {
                failures += 1;
                if failures > settings.max_capture_failures {
                    return Err(e.context(format!("{} consecutive capture failures", failures)));
                }
                warn!("Capture error ({}/{}): {:#}", failures, settings.max_capture_failures, e);
                continue;
            }
        };

        stats.captured += 1;
        if (stats.captured - 1) % every != 0 {
            continue;
        }

        match frame_tx.try_send(frame) {
            Ok(()) => stats.forwarded += 1,
            Err(flume::TrySendError::Full(_)) => {
                stats.dropped += 1;
                debug!("Frame queue full, dropped frame #{}", stats.captured);
            }
            Err(flume::TrySendError::Disconnected(_)) => break,
        }
    }

    Ok(stats)
}

#[allow(clippy::too_many_arguments)]
fn process_loop<F, D, K, A>(
    frame_rx: flume::Receiver<F>,
    mut detector: D,
    mut sink: K,
    mut actuator: A,
    mut processor: FrameProcessor,
    settings: &MonitorSettings,
    stop_tx: &StopTx,
    stop_rx: &StopRx,
) -> Result<ProcessStats>
where
    D: ObjectDetector<F>,
    K: FrameSink<F>,
    A: ActuationChannel,
{
    let result = run_frames(&frame_rx, &mut detector, &mut sink, &mut actuator, &mut processor, settings, stop_tx, stop_rx);

    if let Err(e) = processor.shutdown(&mut actuator) {
        error!("Failed to return outputs to safe state: {:#}", e);
    }

    result.map(|processed| ProcessStats {
        processed,
        actuations: processor.activations(),
    })
}

#[allow(clippy::too_many_arguments)]
fn run_frames<F, D, K, A>(
    frame_rx: &flume::Receiver<F>,
    detector: &mut D,
    sink: &mut K,
    actuator: &mut A,
    processor: &mut FrameProcessor,
    settings: &MonitorSettings,
    stop_tx: &StopTx,
    stop_rx: &StopRx,
) -> Result<u64>
where
    D: ObjectDetector<F>,
    K: FrameSink<F>,
    A: ActuationChannel,
{
    let mut processed = 0u64;
    let poll = std::time::Duration::from_millis(100);

    loop {
        if stop_rx.borrow().is_some() {
            break;
        }
        let mut frame = match frame_rx.recv_timeout(poll) {
            Ok(f) => f,
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        };

        let t0 = Instant::now();
        let detections = match detector.detect(&frame, settings.detect_sensitivity) {
            Ok(d) => d,
            Err(e) => {
                warn!("Detector error: {:#}", e);
                continue;
            }
        };
        let outcome = processor
            .process(&detections, Instant::now(), actuator)
            .context("actuation failed")?;
        processed += 1;

        let overlay = Overlay {
            zones: processor.zones(),
            outcome: &outcome,
            processing_ms: t0.elapsed().as_secs_f64() * 1000.0,
        };
        debug!("{} | {}", overlay.status_line(), overlay.timing_line());

        match sink.render(&mut frame, &overlay).context("display failed")? {
            SinkControl::Continue => {}
            SinkControl::Quit => {
                info!("Quit key pressed");
                stop_tx.send_replace(Some(StopReason::QuitKey));
                break;
            }
        }
    }

    Ok(processed)
}
