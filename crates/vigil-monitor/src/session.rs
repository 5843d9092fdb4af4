//! Monitor session: one dedicated frame-processing thread per run.
//!
//! The thread owns the frame source, drains commands between frames, and
//! publishes events to the consumer. Heavy pixel analysis is throttled to a
//! minimum interval; capture itself runs every loop iteration.

use chrono::{DateTime, Local};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use vigil_core::baseline::{self, AnomalyScore, BaselineScorer};
use vigil_core::darkness::{self, DetectionSettings, Edge, EdgeTrigger};
use vigil_hw::{FrameSource, RgbaFrame};

/// Minimum interval between pixel analysis passes.
pub const ANALYSIS_MIN_INTERVAL: Duration = Duration::from_millis(150);

/// JPEG quality for anomaly snapshots.
pub const SNAPSHOT_JPEG_QUALITY: u8 = 80;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("monitor session ended")]
    Closed,
}

/// Commands accepted by a running session.
pub enum SessionCommand {
    UpdateSettings(DetectionSettings),
    StartTraining,
    Stop,
}

/// Events published by a running session.
///
/// `Sample` and `TrainingProgress` are lossy under consumer lag; edge and
/// completion events are always delivered.
pub enum MonitorEvent {
    /// One analyzed frame's darkness ratio.
    Sample { at: DateTime<Local>, ratio: f32 },
    /// Fired exactly once per upward threshold crossing.
    AnomalyEntered {
        ratio: f32,
        snapshot_jpeg: Vec<u8>,
        baseline: Option<AnomalyScore>,
    },
    /// Fired exactly once per downward crossing.
    AnomalyCleared,
    TrainingProgress { collected: usize, target: usize },
    TrainingComplete { frames: usize, leading_variance: Option<f32> },
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub analysis_interval: Duration,
    pub snapshot_quality: u8,
    /// Frames collected before a training run fires.
    pub training_target: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            analysis_interval: ANALYSIS_MIN_INTERVAL,
            snapshot_quality: SNAPSHOT_JPEG_QUALITY,
            training_target: baseline::TRAINING_TARGET_FRAMES,
        }
    }
}

/// Clone-free handle to the session thread.
pub struct SessionHandle {
    cmd_tx: mpsc::Sender<SessionCommand>,
    join: std::thread::JoinHandle<()>,
}

impl SessionHandle {
    /// Replace the detection settings; takes effect on the next analyzed frame.
    ///
    /// Reserved for an interactive frontend; the headless binary never
    /// rewires settings mid-run.
    #[allow(dead_code)]
    pub async fn update_settings(&self, settings: DetectionSettings) -> Result<(), SessionError> {
        self.cmd_tx
            .send(SessionCommand::UpdateSettings(settings))
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Begin collecting a fresh baseline training set. Ignored while a
    /// collection run is already active.
    pub async fn start_training(&self) -> Result<(), SessionError> {
        self.cmd_tx
            .send(SessionCommand::StartTraining)
            .await
            .map_err(|_| SessionError::Closed)
    }

    /// Stop the session and wait for the thread to release the device.
    pub async fn stop(self) {
        let _ = self.cmd_tx.send(SessionCommand::Stop).await;
        let join = self.join;
        let _ = tokio::task::spawn_blocking(move || {
            let _ = join.join();
        })
        .await;
    }
}

/// Spawn the session on a dedicated OS thread.
///
/// The source moves into the thread and is dropped on every exit path, so
/// the capture device is released however the session ends.
pub fn spawn_session<S: FrameSource + Send + 'static>(
    source: S,
    settings: DetectionSettings,
    opts: SessionOptions,
) -> (SessionHandle, mpsc::Receiver<MonitorEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<SessionCommand>(8);
    let (event_tx, event_rx) = mpsc::channel::<MonitorEvent>(64);

    let join = std::thread::Builder::new()
        .name("vigil-monitor".into())
        .spawn(move || {
            tracing::info!("monitor session started");
            run_session(source, settings, opts, cmd_rx, event_tx);
        })
        .expect("failed to spawn monitor session thread");

    (SessionHandle { cmd_tx, join }, event_rx)
}

fn run_session<S: FrameSource>(
    mut source: S,
    mut settings: DetectionSettings,
    opts: SessionOptions,
    mut cmd_rx: mpsc::Receiver<SessionCommand>,
    event_tx: mpsc::Sender<MonitorEvent>,
) {
    let mut trigger = EdgeTrigger::new();
    let mut scorer = BaselineScorer::new();
    let mut training: Option<Vec<Vec<f32>>> = None;
    let mut last_analysis: Option<Instant> = None;

    'session: loop {
        // Drain pending commands; settings are read once per cycle.
        loop {
            match cmd_rx.try_recv() {
                Ok(SessionCommand::UpdateSettings(s)) => {
                    tracing::info!(
                        region_half_size = s.region_half_size,
                        darkness_threshold = s.darkness_threshold,
                        "detection settings updated"
                    );
                    settings = s;
                }
                Ok(SessionCommand::StartTraining) => {
                    if training.is_none() {
                        tracing::info!(target = opts.training_target, "baseline training started");
                        training = Some(Vec::with_capacity(opts.training_target));
                    }
                }
                Ok(SessionCommand::Stop) => break 'session,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break 'session,
            }
        }

        let frame = match source.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                // Device failures are logged and left unrecovered; the
                // session keeps ticking and simply produces no analysis.
                tracing::warn!(error = %e, "frame capture failed");
                std::thread::sleep(Duration::from_millis(250));
                continue;
            }
        };

        let due = last_analysis.map_or(true, |t| t.elapsed() >= opts.analysis_interval);
        if !due {
            continue;
        }
        last_analysis = Some(Instant::now());

        let ratio = darkness::darkness_ratio(
            &frame.data,
            frame.width,
            frame.height,
            settings.region_half_size,
            settings.brightness_cutoff,
        );
        // Chart samples are lossy: never block the loop on a slow consumer,
        // or a full channel would keep Stop from ever being processed.
        match event_tx.try_send(MonitorEvent::Sample { at: Local::now(), ratio }) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => break 'session,
        }

        if collect_training_frame(&frame, &mut training, &mut scorer, &opts, &event_tx).is_err() {
            break 'session;
        }

        if let Some(edge) = trigger.observe(ratio, settings.darkness_threshold) {
            match edge {
                Edge::EnterAnomaly => {
                    let snapshot_jpeg = frame.encode_jpeg(opts.snapshot_quality).unwrap_or_else(|e| {
                        tracing::warn!(error = %e, "snapshot encoding failed");
                        Vec::new()
                    });
                    let baseline_score = if settings.baseline_scoring && scorer.is_trained() {
                        baseline::vectorize_rgba(&frame.data, frame.width, frame.height)
                            .ok()
                            .map(|v| scorer.score(&v))
                    } else {
                        None
                    };
                    tracing::error!(ratio, "anomaly detected");
                    if event_tx
                        .blocking_send(MonitorEvent::AnomalyEntered {
                            ratio,
                            snapshot_jpeg,
                            baseline: baseline_score,
                        })
                        .is_err()
                    {
                        break 'session;
                    }
                }
                Edge::ExitAnomaly => {
                    tracing::info!(ratio, "anomaly cleared");
                    if event_tx.blocking_send(MonitorEvent::AnomalyCleared).is_err() {
                        break 'session;
                    }
                }
            }
        }
    }

    drop(source);
    tracing::info!("monitor session ended, capture device released");
}

/// Feed one frame into an active training collection; fires the fit when
/// the target count is reached. Returns `Err(())` when the event channel
/// is gone.
fn collect_training_frame(
    frame: &RgbaFrame,
    training: &mut Option<Vec<Vec<f32>>>,
    scorer: &mut BaselineScorer,
    opts: &SessionOptions,
    event_tx: &mpsc::Sender<MonitorEvent>,
) -> Result<(), ()> {
    let Some(samples) = training.as_mut() else {
        return Ok(());
    };

    match baseline::vectorize_rgba(&frame.data, frame.width, frame.height) {
        Ok(v) => samples.push(v),
        Err(e) => {
            tracing::warn!(error = %e, "frame vectorization failed");
            return Ok(());
        }
    }

    let collected = samples.len();
    match event_tx.try_send(MonitorEvent::TrainingProgress { collected, target: opts.training_target }) {
        Ok(()) | Err(TrySendError::Full(_)) => {}
        Err(TrySendError::Closed(_)) => return Err(()),
    }

    if collected < opts.training_target {
        return Ok(());
    }

    // The fit runs to completion before any further frames are collected.
    if let Some(samples) = training.take() {
        match scorer.train(&samples) {
            Ok(true) => {
                let leading = scorer
                    .explained_variance_ratio()
                    .and_then(|r| r.first().copied());
                tracing::info!(frames = samples.len(), "baseline training complete");
                event_tx
                    .blocking_send(MonitorEvent::TrainingComplete {
                        frames: samples.len(),
                        leading_variance: leading,
                    })
                    .map_err(|_| ())?;
            }
            Ok(false) => tracing::warn!("baseline training skipped: too few frames"),
            Err(e) => tracing::warn!(error = %e, "baseline training failed"),
        }
    }
    Ok(())
}
