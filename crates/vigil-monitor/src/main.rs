use anyhow::Result;
use chrono::Local;
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use vigil_core::DetectionSettings;
use vigil_hw::Camera;

mod chart;
mod logbuf;
mod session;

use chart::{ChartSample, ChartSeries, CHART_CAPACITY};
use logbuf::{LogBuffer, Severity, LOG_CAPACITY};
use session::{spawn_session, MonitorEvent, SessionOptions};

#[derive(Parser)]
#[command(name = "vigil-monitor", about = "Darkness anomaly monitor over a camera feed")]
struct Args {
    /// V4L2 device path
    #[arg(long, default_value = "/dev/video0")]
    device: String,

    /// Half-size of the centered detection region, in pixels
    #[arg(long, default_value_t = 150)]
    region_half_size: u32,

    /// Mean-channel brightness below which a pixel counts as dark (0-255)
    #[arg(long, default_value_t = 60.0)]
    brightness_cutoff: f32,

    /// Darkness ratio above which the monitor enters the anomaly state
    #[arg(long, default_value_t = 0.4)]
    darkness_threshold: f32,

    /// Disable baseline reconstruction scoring of anomalous frames
    #[arg(long)]
    no_baseline: bool,

    /// Collect a baseline training set as soon as monitoring starts
    #[arg(long)]
    train: bool,

    /// Directory to write anomaly snapshots into
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let settings = DetectionSettings {
        region_half_size: args.region_half_size,
        brightness_cutoff: args.brightness_cutoff,
        darkness_threshold: args.darkness_threshold,
        baseline_scoring: !args.no_baseline,
    };

    if let Some(dir) = &args.snapshot_dir {
        std::fs::create_dir_all(dir)?;
    }

    let camera = Camera::open(&args.device)?;
    tracing::info!(
        device = %camera.device_path,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let (handle, mut events) = spawn_session(camera, settings, SessionOptions::default());
    if args.train {
        handle.start_training().await?;
    }

    let mut logs = LogBuffer::new(LOG_CAPACITY);
    let mut chart = ChartSeries::new(CHART_CAPACITY);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            ev = events.recv() => match ev {
                Some(ev) => handle_event(ev, &mut logs, &mut chart, args.snapshot_dir.as_deref()),
                None => break,
            },
        }
    }

    handle.stop().await;

    if !chart.is_empty() {
        let mean_ratio =
            chart.samples().map(|s| s.ratio).sum::<f32>() / chart.len() as f32;
        tracing::info!(
            chart_samples = chart.len(),
            mean_ratio,
            last_ratio = chart.latest().map(|s| s.ratio).unwrap_or(0.0),
            "darkness ratio summary"
        );
    }
    if !logs.is_empty() {
        for entry in logs.entries() {
            tracing::info!(
                id = entry.id,
                at = %entry.at.format("%H:%M:%S"),
                severity = ?entry.severity,
                detail = entry.detail.as_deref().unwrap_or(""),
                "{}", entry.message
            );
        }
    }
    tracing::info!(log_entries = logs.len(), "monitor stopped");
    Ok(())
}

fn handle_event(
    ev: MonitorEvent,
    logs: &mut LogBuffer,
    chart: &mut ChartSeries,
    snapshot_dir: Option<&Path>,
) {
    match ev {
        MonitorEvent::Sample { at, ratio } => {
            chart.push(ChartSample {
                label: at.format("%H:%M:%S").to_string(),
                ratio,
            });
            tracing::debug!(ratio, "darkness ratio sampled");
        }
        MonitorEvent::AnomalyEntered { ratio, snapshot_jpeg, baseline } => {
            let detail = baseline.map(|b| b.details);
            let entry = logs.push(
                format!("Anomaly detected: darkness ratio {:.1}%", ratio * 100.0),
                Severity::Error,
                detail,
            );
            tracing::error!(id = entry.id, ratio, "anomaly detected");
            if let Some(detail) = &entry.detail {
                tracing::warn!(%detail, "baseline assessment");
            }
            if let Some(dir) = snapshot_dir {
                if let Err(e) = write_snapshot(dir, &snapshot_jpeg) {
                    logs.push(format!("Snapshot write failed: {e}"), Severity::Warning, None);
                    tracing::warn!(error = %e, "snapshot write failed");
                }
            }
        }
        MonitorEvent::AnomalyCleared => {
            let entry = logs.push(
                "Darkness back within nominal range".into(),
                Severity::Success,
                None,
            );
            tracing::info!(id = entry.id, "anomaly cleared");
        }
        MonitorEvent::TrainingProgress { collected, target } => {
            tracing::info!(collected, target, "collecting baseline frames");
        }
        MonitorEvent::TrainingComplete { frames, leading_variance } => {
            let detail = leading_variance
                .map(|v| format!("leading component explains {:.2}% of variance", v * 100.0));
            let entry = logs.push(
                format!("Baseline trained on {frames} frames"),
                Severity::Info,
                detail,
            );
            tracing::info!(id = entry.id, frames, "baseline ready");
        }
    }
}

fn write_snapshot(dir: &Path, jpeg: &[u8]) -> std::io::Result<()> {
    if jpeg.is_empty() {
        return Ok(());
    }
    let path = dir.join(format!("anomaly-{}.jpg", Local::now().format("%Y%m%d-%H%M%S")));
    std::fs::write(&path, jpeg)?;
    tracing::info!(path = %path.display(), "snapshot written");
    Ok(())
}
