//! Frame darkness sampling and the edge-triggered anomaly state machine.
//!
//! The sampler counts pixels below a brightness cutoff inside a centered
//! square region of an RGBA frame. The trigger turns the resulting ratio
//! into single-fire enter/exit transitions.

use serde::{Deserialize, Serialize};

/// Operator-adjustable detection parameters.
///
/// Passed by value into every sampling call; there is no ambient settings
/// object. Changes take effect on the next analyzed frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionSettings {
    /// Half-size of the centered square sampling region, in pixels.
    pub region_half_size: u32,
    /// Mean-channel brightness below which a pixel counts as dark (0–255).
    pub brightness_cutoff: f32,
    /// Darkness ratio above which the monitor enters the anomaly state.
    pub darkness_threshold: f32,
    /// Whether anomalous frames are additionally scored against the
    /// reconstruction baseline.
    pub baseline_scoring: bool,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            region_half_size: 150,
            brightness_cutoff: 60.0,
            darkness_threshold: 0.4,
            baseline_scoring: true,
        }
    }
}

/// Counts from one pass over the sampling region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionSample {
    pub dark: u64,
    pub sampled: u64,
}

impl RegionSample {
    /// Dark-pixel fraction in [0, 1]; 0 when the region sampled no pixels.
    pub fn ratio(&self) -> f32 {
        if self.sampled == 0 {
            0.0
        } else {
            self.dark as f32 / self.sampled as f32
        }
    }
}

/// Scan the centered square region of an RGBA frame.
///
/// A pixel is dark when the mean of its R, G, B channels falls below
/// `brightness_cutoff`. Coordinates outside the frame are skipped, so a
/// region larger than the frame samples exactly the in-bounds pixels.
pub fn sample_region(
    rgba: &[u8],
    width: u32,
    height: u32,
    half_size: u32,
    brightness_cutoff: f32,
) -> RegionSample {
    let cx = (width / 2) as i64;
    let cy = (height / 2) as i64;
    let half = half_size as i64;

    let y0 = (cy - half).max(0);
    let y1 = (cy + half).min(height as i64);
    let x0 = (cx - half).max(0);
    let x1 = (cx + half).min(width as i64);

    let mut dark = 0u64;
    let mut sampled = 0u64;

    for y in y0..y1 {
        for x in x0..x1 {
            let idx = (y as usize * width as usize + x as usize) * 4;
            let Some(px) = rgba.get(idx..idx + 3) else {
                continue;
            };
            let brightness = (px[0] as f32 + px[1] as f32 + px[2] as f32) / 3.0;
            if brightness < brightness_cutoff {
                dark += 1;
            }
            sampled += 1;
        }
    }

    RegionSample { dark, sampled }
}

/// Convenience wrapper: dark-pixel fraction of the sampled region.
pub fn darkness_ratio(
    rgba: &[u8],
    width: u32,
    height: u32,
    half_size: u32,
    brightness_cutoff: f32,
) -> f32 {
    sample_region(rgba, width, height, half_size, brightness_cutoff).ratio()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Normal,
    Anomaly,
}

/// A single state transition emitted by [`EdgeTrigger::observe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    EnterAnomaly,
    ExitAnomaly,
}

/// Two-state machine with explicit transition guards.
///
/// `EnterAnomaly` fires exactly once when the ratio strictly exceeds the
/// threshold while in `Normal`; `ExitAnomaly` fires exactly once when the
/// ratio returns to the threshold or below while in `Anomaly`. No edge
/// fires while already in the target state, so callers never see duplicate
/// alerts for one crossing.
#[derive(Debug)]
pub struct EdgeTrigger {
    state: MonitorState,
}

impl EdgeTrigger {
    pub fn new() -> Self {
        Self { state: MonitorState::Normal }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn observe(&mut self, ratio: f32, threshold: f32) -> Option<Edge> {
        match self.state {
            MonitorState::Normal if ratio > threshold => {
                self.state = MonitorState::Anomaly;
                Some(Edge::EnterAnomaly)
            }
            MonitorState::Anomaly if ratio <= threshold => {
                self.state = MonitorState::Normal;
                Some(Edge::ExitAnomaly)
            }
            _ => None,
        }
    }
}

impl Default for EdgeTrigger {
    fn default() -> Self {
        Self::new()
    }
}
