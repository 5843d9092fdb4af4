//! vigil-core — authored logic for both demo pipelines.
//!
//! Nearest-neighbor identity matching for the face-login registry, and
//! darkness sampling, edge-triggered anomaly detection, and baseline
//! reconstruction scoring for the monitor. Model inference and
//! eigen-decomposition are delegated to ort and nalgebra.

pub mod baseline;
pub mod darkness;
pub mod embedder;
pub mod matcher;

pub use baseline::{AnomalyScore, BaselineScorer, Subspace, SvdSubspace};
pub use darkness::{DetectionSettings, Edge, EdgeTrigger, MonitorState};
pub use matcher::{
    IdentityRecord, LinearScanMatcher, MatchDecision, MatchError, Matcher, ACCEPT_DISTANCE,
};
