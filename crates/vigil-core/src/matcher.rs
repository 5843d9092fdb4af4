use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Euclidean acceptance radius for a positive identity match.
///
/// Descriptors closer than this to a stored record are accepted. The value
/// assumes raw (unnormalized) 128-dimensional descriptors.
pub const ACCEPT_DISTANCE: f32 = 0.5;

/// A stored identity: display name plus the face descriptor captured at
/// registration time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub id: i64,
    pub name: String,
    pub embedding: Vec<f32>,
}

/// Outcome of matching a query descriptor against the registry.
#[derive(Debug, Clone)]
pub struct MatchDecision {
    pub allowed: bool,
    /// Name of the nearest record when a match was accepted.
    pub name: Option<String>,
    /// Distance to the nearest record; `f32::INFINITY` when the candidate
    /// set was empty.
    pub distance: f32,
}

#[derive(Error, Debug)]
pub enum MatchError {
    #[error("embedding length mismatch: record {id} has {stored} dims, query has {query}")]
    DimensionMismatch { id: i64, stored: usize, query: usize },
}

/// Compute Euclidean distance between two equal-length vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// Strategy for resolving a query descriptor to a stored identity.
pub trait Matcher {
    fn nearest(
        &self,
        query: &[f32],
        candidates: &[IdentityRecord],
        accept_distance: f32,
    ) -> Result<MatchDecision, MatchError>;
}

/// Brute-force linear scan over all stored records.
///
/// O(n·L) per query with no indexing — the registry is expected to hold
/// dozens of records, not millions. Improvement is strict (`<`), so ties
/// resolve to the earliest-scanned candidate, which is the first-registered
/// record when candidates come back in insertion order.
pub struct LinearScanMatcher;

impl Matcher for LinearScanMatcher {
    fn nearest(
        &self,
        query: &[f32],
        candidates: &[IdentityRecord],
        accept_distance: f32,
    ) -> Result<MatchDecision, MatchError> {
        let mut best_distance = f32::INFINITY;
        let mut best: Option<&IdentityRecord> = None;

        for record in candidates {
            if record.embedding.len() != query.len() {
                return Err(MatchError::DimensionMismatch {
                    id: record.id,
                    stored: record.embedding.len(),
                    query: query.len(),
                });
            }
            let distance = euclidean_distance(query, &record.embedding);
            if distance < best_distance {
                best_distance = distance;
                best = Some(record);
            }
        }

        match best {
            Some(record) if best_distance < accept_distance => Ok(MatchDecision {
                allowed: true,
                name: Some(record.name.clone()),
                distance: best_distance,
            }),
            _ => Ok(MatchDecision {
                allowed: false,
                name: None,
                distance: best_distance,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, name: &str, embedding: Vec<f32>) -> IdentityRecord {
        IdentityRecord { id, name: name.into(), embedding }
    }

    #[test]
    fn test_euclidean_distance_identical() {
        assert_eq!(euclidean_distance(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_euclidean_distance_unit_axes() {
        let d = euclidean_distance(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((d - std::f32::consts::SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_nearest_picks_closest_candidate() {
        let candidates = vec![
            record(1, "far", vec![3.0, 4.0]),
            record(2, "near", vec![0.1, 0.0]),
            record(3, "farther", vec![5.0, 12.0]),
        ];
        let decision = LinearScanMatcher
            .nearest(&[0.0, 0.0], &candidates, ACCEPT_DISTANCE)
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.name.as_deref(), Some("near"));
        assert!((decision.distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_reported_minimum_bounds_every_candidate() {
        let candidates = vec![
            record(1, "a", vec![0.3, 0.1]),
            record(2, "b", vec![0.2, 0.2]),
            record(3, "c", vec![0.9, 0.9]),
        ];
        let query = [0.0, 0.0];
        let decision = LinearScanMatcher
            .nearest(&query, &candidates, ACCEPT_DISTANCE)
            .unwrap();
        for c in &candidates {
            assert!(decision.distance <= euclidean_distance(&query, &c.embedding) + 1e-6);
        }
    }

    #[test]
    fn test_first_registered_wins_scenario() {
        // candidates = [[0,0], [1,1]], query = [0,0] → first record at distance 0
        let candidates = vec![
            record(1, "first", vec![0.0, 0.0]),
            record(2, "second", vec![1.0, 1.0]),
        ];
        let decision = LinearScanMatcher
            .nearest(&[0.0, 0.0], &candidates, ACCEPT_DISTANCE)
            .unwrap();
        assert!(decision.allowed);
        assert_eq!(decision.name.as_deref(), Some("first"));
        assert_eq!(decision.distance, 0.0);
    }

    #[test]
    fn test_ties_resolve_to_earliest_scanned() {
        let candidates = vec![
            record(1, "early", vec![0.3, 0.0]),
            record(2, "late", vec![-0.3, 0.0]),
        ];
        let decision = LinearScanMatcher
            .nearest(&[0.0, 0.0], &candidates, ACCEPT_DISTANCE)
            .unwrap();
        assert_eq!(decision.name.as_deref(), Some("early"));
    }

    #[test]
    fn test_acceptance_is_monotonic_in_distance() {
        let accepted = LinearScanMatcher
            .nearest(&[0.0], &[record(1, "a", vec![0.4])], ACCEPT_DISTANCE)
            .unwrap();
        let closer = LinearScanMatcher
            .nearest(&[0.0], &[record(1, "a", vec![0.2])], ACCEPT_DISTANCE)
            .unwrap();
        assert!(accepted.allowed);
        assert!(closer.allowed, "a strictly closer candidate must also be accepted");
    }

    #[test]
    fn test_at_threshold_is_rejected() {
        // Acceptance is strict: distance exactly equal to the radius fails.
        let decision = LinearScanMatcher
            .nearest(&[0.0], &[record(1, "a", vec![ACCEPT_DISTANCE])], ACCEPT_DISTANCE)
            .unwrap();
        assert!(!decision.allowed);
    }

    #[test]
    fn test_empty_candidate_set_rejects() {
        let decision = LinearScanMatcher
            .nearest(&[1.0, 2.0], &[], ACCEPT_DISTANCE)
            .unwrap();
        assert!(!decision.allowed);
        assert!(decision.name.is_none());
        assert_eq!(decision.distance, f32::INFINITY);
    }

    #[test]
    fn test_dimension_mismatch_is_an_error() {
        let err = LinearScanMatcher
            .nearest(&[1.0, 2.0], &[record(7, "short", vec![1.0])], ACCEPT_DISTANCE)
            .unwrap_err();
        match err {
            MatchError::DimensionMismatch { id, stored, query } => {
                assert_eq!(id, 7);
                assert_eq!(stored, 1);
                assert_eq!(query, 2);
            }
        }
    }
}
