//! Matching a probe embedding against an ordered candidate sequence.
//!
//! Ranking (which candidate is closest) and acceptance (does it pass the
//! tolerance) are separate computations: the metric's distance orders the
//! candidates, and its match predicate decides acceptance.

use crate::store::EnrollmentStore;
use crate::types::{confidence_from_distance, Embedding, EnrollmentEntry, MatchResult, UNKNOWN_LABEL};

/// Distance metric plus an independent match predicate.
pub trait FaceMetric {
    fn distance(&self, probe: &Embedding, reference: &Embedding) -> f32;

    /// Whether `reference` is the same face as `probe` at `tolerance`.
    fn within_tolerance(&self, probe: &Embedding, reference: &Embedding, tolerance: f32) -> bool;
}

/// Euclidean distance; a pair matches when its distance is `<= tolerance`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl FaceMetric for Euclidean {
    fn distance(&self, probe: &Embedding, reference: &Embedding) -> f32 {
        probe.euclidean_distance(reference)
    }

    fn within_tolerance(&self, probe: &Embedding, reference: &Embedding, tolerance: f32) -> bool {
        probe.euclidean_distance(reference) <= tolerance
    }
}

/// Strategy for comparing a probe embedding against enrolled candidates.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, candidates: &[EnrollmentEntry], threshold: f32) -> MatchResult;
}

/// Global minimum distance, then the match predicate on that candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BestMatch<M = Euclidean> {
    pub metric: M,
}

/// First candidate in order whose match predicate passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstMatch<M = Euclidean> {
    pub metric: M,
}

impl BestMatch {
    /// Best match under the Euclidean metric.
    pub fn new() -> Self {
        Self { metric: Euclidean }
    }
}

impl FirstMatch {
    /// First match under the Euclidean metric.
    pub fn new() -> Self {
        Self { metric: Euclidean }
    }
}

impl<M: FaceMetric> Matcher for BestMatch<M> {
    fn compare(&self, probe: &Embedding, candidates: &[EnrollmentEntry], threshold: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, entry) in candidates.iter().enumerate() {
            let d = self.metric.distance(probe, &entry.embedding);
            // Strict `<` keeps the earliest candidate on ties.
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((i, d));
            }
        }

        let Some((idx, distance)) = best else {
            return MatchResult::unknown();
        };

        let entry = &candidates[idx];
        let matched = self.metric.within_tolerance(probe, &entry.embedding, threshold);

        MatchResult {
            label: if matched {
                entry.label.clone()
            } else {
                UNKNOWN_LABEL.to_string()
            },
            distance: Some(distance),
            confidence: Some(confidence_from_distance(distance)),
            matched,
            index: Some(idx),
        }
    }
}

impl<M: FaceMetric> Matcher for FirstMatch<M> {
    fn compare(&self, probe: &Embedding, candidates: &[EnrollmentEntry], threshold: f32) -> MatchResult {
        let mut closest: Option<(usize, f32)> = None;

        for (i, entry) in candidates.iter().enumerate() {
            if self.metric.within_tolerance(probe, &entry.embedding, threshold) {
                let distance = self.metric.distance(probe, &entry.embedding);
                return MatchResult {
                    label: entry.label.clone(),
                    distance: Some(distance),
                    confidence: Some(confidence_from_distance(distance)),
                    matched: true,
                    index: Some(i),
                };
            }
            let d = self.metric.distance(probe, &entry.embedding);
            if closest.map_or(true, |(_, best_d)| d < best_d) {
                closest = Some((i, d));
            }
        }

        match closest {
            Some((idx, distance)) => MatchResult {
                label: UNKNOWN_LABEL.to_string(),
                distance: Some(distance),
                confidence: Some(confidence_from_distance(distance)),
                matched: false,
                index: Some(idx),
            },
            None => MatchResult::unknown(),
        }
    }
}

/// Best-of-all policy with the Euclidean metric.
pub fn find_best_match(probe: &Embedding, candidates: &[EnrollmentEntry], threshold: f32) -> MatchResult {
    BestMatch::new().compare(probe, candidates, threshold)
}

/// First-pass-wins policy with the Euclidean metric.
pub fn find_any_match(probe: &Embedding, candidates: &[EnrollmentEntry], threshold: f32) -> MatchResult {
    FirstMatch::new().compare(probe, candidates, threshold)
}

/// Read-only recognition state owned by one session: the loaded store, the
/// matching policy and the tolerance. Built once at startup.
pub struct RecognitionContext<T: Matcher = BestMatch> {
    store: EnrollmentStore,
    matcher: T,
    threshold: f32,
}

impl RecognitionContext<BestMatch> {
    pub fn new(store: EnrollmentStore, threshold: f32) -> Self {
        Self::with_matcher(store, BestMatch::new(), threshold)
    }
}

impl<T: Matcher> RecognitionContext<T> {
    pub fn with_matcher(store: EnrollmentStore, matcher: T, threshold: f32) -> Self {
        Self {
            store,
            matcher,
            threshold,
        }
    }

    pub fn identify(&self, probe: &Embedding) -> MatchResult {
        self.matcher.compare(probe, self.store.entries(), self.threshold)
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn store(&self) -> &EnrollmentStore {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(label: &str, values: &[f32]) -> EnrollmentEntry {
        EnrollmentEntry::new(label, Embedding::new(values.to_vec()))
    }

    #[test]
    fn test_best_match_picks_minimum_distance() {
        let probe = Embedding::new(vec![1.0, 0.0, 0.0]);
        let gallery = vec![
            entry("decoy1", &[0.0, 1.0, 0.0]),
            entry("decoy2", &[0.0, 0.0, 1.0]),
            entry("match", &[0.9, 0.1, 0.0]),
        ];

        let result = find_best_match(&probe, &gallery, 0.6);
        assert!(result.matched);
        assert_eq!(result.label, "match");
        assert_eq!(result.index, Some(2));
        let expected = probe.euclidean_distance(&gallery[2].embedding);
        assert_eq!(result.distance, Some(expected));
    }

    #[test]
    fn test_best_match_minimum_over_all() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![
            entry("a", &[0.5, 0.0]),
            entry("b", &[0.2, 0.0]),
            entry("c", &[0.3, 0.0]),
            entry("d", &[0.0, 0.9]),
        ];
        let result = find_best_match(&probe, &gallery, 0.6);
        let min = gallery
            .iter()
            .map(|e| probe.euclidean_distance(&e.embedding))
            .fold(f32::INFINITY, f32::min);
        assert_eq!(result.distance, Some(min));
        assert_eq!(result.label, "b");
    }

    #[test]
    fn test_best_match_tie_prefers_earlier() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![
            entry("far", &[0.9, 0.0]),
            entry("first", &[0.3, 0.0]),
            entry("second", &[0.0, 0.3]),
        ];
        let result = find_best_match(&probe, &gallery, 0.6);
        assert_eq!(result.label, "first");
        assert_eq!(result.index, Some(1));
    }

    #[test]
    fn test_best_match_rejects_above_threshold() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![entry("alice", &[0.8, 0.0])];
        let result = find_best_match(&probe, &gallery, 0.6);
        assert!(!result.matched);
        assert_eq!(result.label, UNKNOWN_LABEL);
        // The closest candidate is still reported for annotation.
        assert!((result.distance.unwrap() - 0.8).abs() < 1e-6);
        assert_eq!(result.index, Some(0));
    }

    #[test]
    fn test_best_match_threshold_is_inclusive() {
        let probe = Embedding::new(vec![0.0]);
        let gallery = vec![entry("edge", &[0.5])];
        assert!(find_best_match(&probe, &gallery, 0.5).matched);
    }

    #[test]
    fn test_best_match_empty_candidates() {
        let probe = Embedding::new(vec![1.0, 0.0]);
        let result = find_best_match(&probe, &[], 0.6);
        assert!(!result.matched);
        assert_eq!(result.label, UNKNOWN_LABEL);
        assert_eq!(result.distance, None);
        assert_eq!(result.confidence, None);
    }

    #[test]
    fn test_identical_probe_full_confidence() {
        let alice = [0.12f32, -0.4, 0.33, 0.05];
        let gallery = vec![entry("Alice", &alice), entry("Bob", &[0.9, 0.9, 0.9, 0.9])];
        let result = find_best_match(&Embedding::new(alice.to_vec()), &gallery, 0.6);
        assert!(result.matched);
        assert_eq!(result.label, "Alice");
        assert_eq!(result.distance, Some(0.0));
        assert_eq!(result.confidence, Some(100.0));
    }

    #[test]
    fn test_confidence_negative_past_unit_distance() {
        let probe = Embedding::new(vec![0.0]);
        let gallery = vec![entry("far", &[1.5])];
        let result = find_best_match(&probe, &gallery, 0.6);
        assert_eq!(result.confidence, Some((1.0 - 1.5) * 100.0));
        assert!(result.confidence.unwrap() < 0.0);
    }

    #[test]
    fn test_any_match_stops_at_first_pass() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![
            entry("far", &[0.9, 0.0]),
            entry("ok", &[0.5, 0.0]),
            entry("better", &[0.1, 0.0]),
        ];
        let any = find_any_match(&probe, &gallery, 0.6);
        assert!(any.matched);
        assert_eq!(any.label, "ok");
        assert_eq!(any.index, Some(1));

        // Best-of-all differs when several candidates pass.
        let best = find_best_match(&probe, &gallery, 0.6);
        assert_eq!(best.label, "better");
    }

    #[test]
    fn test_any_and_best_agree_with_single_passing_candidate() {
        let probe = Embedding::new(vec![0.0, 0.0]);
        let gallery = vec![
            entry("x", &[0.9, 0.0]),
            entry("only", &[0.0, 0.2]),
            entry("y", &[0.0, 1.2]),
        ];
        let any = find_any_match(&probe, &gallery, 0.6);
        let best = find_best_match(&probe, &gallery, 0.6);
        assert!(any.matched && best.matched);
        assert_eq!(any.label, best.label);
        assert_eq!(any.label, "only");
    }

    #[test]
    fn test_any_match_none_passing_reports_closest() {
        let probe = Embedding::new(vec![0.0]);
        let gallery = vec![entry("a", &[0.9]), entry("b", &[0.7])];
        let result = find_any_match(&probe, &gallery, 0.6);
        assert!(!result.matched);
        assert_eq!(result.label, UNKNOWN_LABEL);
        assert_eq!(result.index, Some(1));
        assert!((result.distance.unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_any_match_empty_candidates() {
        let result = find_any_match(&Embedding::new(vec![0.0]), &[], 0.6);
        assert_eq!(result, MatchResult::unknown());
    }

    /// Predicate that never accepts, regardless of distance.
    struct Strict;

    impl FaceMetric for Strict {
        fn distance(&self, probe: &Embedding, reference: &Embedding) -> f32 {
            probe.euclidean_distance(reference)
        }

        fn within_tolerance(&self, _: &Embedding, _: &Embedding, _: f32) -> bool {
            false
        }
    }

    #[test]
    fn test_acceptance_is_decoupled_from_ranking() {
        let probe = Embedding::new(vec![0.0]);
        let gallery = vec![entry("same", &[0.0])];
        let result = BestMatch { metric: Strict }.compare(&probe, &gallery, 0.6);
        assert_eq!(result.distance, Some(0.0));
        assert!(!result.matched);
        assert_eq!(result.label, UNKNOWN_LABEL);
    }

    #[test]
    fn test_recognition_context_identifies() {
        let store = EnrollmentStore::from_entries(vec![
            entry("Alice", &[0.0, 0.0]),
            entry("Bob", &[1.0, 1.0]),
        ])
        .unwrap();
        let ctx = RecognitionContext::new(store, 0.5);
        let result = ctx.identify(&Embedding::new(vec![0.9, 1.0]));
        assert!(result.matched);
        assert_eq!(result.label, "Bob");
        assert_eq!(ctx.threshold(), 0.5);
    }
}
