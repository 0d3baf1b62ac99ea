//! Center-weighted candidate selection.
//!
//! Given the tracker's live candidates and the current region of interest,
//! the selector applies hard filters, scores the survivors, and returns at
//! most two eligible candidates per frame for preview and guidance.
//!
//! Scoring blends confidence, plausible-size fit and centering:
//! `0.5 * confidence + 0.2 * normalized_area + 0.3 * center_score`.
//!
//! The ROI containment filter has one escape hatch: a detection whose
//! confidence exceeds the override threshold is kept even when its center
//! falls outside the ROI, so edge jitter cannot discard an obviously real
//! object. That override is also the main source of background
//! false-positives, so it is a first-class flag that can be disabled.

use serde::{Deserialize, Serialize};

use crate::geometry::RegionOfInterest;
use crate::track::Candidate;

const CONFIDENCE_WEIGHT: f32 = 0.5;
const AREA_WEIGHT: f32 = 0.2;
const CENTER_WEIGHT: f32 = 0.3;

/// Maximum number of eligible candidates reported per frame.
pub const MAX_SELECTED: usize = 2;

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SelectorConfig {
    /// Hard reject: candidates smaller than this fraction of the frame.
    pub min_area_fraction: f32,
    /// Keep an out-of-ROI candidate anyway when its confidence exceeds
    /// `roi_override_confidence`. Known background false-positive source;
    /// disable to enforce strict containment.
    pub roi_override_enabled: bool,
    pub roi_override_confidence: f32,
    /// Plausible object-size band used to normalize the area term.
    pub plausible_area_min: f32,
    pub plausible_area_max: f32,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_area_fraction: 0.03,
            roi_override_enabled: true,
            roi_override_confidence: 0.8,
            plausible_area_min: 0.03,
            plausible_area_max: 0.50,
        }
    }
}

// ----------------------------------------------------------------------------
// Selection
// ----------------------------------------------------------------------------

/// A candidate that passed the hard filters, with its score breakdown.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: f32,
    pub center_score: f32,
    pub normalized_area: f32,
    /// True when the candidate was kept by the high-confidence ROI override
    /// rather than by containment.
    pub roi_override: bool,
}

pub struct CandidateSelector {
    config: SelectorConfig,
}

impl CandidateSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: SelectorConfig) {
        self.config = config;
    }

    /// Rank candidates against the ROI. Output is ordered by score
    /// descending, ties broken by larger area, truncated to `MAX_SELECTED`.
    pub fn select(&self, candidates: &[Candidate], roi: &RegionOfInterest) -> Vec<ScoredCandidate> {
        let mut scored: Vec<ScoredCandidate> = candidates
            .iter()
            .filter_map(|c| self.score(c, roi))
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.candidate
                        .bbox
                        .area()
                        .partial_cmp(&a.candidate.bbox.area())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        scored.truncate(MAX_SELECTED);
        scored
    }

    fn score(&self, candidate: &Candidate, roi: &RegionOfInterest) -> Option<ScoredCandidate> {
        let area = candidate.bbox.area();
        if area < self.config.min_area_fraction {
            return None;
        }

        let (cx, cy) = candidate.bbox.center();
        let contained = roi.contains_point(cx, cy);
        let roi_override = !contained
            && self.config.roi_override_enabled
            && candidate.confidence > self.config.roi_override_confidence;
        if !contained && !roi_override {
            return None;
        }

        let normalized_area = self.normalized_area(area);
        let center_score = self.center_score(roi, cx, cy);
        let score = CONFIDENCE_WEIGHT * candidate.confidence
            + AREA_WEIGHT * normalized_area
            + CENTER_WEIGHT * center_score;

        Some(ScoredCandidate {
            candidate: candidate.clone(),
            score,
            center_score,
            normalized_area,
            roi_override,
        })
    }

    /// Area clipped into the plausible object-size band, mapped to [0, 1].
    fn normalized_area(&self, area: f32) -> f32 {
        let min = self.config.plausible_area_min;
        let max = self.config.plausible_area_max;
        if max <= min {
            return 0.0;
        }
        ((area - min) / (max - min)).clamp(0.0, 1.0)
    }

    /// 1.0 at the ROI center, falling linearly to 0.0 at the ROI corner.
    fn center_score(&self, roi: &RegionOfInterest, x: f32, y: f32) -> f32 {
        let half_diagonal =
            (roi.width().powi(2) + roi.height().powi(2)).sqrt() * 0.5;
        if half_diagonal <= 0.0 {
            return 0.0;
        }
        (1.0 - roi.center_distance_to(x, y) / half_diagonal).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use crate::track::CandidateId;

    fn candidate(id: u64, l: f32, t: f32, r: f32, b: f32, confidence: f32) -> Candidate {
        Candidate {
            id: CandidateId(id),
            bbox: BoundingBox::new(l, t, r, b),
            confidence,
            frames_seen: 3,
            last_seen_frame: 3,
            missed_frames: 0,
            category: None,
            label: None,
            thumbnail: None,
        }
    }

    fn selector() -> CandidateSelector {
        CandidateSelector::new(SelectorConfig::default())
    }

    fn roi() -> RegionOfInterest {
        RegionOfInterest::centered(0.6, 0.6)
    }

    #[test]
    fn centered_candidate_outranks_peripheral_one() {
        let selector = selector();
        let centered = candidate(1, 0.40, 0.40, 0.60, 0.60, 0.7);
        let peripheral = candidate(2, 0.55, 0.55, 0.78, 0.78, 0.7);

        let out = selector.select(&[peripheral, centered], &roi());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].candidate.id, CandidateId(1));
    }

    #[test]
    fn output_is_capped_at_two() {
        let selector = selector();
        let candidates = vec![
            candidate(1, 0.40, 0.40, 0.60, 0.60, 0.9),
            candidate(2, 0.35, 0.35, 0.55, 0.55, 0.8),
            candidate(3, 0.45, 0.45, 0.65, 0.65, 0.7),
        ];
        assert_eq!(selector.select(&candidates, &roi()).len(), 2);
    }

    #[test]
    fn tiny_candidate_is_hard_rejected() {
        let selector = selector();
        // 2% of the frame, below the 3% floor, despite high confidence.
        let tiny = candidate(1, 0.45, 0.45, 0.55, 0.65, 0.99);
        assert!(tiny.bbox.area() < 0.03);
        assert!(selector.select(&[tiny], &roi()).is_empty());
    }

    #[test]
    fn out_of_roi_center_is_rejected_at_normal_confidence() {
        let selector = selector();
        let outside = candidate(1, 0.75, 0.75, 0.99, 0.99, 0.7);
        assert!(selector.select(&[outside], &roi()).is_empty());
    }

    #[test]
    fn high_confidence_override_keeps_out_of_roi_candidate() {
        let selector = selector();
        let outside = candidate(1, 0.75, 0.75, 0.99, 0.99, 0.95);

        let out = selector.select(&[outside], &roi());
        assert_eq!(out.len(), 1);
        assert!(out[0].roi_override);
    }

    #[test]
    fn override_can_be_disabled() {
        let mut cfg = SelectorConfig::default();
        cfg.roi_override_enabled = false;
        let selector = CandidateSelector::new(cfg);

        let outside = candidate(1, 0.75, 0.75, 0.99, 0.99, 0.95);
        assert!(selector.select(&[outside], &roi()).is_empty());
    }

    #[test]
    fn near_equal_scores_order_toward_larger_area() {
        let selector = selector();
        let small = candidate(1, 0.40, 0.40, 0.58, 0.58, 0.5);
        let large = candidate(2, 0.38, 0.38, 0.62, 0.62, 0.5);

        let out = selector.select(&[small, large], &roi());
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].candidate.id, CandidateId(2));
    }
}
