//! Frame-to-frame candidate tracking.
//!
//! The upstream detector's per-object tracking id resets and oscillates
//! between frames, so the tracker matches detections to live candidates by
//! geometry alone: a combined center-distance and box-size-ratio score,
//! assigned greedily in descending score order. Each detection is consumed by
//! at most one candidate per frame.
//!
//! Candidates are short-lived session state: unmatched candidates age by one
//! per frame and expire once they exceed the configured miss budget.

use serde::{Deserialize, Serialize};

use crate::detect::{RawDetection, ThumbnailRef};
use crate::geometry::BoundingBox;

/// Tracker-assigned stable identifier, independent of any upstream id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CandidateId(pub u64);

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Detections below this confidence never spawn or feed candidates.
    pub min_confidence: f32,
    /// Detections below this area fraction are noise and never enter matching.
    pub min_area: f32,
    /// Maximum center distance (normalized units) for a match to be considered.
    pub max_center_distance: f32,
    /// Maximum relative size difference for a match: a pair is eligible when
    /// `min(area)/max(area) >= 1 - max_size_delta`.
    pub max_size_delta: f32,
    /// Combined match score floor; pairs scoring below it stay unmatched.
    pub min_match_score: f32,
    /// Consecutive unmatched frames a candidate survives before expiry.
    pub expiry_frames: u32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.25,
            min_area: 0.005,
            max_center_distance: 0.12,
            max_size_delta: 0.6,
            min_match_score: 0.5,
            expiry_frames: 10,
        }
    }
}

// ----------------------------------------------------------------------------
// Candidate
// ----------------------------------------------------------------------------

/// A tracked, possibly transient detection with a tracker-assigned stable id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Candidate {
    pub id: CandidateId,
    pub bbox: BoundingBox,
    /// Confidence of the latest matching detection.
    pub confidence: f32,
    /// Frames in which this candidate matched a detection.
    pub frames_seen: u32,
    pub last_seen_frame: u64,
    /// Consecutive frames without a match.
    pub missed_frames: u32,
    pub category: Option<String>,
    pub label: Option<String>,
    pub thumbnail: Option<ThumbnailRef>,
}

impl Candidate {
    fn new(id: CandidateId, det: &RawDetection, frame_index: u64) -> Self {
        Self {
            id,
            bbox: det.bbox,
            confidence: det.confidence,
            frames_seen: 1,
            last_seen_frame: frame_index,
            missed_frames: 0,
            category: det.category.clone(),
            label: det.label.clone(),
            thumbnail: det.thumbnail,
        }
    }

    fn absorb(&mut self, det: &RawDetection, frame_index: u64) {
        self.bbox = det.bbox;
        self.confidence = det.confidence;
        self.frames_seen += 1;
        self.last_seen_frame = frame_index;
        self.missed_frames = 0;
        // Latest matching detection wins, but a missing attribute never
        // erases one we already carry.
        if det.category.is_some() {
            self.category = det.category.clone();
        }
        if det.label.is_some() {
            self.label = det.label.clone();
        }
        if det.thumbnail.is_some() {
            self.thumbnail = det.thumbnail;
        }
    }

    fn mark_missed(&mut self) {
        self.missed_frames += 1;
    }
}

// ----------------------------------------------------------------------------
// FrameTracker
// ----------------------------------------------------------------------------

pub struct FrameTracker {
    config: TrackerConfig,
    candidates: Vec<Candidate>,
    next_id: u64,
}

impl FrameTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            candidates: Vec::with_capacity(8),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: TrackerConfig) {
        self.config = config;
    }

    /// Match score for a candidate/detection pair, or `None` when the pair is
    /// outside the distance/size gates. Score blends proximity and size
    /// agreement, both in [0, 1].
    fn match_score(&self, candidate: &Candidate, det: &RawDetection) -> Option<f32> {
        let distance = candidate.bbox.center_distance(&det.bbox);
        if distance > self.config.max_center_distance {
            return None;
        }
        let size_ratio = candidate.bbox.size_ratio(&det.bbox);
        if size_ratio < 1.0 - self.config.max_size_delta {
            return None;
        }
        let proximity = 1.0 - distance / self.config.max_center_distance;
        let score = 0.6 * proximity + 0.4 * size_ratio;
        (score >= self.config.min_match_score).then_some(score)
    }

    /// Process one frame of detections and return the live candidate set.
    ///
    /// An empty detection list ages every candidate by one; candidates past
    /// the miss budget are removed. Never fails.
    pub fn update(&mut self, detections: &[RawDetection], frame_index: u64) -> &[Candidate] {
        let eligible: Vec<&RawDetection> = detections
            .iter()
            .filter(|d| {
                d.confidence >= self.config.min_confidence && d.bbox.area() >= self.config.min_area
            })
            .collect();

        // Score all candidate/detection pairs, then assign greedily in
        // descending score order, each side consumed at most once.
        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ci, candidate) in self.candidates.iter().enumerate() {
            for (di, det) in eligible.iter().enumerate() {
                if let Some(score) = self.match_score(candidate, det) {
                    pairs.push((ci, di, score));
                }
            }
        }
        pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

        let mut candidate_taken = vec![false; self.candidates.len()];
        let mut detection_taken = vec![false; eligible.len()];
        for (ci, di, _) in &pairs {
            if candidate_taken[*ci] || detection_taken[*di] {
                continue;
            }
            candidate_taken[*ci] = true;
            detection_taken[*di] = true;
            self.candidates[*ci].absorb(eligible[*di], frame_index);
        }

        for (ci, taken) in candidate_taken.iter().enumerate() {
            if !taken {
                self.candidates[ci].mark_missed();
            }
        }

        for (di, taken) in detection_taken.iter().enumerate() {
            if !taken {
                let id = CandidateId(self.next_id);
                self.next_id += 1;
                log::debug!("tracker: new candidate {} at frame {}", id, frame_index);
                self.candidates
                    .push(Candidate::new(id, eligible[di], frame_index));
            }
        }

        let expiry = self.config.expiry_frames;
        self.candidates.retain(|c| {
            let keep = c.missed_frames <= expiry;
            if !keep {
                log::debug!(
                    "tracker: candidate {} expired after {} missed frames",
                    c.id,
                    c.missed_frames
                );
            }
            keep
        });

        &self.candidates
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn get(&self, id: CandidateId) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    /// True when the candidate is still tracked.
    pub fn contains(&self, id: CandidateId) -> bool {
        self.get(id).is_some()
    }

    pub fn reset(&mut self) {
        self.candidates.clear();
        self.next_id = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(l: f32, t: f32, r: f32, b: f32, confidence: f32) -> RawDetection {
        RawDetection::new(BoundingBox::new(l, t, r, b), confidence)
    }

    fn tracker() -> FrameTracker {
        FrameTracker::new(TrackerConfig::default())
    }

    #[test]
    fn detection_spawns_candidate_and_keeps_id_under_jitter() {
        let mut tracker = tracker();

        tracker.update(&[det(0.40, 0.40, 0.60, 0.60, 0.9)], 0);
        assert_eq!(tracker.candidates().len(), 1);
        let id = tracker.candidates()[0].id;

        // Small drift frame to frame, same physical object.
        tracker.update(&[det(0.41, 0.40, 0.61, 0.61, 0.85)], 1);
        tracker.update(&[det(0.42, 0.41, 0.62, 0.61, 0.88)], 2);

        assert_eq!(tracker.candidates().len(), 1);
        assert_eq!(tracker.candidates()[0].id, id);
        assert_eq!(tracker.candidates()[0].frames_seen, 3);
    }

    #[test]
    fn matching_ignores_external_tracking_id() {
        let mut tracker = tracker();

        tracker.update(&[det(0.40, 0.40, 0.60, 0.60, 0.9).with_tracking_id(7)], 0);
        let id = tracker.candidates()[0].id;

        // Upstream id churns every frame; geometry stays stable.
        for (frame, upstream) in [(1u64, 99i64), (2, -3), (3, 7), (4, 1234)] {
            tracker.update(
                &[det(0.40, 0.40, 0.60, 0.60, 0.9).with_tracking_id(upstream)],
                frame,
            );
        }

        assert_eq!(tracker.candidates().len(), 1);
        assert_eq!(tracker.candidates()[0].id, id);
    }

    #[test]
    fn distant_detection_spawns_second_candidate() {
        let mut tracker = tracker();

        tracker.update(&[det(0.10, 0.10, 0.25, 0.25, 0.9)], 0);
        tracker.update(
            &[
                det(0.10, 0.10, 0.25, 0.25, 0.9),
                det(0.70, 0.70, 0.85, 0.85, 0.9),
            ],
            1,
        );

        assert_eq!(tracker.candidates().len(), 2);
    }

    #[test]
    fn each_detection_feeds_at_most_one_candidate() {
        let mut tracker = tracker();

        // Two overlapping candidates.
        tracker.update(
            &[
                det(0.40, 0.40, 0.60, 0.60, 0.9),
                det(0.44, 0.44, 0.64, 0.64, 0.9),
            ],
            0,
        );
        assert_eq!(tracker.candidates().len(), 2);

        // One detection near both: exactly one candidate absorbs it, the
        // other ages.
        tracker.update(&[det(0.42, 0.42, 0.62, 0.62, 0.9)], 1);
        let matched: Vec<_> = tracker
            .candidates()
            .iter()
            .filter(|c| c.missed_frames == 0)
            .collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(
            tracker
                .candidates()
                .iter()
                .filter(|c| c.missed_frames == 1)
                .count(),
            1
        );
    }

    #[test]
    fn empty_updates_age_and_expire_everything() {
        let mut tracker = tracker();
        tracker.update(&[det(0.40, 0.40, 0.60, 0.60, 0.9)], 0);

        let expiry = tracker.config().expiry_frames as u64;
        for frame in 1..=expiry + 1 {
            tracker.update(&[], frame);
        }

        assert!(tracker.candidates().is_empty());
    }

    #[test]
    fn low_confidence_and_tiny_boxes_never_spawn() {
        let mut tracker = tracker();

        tracker.update(
            &[
                det(0.40, 0.40, 0.60, 0.60, 0.1),    // below confidence floor
                det(0.50, 0.50, 0.52, 0.52, 0.9),    // below area floor
            ],
            0,
        );
        assert!(tracker.candidates().is_empty());
    }

    #[test]
    fn size_jump_beyond_delta_is_a_new_candidate() {
        let mut tracker = tracker();

        tracker.update(&[det(0.45, 0.45, 0.55, 0.55, 0.9)], 0);
        // Same center, but ~9x the area: outside the size gate.
        tracker.update(&[det(0.35, 0.35, 0.65, 0.65, 0.9)], 1);

        assert_eq!(tracker.candidates().len(), 2);
    }

    #[test]
    fn attributes_follow_latest_match_without_erasing() {
        let mut tracker = tracker();

        tracker.update(
            &[det(0.4, 0.4, 0.6, 0.6, 0.9)
                .with_category("FASHION")
                .with_label("Shirt")],
            0,
        );
        // Next frame's detection has no label; the carried one survives.
        tracker.update(&[det(0.41, 0.4, 0.61, 0.6, 0.8).with_category("FASHION")], 1);

        let c = &tracker.candidates()[0];
        assert_eq!(c.category.as_deref(), Some("FASHION"));
        assert_eq!(c.label.as_deref(), Some("Shirt"));
        assert!((c.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn reset_clears_candidates_and_ids() {
        let mut tracker = tracker();
        tracker.update(&[det(0.4, 0.4, 0.6, 0.6, 0.9)], 0);
        tracker.reset();
        assert!(tracker.candidates().is_empty());

        tracker.update(&[det(0.4, 0.4, 0.6, 0.6, 0.9)], 0);
        assert_eq!(tracker.candidates()[0].id, CandidateId(1));
    }
}
