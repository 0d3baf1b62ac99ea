//! The per-session pipeline context.
//!
//! `ScanSession` owns the tracker, selector, guidance machine and aggregator
//! and runs them in order once per analyzed frame. Callers serialize frame
//! delivery; every method is synchronous and bounded. The only shared state
//! is the aggregated item collection (single writer, many readers) and the
//! live similarity configuration, both reachable through cloneable handles.

use anyhow::Result;

use crate::aggregate::{
    AggregateStats, AggregatedItem, CommittedDetection, ItemsHandle, MergeOutcome,
    SessionAggregator, SimilarityControl,
};
use crate::config::SessionConfig;
use crate::detect::{sanitize, DetectionSource, FrameInput};
use crate::diag::DiagCounters;
use crate::geometry::RegionOfInterest;
use crate::guidance::{
    CommitDecision, GuidanceInput, GuidanceMachine, GuidanceSnapshot, GuidanceState,
};
use crate::select::{CandidateSelector, ScoredCandidate};
use crate::track::{CandidateId, FrameTracker};

/// Everything a caller needs from one pipeline step: overlay candidates, the
/// guidance state with its UI hint key and numeric diagnostics, and whether a
/// commit is currently authorized.
#[derive(Clone, Debug)]
pub struct FrameReport {
    pub frame_index: u64,
    pub timestamp_ms: u64,
    /// Ranked eligible candidates for the live overlay, at most two.
    pub eligible: Vec<ScoredCandidate>,
    pub state: GuidanceState,
    pub hint_key: &'static str,
    pub guidance: GuidanceSnapshot,
    pub can_commit: bool,
    /// Malformed detections dropped from this frame's input.
    pub malformed_dropped: usize,
}

/// A consumed commit: the detection payload that entered the aggregator
/// (observable for downstream classification triggering) and what the
/// aggregator did with it.
#[derive(Clone, Debug)]
pub struct CommitEvent {
    pub detection: CommittedDetection,
    pub outcome: MergeOutcome,
}

pub struct ScanSession {
    config: SessionConfig,
    tracker: FrameTracker,
    selector: CandidateSelector,
    guidance: GuidanceMachine,
    aggregator: SessionAggregator,
    diag: DiagCounters,
    next_detection_id: u64,
    last_timestamp_ms: u64,
}

impl ScanSession {
    pub fn new(config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            tracker: FrameTracker::new(config.tracker.clone()),
            selector: CandidateSelector::new(config.selector.clone()),
            guidance: GuidanceMachine::new(config.guidance.clone()),
            aggregator: SessionAggregator::new(config.similarity.clone())?,
            config,
            diag: DiagCounters::default(),
            next_detection_id: 1,
            last_timestamp_ms: 0,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Replace the whole configuration at runtime. Fail-safe: a config that
    /// fails validation changes nothing and is counted as a rejection.
    pub fn apply_config(&mut self, config: SessionConfig) -> Result<()> {
        if let Err(err) = config.validate() {
            self.diag.config_rejections += 1;
            log::warn!("session: config update rejected: {err}");
            return Err(err);
        }
        self.tracker.set_config(config.tracker.clone());
        self.selector.set_config(config.selector.clone());
        self.guidance.set_config(config.guidance.clone());
        // Already validated above; the control re-checks and cannot fail.
        let _ = self
            .aggregator
            .config_control()
            .update(config.similarity.clone());
        self.config = config;
        Ok(())
    }

    /// Run one frame through the pipeline: sanitize, track, select, evaluate
    /// guidance. Committing is a separate, explicit step.
    pub fn process_frame(&mut self, frame: FrameInput) -> FrameReport {
        let FrameInput {
            frame_index,
            timestamp_ms,
            detections,
            signals,
        } = frame;

        let sanitized = sanitize(detections);
        self.diag.malformed_dropped += sanitized.malformed_dropped as u64;

        self.tracker.update(&sanitized.detections, frame_index);

        let roi = self.guidance.roi();
        let eligible = self.selector.select(self.tracker.candidates(), &roi);

        let locked_candidate_tracked = self
            .guidance
            .locked_candidate()
            .map(|id| self.tracker.contains(id))
            .unwrap_or(true);

        let state = self.guidance.evaluate(GuidanceInput {
            selected: eligible.first(),
            locked_candidate_tracked,
            signals,
            timestamp_ms,
        });
        self.last_timestamp_ms = timestamp_ms;

        FrameReport {
            frame_index,
            timestamp_ms,
            hint_key: state.hint_key(),
            state,
            guidance: self.guidance.snapshot(),
            can_commit: self.guidance.can_commit(),
            malformed_dropped: sanitized.malformed_dropped,
            eligible,
        }
    }

    /// Pull one frame from a detection source and process it. Returns `None`
    /// when the source is exhausted.
    pub fn process_from(&mut self, source: &mut dyn DetectionSource) -> Option<FrameReport> {
        let frame = source.next_frame()?;
        Some(self.process_frame(frame))
    }

    /// Commit the detection payload of candidate `id`.
    ///
    /// Only the currently locked candidate is authorized; any other id is a
    /// counted no-op that mutates nothing (the lock, if any, stays intact).
    /// A consumed commit clears the lock, so the next item requires a fresh
    /// stable cycle.
    pub fn commit(&mut self, id: CandidateId) -> Option<CommitEvent> {
        let Some(candidate) = self.tracker.get(id).cloned() else {
            self.diag.rejected_commits += 1;
            log::warn!("session: commit rejected, candidate {} is not tracked", id);
            return None;
        };

        match self.guidance.take_commit(id) {
            CommitDecision::Authorized => {}
            CommitDecision::RejectedNotLocked => {
                self.diag.rejected_commits += 1;
                log::warn!("session: commit rejected, no lock held");
                return None;
            }
            CommitDecision::RejectedWrongCandidate => {
                self.diag.rejected_commits += 1;
                log::warn!(
                    "session: commit rejected, {} is not the locked candidate",
                    id
                );
                return None;
            }
        }

        let detection_id = self.next_detection_id;
        self.next_detection_id += 1;
        let det = CommittedDetection {
            detection_id,
            candidate: id,
            bbox: candidate.bbox,
            confidence: candidate.confidence,
            category: candidate.category,
            label: candidate.label,
            thumbnail: candidate.thumbnail,
            timestamp_ms: self.last_timestamp_ms,
        };
        let outcome = self.aggregator.process_commit(det.clone());
        Some(CommitEvent {
            detection: det,
            outcome,
        })
    }

    /// Commit whatever candidate currently holds the lock, if any.
    pub fn commit_locked(&mut self) -> Option<CommitEvent> {
        let id = self.guidance.locked_candidate()?;
        self.commit(id)
    }

    /// Clear tracker, guidance, aggregator and diagnostics together. Callers
    /// must not run this concurrently with a frame evaluation; there is no
    /// partial reset.
    pub fn reset(&mut self) {
        self.tracker.reset();
        self.guidance.reset();
        self.aggregator.reset();
        self.diag.reset();
        log::debug!("session: reset");
    }

    // ------------------------------------------------------------------
    // Read surface
    // ------------------------------------------------------------------

    pub fn state(&self) -> GuidanceState {
        self.guidance.state()
    }

    pub fn roi(&self) -> RegionOfInterest {
        self.guidance.roi()
    }

    /// Viewport geometry update from the capture layer (rare).
    pub fn set_viewport_roi(&mut self, roi: RegionOfInterest) {
        self.guidance.set_viewport_roi(roi);
    }

    pub fn items(&self) -> Vec<AggregatedItem> {
        self.aggregator.items()
    }

    /// Cloneable read handle for a consumer thread.
    pub fn items_handle(&self) -> ItemsHandle {
        self.aggregator.items_handle()
    }

    /// Handle for live similarity tuning from an external control.
    pub fn similarity_control(&self) -> SimilarityControl {
        self.aggregator.config_control()
    }

    pub fn stats(&self) -> AggregateStats {
        self.aggregator.stats()
    }

    pub fn diag(&self) -> DiagCounters {
        self.diag
    }

    /// Remove items older than `max_age_ms` relative to `now_ms`.
    pub fn remove_stale_items(&mut self, max_age_ms: u64, now_ms: u64) -> usize {
        self.aggregator.remove_stale(max_age_ms, now_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{FrameSignals, RawDetection};
    use crate::geometry::BoundingBox;

    fn session() -> ScanSession {
        ScanSession::new(SessionConfig::default()).expect("default config is valid")
    }

    fn centered_detection() -> RawDetection {
        RawDetection::new(BoundingBox::new(0.35, 0.35, 0.65, 0.65), 0.9)
            .with_category("FASHION")
            .with_label("Shirt")
    }

    fn frame(index: u64, timestamp_ms: u64, detections: Vec<RawDetection>) -> FrameInput {
        FrameInput::new(index, timestamp_ms, detections).with_signals(FrameSignals::steady(1.0))
    }

    /// Drive steady frames until the session locks.
    fn lock_session(session: &mut ScanSession) -> CandidateId {
        for i in 0..5 {
            session.process_frame(frame(i, i * 200, vec![centered_detection()]));
        }
        assert_eq!(session.state(), GuidanceState::Locked);
        session
            .guidance
            .locked_candidate()
            .expect("session is locked")
    }

    #[test]
    fn empty_frames_keep_searching() {
        let mut s = session();
        let report = s.process_frame(frame(0, 0, vec![]));
        assert_eq!(report.state, GuidanceState::Searching);
        assert_eq!(report.hint_key, "searching");
        assert!(report.eligible.is_empty());
        assert!(!report.can_commit);
    }

    #[test]
    fn steady_object_reaches_lock_and_commits_once() {
        let mut s = session();
        let id = lock_session(&mut s);

        let event = s.commit(id).expect("locked commit succeeds");
        assert!(matches!(event.outcome, MergeOutcome::Created(_)));
        assert_eq!(event.detection.label.as_deref(), Some("Shirt"));
        assert_eq!(s.items().len(), 1);
        assert_eq!(s.state(), GuidanceState::Searching);

        // The lock was consumed; an immediate second commit is a no-op.
        assert!(s.commit(id).is_none());
        assert_eq!(s.diag().rejected_commits, 1);
        assert_eq!(s.items().len(), 1);
    }

    #[test]
    fn commit_for_wrong_candidate_is_a_counted_no_op() {
        let mut s = session();
        let id = lock_session(&mut s);

        assert!(s.commit(CandidateId(id.0 + 99)).is_none());
        assert_eq!(s.diag().rejected_commits, 1);
        // The lock survives a bad attempt.
        assert!(s.commit_locked().is_some());
    }

    #[test]
    fn malformed_detections_are_counted_not_fatal() {
        let mut s = session();
        let bad = RawDetection::new(BoundingBox::new(0.9, 0.1, 0.1, 0.9), 0.9);
        let report = s.process_frame(frame(0, 0, vec![bad, centered_detection()]));
        assert_eq!(report.malformed_dropped, 1);
        assert_eq!(s.diag().malformed_dropped, 1);
        assert_eq!(report.eligible.len(), 1);
    }

    #[test]
    fn reset_clears_every_layer_together() {
        let mut s = session();
        let id = lock_session(&mut s);
        s.commit(id);
        assert_eq!(s.items().len(), 1);

        s.reset();
        assert_eq!(s.state(), GuidanceState::Searching);
        assert!(s.items().is_empty());
        assert_eq!(s.stats().total_items, 0);
        assert_eq!(s.diag().rejected_commits, 0);
        // No stale lock: committing now is a rejected no-op.
        assert!(s.commit_locked().is_none());
    }

    #[test]
    fn rejected_config_update_keeps_the_old_one() {
        let mut s = session();
        let mut bad = SessionConfig::default();
        bad.guidance.min_area = 0.5;
        bad.guidance.max_area = 0.4;
        assert!(s.apply_config(bad).is_err());
        assert_eq!(s.diag().config_rejections, 1);
        // Old config still drives the pipeline.
        assert_eq!(
            s.config().guidance.max_area,
            SessionConfig::default().guidance.max_area
        );
    }

    #[test]
    fn process_from_drains_a_scripted_source() {
        use crate::detect::ScriptedSource;

        let mut s = session();
        let mut source = ScriptedSource::new(vec![
            frame(0, 0, vec![centered_detection()]),
            frame(1, 200, vec![centered_detection()]),
        ]);

        assert!(s.process_from(&mut source).is_some());
        assert!(s.process_from(&mut source).is_some());
        assert!(s.process_from(&mut source).is_none());
    }
}
