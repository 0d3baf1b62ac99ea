//! Scan guidance state machine.
//!
//! One state is active per analyzed frame, derived from the selected
//! candidate (or its absence), the capture layer's motion/sharpness signals,
//! and how long the current candidate has been continuously acceptable.
//!
//! Locking requires BOTH a consecutive-frame floor and a wall-clock floor, so
//! lock timing stays robust when the caller throttles the analysis rate: a
//! high frame rate cannot lock too fast and a low one cannot take forever.
//!
//! While locked, exactly one candidate id is authorized to commit. Consuming
//! a commit clears the lock, so a steady shot cannot emit duplicates; the
//! next item needs a fresh GOOD -> LOCKED cycle.
//!
//! The machine also owns the region of interest and resizes it slowly toward
//! the observed object size, within configured bounds.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::detect::FrameSignals;
use crate::geometry::RegionOfInterest;
use crate::select::ScoredCandidate;
use crate::track::CandidateId;

// ----------------------------------------------------------------------------
// States
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GuidanceState {
    /// No eligible candidate this frame.
    Searching,
    /// Candidate fills more of the frame than the upper area bound.
    TooClose,
    /// Candidate is above the selector floor but below the guidance minimum.
    TooFar,
    /// Size acceptable but the candidate sits too far from the ROI center.
    OffCenter,
    /// Motion or sharpness outside acceptable bounds.
    Unstable,
    /// Capture layer signalled a focus operation; transient.
    Focusing,
    /// Everything acceptable, stability floors not yet met.
    Good,
    /// One candidate is authorized to commit.
    Locked,
}

impl GuidanceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Searching => "SEARCHING",
            Self::TooClose => "TOO_CLOSE",
            Self::TooFar => "TOO_FAR",
            Self::OffCenter => "OFF_CENTER",
            Self::Unstable => "UNSTABLE",
            Self::Focusing => "FOCUSING",
            Self::Good => "GOOD",
            Self::Locked => "LOCKED",
        }
    }

    /// Stable key the UI layer maps to prompt text. The kernel never renders
    /// text itself.
    pub fn hint_key(&self) -> &'static str {
        match self {
            Self::Searching => "searching",
            Self::TooClose => "move_back",
            Self::TooFar => "move_closer",
            Self::OffCenter => "center_object",
            Self::Unstable => "hold_steady",
            Self::Focusing => "focusing",
            Self::Good => "almost_there",
            Self::Locked => "locked",
        }
    }
}

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GuidanceConfig {
    /// Candidate area above this fraction reads as too close.
    pub max_area: f32,
    /// Candidate area below this fraction reads as too far. Must stay above
    /// the selector's hard-reject floor for the band to exist.
    pub min_area: f32,
    /// Maximum candidate-center distance from the ROI center before the
    /// frame reads as off-center.
    pub center_tolerance: f32,
    /// Motion score (instantaneous or trailing average) above this breaks
    /// stability and any held lock.
    pub motion_break: f32,
    /// Trailing window length for the motion average, in frames.
    pub motion_window: usize,
    /// Sharpness below this reads as unstable (out of focus).
    pub min_sharpness: f32,
    /// Consecutive acceptable frames required before locking.
    pub min_stable_frames: u32,
    /// Wall-clock floor for the same run. Both floors must hold.
    pub min_stable_ms: u64,
    /// A lock nobody commits within this window is released.
    pub lock_timeout_ms: u64,
    /// How long a focus event holds the FOCUSING state.
    pub focus_hold_ms: u64,
    /// ROI resize bounds and rate: the ROI tracks the observed object size
    /// times `roi_margin`, moving `roi_adapt_rate` of the gap per frame,
    /// clamped into `[roi_min_size, roi_max_size]` per axis.
    pub roi_min_size: f32,
    pub roi_max_size: f32,
    pub roi_margin: f32,
    pub roi_adapt_rate: f32,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            max_area: 0.35,
            min_area: 0.04,
            center_tolerance: 0.18,
            motion_break: 0.25,
            motion_window: 5,
            min_sharpness: 0.3,
            min_stable_frames: 3,
            min_stable_ms: 400,
            lock_timeout_ms: 5_000,
            focus_hold_ms: 300,
            roi_min_size: 0.35,
            roi_max_size: 0.90,
            roi_margin: 1.4,
            roi_adapt_rate: 0.1,
        }
    }
}

// ----------------------------------------------------------------------------
// Lock bookkeeping
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct LockInfo {
    pub candidate: CandidateId,
    pub acquired_at_ms: u64,
    /// Consecutive acceptable frames at the moment the lock was taken.
    pub stable_frames: u32,
}

/// Outcome of a commit attempt against the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommitDecision {
    /// The lock matched and has been cleared; the caller may hand the
    /// candidate's detection payload to the aggregator.
    Authorized,
    /// No lock is held; nothing changes.
    RejectedNotLocked,
    /// A lock is held for a different candidate; nothing changes.
    RejectedWrongCandidate,
}

/// Per-frame inputs the machine cannot observe on its own.
#[derive(Clone, Copy, Debug)]
pub struct GuidanceInput<'a> {
    pub selected: Option<&'a ScoredCandidate>,
    /// Whether the locked candidate (if any) is still alive in the tracker.
    /// Ignored while unlocked.
    pub locked_candidate_tracked: bool,
    pub signals: FrameSignals,
    pub timestamp_ms: u64,
}

/// Numeric diagnostics alongside the state, for overlays and logs.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GuidanceSnapshot {
    pub state: GuidanceState,
    pub stable_frames: u32,
    pub stable_ms: u64,
    pub motion_average: f32,
    pub lock: Option<LockInfo>,
}

#[derive(Clone, Copy, Debug)]
struct StableRun {
    candidate: CandidateId,
    since_ms: u64,
    frames: u32,
}

// ----------------------------------------------------------------------------
// GuidanceMachine
// ----------------------------------------------------------------------------

pub struct GuidanceMachine {
    config: GuidanceConfig,
    roi: RegionOfInterest,
    state: GuidanceState,
    motion_history: VecDeque<f32>,
    stable: Option<StableRun>,
    lock: Option<LockInfo>,
    focus_until_ms: Option<u64>,
    last_timestamp_ms: u64,
}

impl GuidanceMachine {
    pub fn new(config: GuidanceConfig) -> Self {
        let window = config.motion_window.max(1);
        Self {
            config,
            roi: RegionOfInterest::default(),
            state: GuidanceState::Searching,
            motion_history: VecDeque::with_capacity(window),
            stable: None,
            lock: None,
            focus_until_ms: None,
            last_timestamp_ms: 0,
        }
    }

    pub fn config(&self) -> &GuidanceConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: GuidanceConfig) {
        self.config = config;
    }

    pub fn state(&self) -> GuidanceState {
        self.state
    }

    pub fn roi(&self) -> RegionOfInterest {
        self.roi
    }

    /// Viewport geometry update from the capture layer (rare).
    pub fn set_viewport_roi(&mut self, roi: RegionOfInterest) {
        self.roi = roi;
    }

    pub fn lock_info(&self) -> Option<LockInfo> {
        self.lock
    }

    pub fn locked_candidate(&self) -> Option<CandidateId> {
        self.lock.map(|l| l.candidate)
    }

    pub fn can_commit(&self) -> bool {
        self.lock.is_some()
    }

    pub fn snapshot(&self) -> GuidanceSnapshot {
        let (stable_frames, stable_ms) = match &self.stable {
            Some(run) => (
                run.frames,
                self.last_timestamp_ms.saturating_sub(run.since_ms),
            ),
            None => (0, 0),
        };
        GuidanceSnapshot {
            state: self.state,
            stable_frames,
            stable_ms,
            motion_average: self.motion_average(),
            lock: self.lock,
        }
    }

    fn motion_average(&self) -> f32 {
        if self.motion_history.is_empty() {
            return 0.0;
        }
        self.motion_history.iter().sum::<f32>() / self.motion_history.len() as f32
    }

    /// Evaluate one frame. Pure function of the inputs plus the stored
    /// motion window, stability run and lock.
    pub fn evaluate(&mut self, input: GuidanceInput<'_>) -> GuidanceState {
        self.last_timestamp_ms = input.timestamp_ms;

        self.motion_history.push_back(input.signals.motion);
        while self.motion_history.len() > self.config.motion_window.max(1) {
            self.motion_history.pop_front();
        }

        if input.signals.focus_event {
            self.focus_until_ms = Some(input.timestamp_ms + self.config.focus_hold_ms);
        }

        let instant_spike = input.signals.motion > self.config.motion_break;
        let average_spike = self.motion_average() > self.config.motion_break;
        let blurry = input.signals.sharpness < self.config.min_sharpness;

        // A held lock is maintained or broken before anything else.
        if let Some(lock) = self.lock {
            if let Some(reason) = self.lock_break_reason(
                &lock,
                input.selected,
                input.locked_candidate_tracked,
                instant_spike,
                average_spike,
                input.timestamp_ms,
            ) {
                log::debug!("guidance: lock on {} broken: {}", lock.candidate, reason);
                self.lock = None;
                self.stable = None;
                self.state = if instant_spike || average_spike {
                    GuidanceState::Unstable
                } else {
                    GuidanceState::Searching
                };
                return self.state;
            }
            self.state = GuidanceState::Locked;
            return self.state;
        }

        let Some(selected) = input.selected else {
            self.stable = None;
            self.state = GuidanceState::Searching;
            return self.state;
        };

        self.adapt_roi(selected);

        let area = selected.candidate.bbox.area();
        let (cx, cy) = selected.candidate.bbox.center();
        let off_center = self.roi.center_distance_to(cx, cy) > self.config.center_tolerance;
        let focusing = self
            .focus_until_ms
            .is_some_and(|until| input.timestamp_ms < until);

        let next = if area > self.config.max_area {
            GuidanceState::TooClose
        } else if area < self.config.min_area {
            GuidanceState::TooFar
        } else if off_center {
            GuidanceState::OffCenter
        } else if focusing {
            GuidanceState::Focusing
        } else if instant_spike || average_spike || blurry {
            GuidanceState::Unstable
        } else {
            self.advance_stable_run(selected.candidate.id, input.timestamp_ms)
        };

        if !matches!(next, GuidanceState::Good | GuidanceState::Locked) {
            // Any unacceptable frame restarts the consecutive-frame count.
            self.stable = None;
        }
        if next != self.state {
            log::debug!(
                "guidance: {} -> {} at {}ms",
                self.state.as_str(),
                next.as_str(),
                input.timestamp_ms
            );
        }
        self.state = next;
        self.state
    }

    fn advance_stable_run(&mut self, id: CandidateId, timestamp_ms: u64) -> GuidanceState {
        let run = match self.stable {
            Some(mut run) if run.candidate == id => {
                run.frames += 1;
                run
            }
            _ => StableRun {
                candidate: id,
                since_ms: timestamp_ms,
                frames: 1,
            },
        };
        self.stable = Some(run);

        let frames_ok = run.frames >= self.config.min_stable_frames;
        let time_ok = timestamp_ms.saturating_sub(run.since_ms) >= self.config.min_stable_ms;
        if frames_ok && time_ok {
            let lock = LockInfo {
                candidate: id,
                acquired_at_ms: timestamp_ms,
                stable_frames: run.frames,
            };
            log::debug!(
                "guidance: locked on {} after {} frames / {}ms",
                id,
                run.frames,
                timestamp_ms.saturating_sub(run.since_ms)
            );
            self.lock = Some(lock);
            GuidanceState::Locked
        } else {
            GuidanceState::Good
        }
    }

    fn lock_break_reason(
        &self,
        lock: &LockInfo,
        selected: Option<&ScoredCandidate>,
        locked_candidate_tracked: bool,
        instant_spike: bool,
        average_spike: bool,
        timestamp_ms: u64,
    ) -> Option<&'static str> {
        if instant_spike {
            return Some("instantaneous motion spike");
        }
        if average_spike {
            return Some("trailing motion average spike");
        }
        if !locked_candidate_tracked {
            return Some("locked candidate expired");
        }
        if let Some(sel) = selected {
            if sel.candidate.id != lock.candidate {
                return Some("selected candidate changed");
            }
        }
        if timestamp_ms.saturating_sub(lock.acquired_at_ms) >= self.config.lock_timeout_ms {
            return Some("lock timed out without a commit");
        }
        None
    }

    /// Attempt to consume the lock for `id`. Only the locked candidate is
    /// authorized; anything else is a counted no-op for the caller.
    pub fn take_commit(&mut self, id: CandidateId) -> CommitDecision {
        match self.lock {
            None => CommitDecision::RejectedNotLocked,
            Some(lock) if lock.candidate != id => CommitDecision::RejectedWrongCandidate,
            Some(_) => {
                self.lock = None;
                self.stable = None;
                self.state = GuidanceState::Searching;
                CommitDecision::Authorized
            }
        }
    }

    /// Drop all transient state: stability run, lock, motion window, focus
    /// timer. The ROI keeps its current geometry.
    pub fn reset(&mut self) {
        self.state = GuidanceState::Searching;
        self.motion_history.clear();
        self.stable = None;
        self.lock = None;
        self.focus_until_ms = None;
        self.last_timestamp_ms = 0;
    }

    /// Move the ROI toward the selected object's size, slowly and within
    /// bounds. The ROI stays centered on its current center.
    fn adapt_roi(&mut self, selected: &ScoredCandidate) {
        let target_w = (selected.candidate.bbox.width() * self.config.roi_margin)
            .clamp(self.config.roi_min_size, self.config.roi_max_size);
        let target_h = (selected.candidate.bbox.height() * self.config.roi_margin)
            .clamp(self.config.roi_min_size, self.config.roi_max_size);

        let rate = self.config.roi_adapt_rate.clamp(0.0, 1.0);
        let w = self.roi.width() + (target_w - self.roi.width()) * rate;
        let h = self.roi.height() + (target_h - self.roi.height()) * rate;

        let (cx, cy) = self.roi.center();
        let half_w = w * 0.5;
        let half_h = h * 0.5;
        self.roi = RegionOfInterest::new(crate::geometry::BoundingBox::new(
            (cx - half_w).max(0.0),
            (cy - half_h).max(0.0),
            (cx + half_w).min(1.0),
            (cy + half_h).min(1.0),
        ));
    }
}
