//! Scan Session Kernel (SSK)
//!
//! This crate turns noisy per-frame object detections from a camera pipeline
//! into a deduplicated collection of scanned items, plus a real-time guidance
//! signal telling the operator when conditions are good enough to commit.
//!
//! # Architecture
//!
//! The kernel enforces a small set of invariants by construction:
//!
//! 1. **Geometry over identity**: frame-to-frame matching never trusts the
//!    upstream tracking id; it uses spatial proximity and size agreement.
//! 2. **One claim per detection**: at most one candidate absorbs a given
//!    detection per frame (greedy best-match assignment).
//! 3. **Dual lock floors**: a lock requires both a consecutive-frame count
//!    and a wall-clock duration, so lock timing survives analysis-rate
//!    changes.
//! 4. **One authorized committer**: while locked, only the locked candidate
//!    can commit; consuming the commit clears the lock.
//! 5. **Merge-or-create, exactly once**: every commit merges into exactly
//!    one existing item or creates exactly one new item.
//! 6. **Fail-safe configuration**: invalid live config updates are rejected
//!    and the last valid configuration stays in force.
//! 7. **No errors in the pipeline**: degraded inputs drop into diagnostic
//!    counters; no pipeline call returns an error or panics.
//!
//! # Module Structure
//!
//! - `geometry`: normalized-rectangle math (pure functions)
//! - `detect`: input boundary (detection types, source trait, sanitization)
//! - `track`: frame-to-frame candidate tracking
//! - `select`: center-weighted candidate ranking with ROI gating
//! - `guidance`: the scan-guidance state machine and lock logic
//! - `aggregate`: session-level item aggregation and similarity merging
//! - `session`: the owned per-session pipeline context
//! - `config` / `diag`: tunables and diagnostic counters
//!
//! Per frame: detections flow tracker -> selector -> guidance; on an
//! authorized commit the locked candidate's payload flows into the
//! aggregator, which merges or creates and updates the session statistics.
//!
//! The kernel performs no I/O, never reads the clock, and exposes no process
//! surface; hosts own threading, capture and rendering.

pub mod aggregate;
pub mod config;
pub mod detect;
pub mod diag;
pub mod geometry;
pub mod guidance;
pub mod select;
pub mod session;
pub mod track;

pub use aggregate::{
    AggregateStats, AggregatedItem, CommittedDetection, FallbackConfig, ItemId, ItemsHandle,
    MergeOutcome, SessionAggregator, SimilarityConfig, SimilarityControl, SimilarityWeights,
};
pub use config::SessionConfig;
pub use detect::{
    DetectionSource, FrameInput, FrameSignals, RawDetection, ScriptedSource, ThumbnailRef,
};
pub use diag::DiagCounters;
pub use geometry::{BoundingBox, RegionOfInterest, FRAME_DIAGONAL};
pub use guidance::{GuidanceConfig, GuidanceSnapshot, GuidanceState, LockInfo};
pub use select::{ScoredCandidate, SelectorConfig};
pub use session::{CommitEvent, FrameReport, ScanSession};
pub use track::{Candidate, CandidateId, FrameTracker, TrackerConfig};
