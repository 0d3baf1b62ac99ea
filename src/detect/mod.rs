//! Detection input boundary.
//!
//! This module defines what the kernel consumes per frame:
//! - `RawDetection` / `FrameInput` / `FrameSignals`: the per-frame payload
//!   from the detector and capture layers.
//! - `DetectionSource`: the capability trait the pipeline depends on instead
//!   of a concrete detector, so fixture sources can substitute in tests.
//! - `sanitize`: malformed-box filtering applied before the tracker, with
//!   drop counting instead of errors.
//!
//! The input boundary never performs I/O and never retains detections beyond
//! the frame that produced them.

mod sanitize;
mod source;
mod types;

pub use sanitize::{sanitize, SanitizedFrame};
pub use source::{DetectionSource, ScriptedSource};
pub use types::{FrameInput, FrameSignals, RawDetection, ThumbnailRef};
