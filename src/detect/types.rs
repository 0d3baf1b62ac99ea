use serde::{Deserialize, Serialize};

use crate::geometry::BoundingBox;

/// Opaque handle to a thumbnail in the caller's snapshot store. The kernel
/// never dereferences it; it only carries the handle from the detection that
/// produced it to the aggregated item that retains it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailRef(pub u64);

/// A single per-frame detection as delivered by the upstream detector.
///
/// Ephemeral: nothing in the kernel retains a `RawDetection` beyond the frame
/// that produced it. The `tracking_id` is the upstream detector's identifier
/// and is known to reset or oscillate between frames; the tracker never uses
/// it for matching and carries it only for diagnostics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RawDetection {
    pub bbox: BoundingBox,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
    /// Coarse category assigned upstream (e.g. "FASHION"), if any.
    pub category: Option<String>,
    /// Free-form label text assigned upstream (e.g. "Shirt"), if any.
    pub label: Option<String>,
    /// Upstream per-object tracking id. Unstable; never used for matching.
    pub tracking_id: Option<i64>,
    pub thumbnail: Option<ThumbnailRef>,
}

impl RawDetection {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self {
            bbox,
            confidence,
            category: None,
            label: None,
            tracking_id: None,
            thumbnail: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_tracking_id(mut self, id: i64) -> Self {
        self.tracking_id = Some(id);
        self
    }

    pub fn with_thumbnail(mut self, thumbnail: ThumbnailRef) -> Self {
        self.thumbnail = Some(thumbnail);
        self
    }
}

/// Per-frame signals computed by the capture layer.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct FrameSignals {
    /// Camera motion score in [0, 1]; higher means more movement.
    pub motion: f32,
    /// Sharpness score; unbounded, higher means sharper.
    pub sharpness: f32,
    /// True when the capture layer signalled a focus operation this frame.
    pub focus_event: bool,
}

impl FrameSignals {
    pub fn steady(sharpness: f32) -> Self {
        Self {
            motion: 0.0,
            sharpness,
            focus_event: false,
        }
    }
}

impl Default for FrameSignals {
    fn default() -> Self {
        Self {
            motion: 0.0,
            sharpness: 1.0,
            focus_event: false,
        }
    }
}

/// Everything the pipeline consumes for one analyzed frame.
///
/// `timestamp_ms` is supplied by the caller; the kernel never reads the
/// system clock, so every pipeline function is deterministic under test.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameInput {
    pub frame_index: u64,
    pub timestamp_ms: u64,
    pub detections: Vec<RawDetection>,
    pub signals: FrameSignals,
}

impl FrameInput {
    pub fn new(frame_index: u64, timestamp_ms: u64, detections: Vec<RawDetection>) -> Self {
        Self {
            frame_index,
            timestamp_ms,
            detections,
            signals: FrameSignals::default(),
        }
    }

    pub fn with_signals(mut self, signals: FrameSignals) -> Self {
        self.signals = signals;
        self
    }
}
