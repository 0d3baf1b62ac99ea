//! Normalized-rectangle math shared by the tracker, selector, guidance and
//! aggregation layers.
//!
//! All coordinates are normalized to the [0, 1] frame space: `left <= right`,
//! `top <= bottom`, origin at the top-left corner. The diagonal of that space
//! is `sqrt(2)`, which is the normalization constant for center-distance
//! scores.
//!
//! Everything in this module is a pure function over value types. No state.

use serde::{Deserialize, Serialize};

/// Diagonal of the normalized frame space, used to normalize center distances.
pub const FRAME_DIAGONAL: f32 = std::f32::consts::SQRT_2;

// ----------------------------------------------------------------------------
// BoundingBox
// ----------------------------------------------------------------------------

/// Axis-aligned box in normalized frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// A box is valid when all coordinates are finite, inside [0, 1], and the
    /// edges are correctly ordered. Invalid boxes are dropped at the input
    /// boundary before they reach the tracker.
    pub fn is_valid(&self) -> bool {
        let coords = [self.left, self.top, self.right, self.bottom];
        coords.iter().all(|c| c.is_finite() && (0.0..=1.0).contains(c))
            && self.left <= self.right
            && self.top <= self.bottom
    }

    pub fn width(&self) -> f32 {
        (self.right - self.left).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.bottom - self.top).max(0.0)
    }

    /// Area as a fraction of the frame (frame area is 1.0).
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.left + self.right) * 0.5,
            (self.top + self.bottom) * 0.5,
        )
    }

    /// Euclidean distance between box centers, in normalized units.
    pub fn center_distance(&self, other: &BoundingBox) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// Intersection-over-union. Zero when the boxes do not overlap or when
    /// the union is degenerate.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.left.max(other.left);
        let iy1 = self.top.max(other.top);
        let ix2 = self.right.min(other.right);
        let iy2 = self.bottom.min(other.bottom);

        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        if inter <= 0.0 {
            return 0.0;
        }

        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// Ratio of the smaller area to the larger area, in (0, 1]. Zero when
    /// either box is degenerate.
    pub fn size_ratio(&self, other: &BoundingBox) -> f32 {
        let a = self.area();
        let b = other.area();
        if a <= 0.0 || b <= 0.0 {
            return 0.0;
        }
        a.min(b) / a.max(b)
    }
}

// ----------------------------------------------------------------------------
// RegionOfInterest
// ----------------------------------------------------------------------------

/// The area of the frame in which detections are eligible for selection and
/// guidance. Owned by the guidance layer; consumers receive copies and never
/// observe a mid-pass mutation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionOfInterest {
    pub rect: BoundingBox,
}

impl RegionOfInterest {
    pub fn new(rect: BoundingBox) -> Self {
        Self { rect }
    }

    /// Centered ROI covering `width` x `height` of the frame.
    pub fn centered(width: f32, height: f32) -> Self {
        let half_w = (width.clamp(0.0, 1.0)) * 0.5;
        let half_h = (height.clamp(0.0, 1.0)) * 0.5;
        Self {
            rect: BoundingBox::new(0.5 - half_w, 0.5 - half_h, 0.5 + half_w, 0.5 + half_h),
        }
    }

    pub fn center(&self) -> (f32, f32) {
        self.rect.center()
    }

    pub fn width(&self) -> f32 {
        self.rect.width()
    }

    pub fn height(&self) -> f32 {
        self.rect.height()
    }

    pub fn contains_point(&self, x: f32, y: f32) -> bool {
        x >= self.rect.left && x <= self.rect.right && y >= self.rect.top && y <= self.rect.bottom
    }

    /// Distance from a point to the ROI center, in normalized units.
    pub fn center_distance_to(&self, x: f32, y: f32) -> f32 {
        let (cx, cy) = self.center();
        ((x - cx).powi(2) + (y - cy).powi(2)).sqrt()
    }
}

impl Default for RegionOfInterest {
    fn default() -> Self {
        Self::centered(0.8, 0.8)
    }
}
