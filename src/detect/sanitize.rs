use super::types::RawDetection;

/// Result of sanitizing one frame's detections before they enter the tracker.
#[derive(Debug, Default)]
pub struct SanitizedFrame {
    pub detections: Vec<RawDetection>,
    /// Detections dropped because their box was malformed (out of [0, 1],
    /// inverted, or non-finite). Feeds the diagnostic counter; never an error.
    pub malformed_dropped: usize,
}

/// Drop malformed detections, keeping everything else untouched.
///
/// Confidence/area floors are the tracker's concern; this pass only rejects
/// boxes that are not well-formed normalized rectangles.
pub fn sanitize(detections: Vec<RawDetection>) -> SanitizedFrame {
    let mut out = SanitizedFrame::default();
    for det in detections {
        if det.bbox.is_valid() && det.confidence.is_finite() {
            out.detections.push(det);
        } else {
            log::debug!(
                "dropping malformed detection: bbox={:?} confidence={}",
                det.bbox,
                det.confidence
            );
            out.malformed_dropped += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    fn det(l: f32, t: f32, r: f32, b: f32) -> RawDetection {
        RawDetection::new(BoundingBox::new(l, t, r, b), 0.8)
    }

    #[test]
    fn keeps_well_formed_boxes() {
        let frame = sanitize(vec![det(0.1, 0.1, 0.5, 0.5), det(0.0, 0.0, 1.0, 1.0)]);
        assert_eq!(frame.detections.len(), 2);
        assert_eq!(frame.malformed_dropped, 0);
    }

    #[test]
    fn drops_inverted_and_out_of_range_boxes() {
        let frame = sanitize(vec![
            det(0.5, 0.1, 0.1, 0.5),  // inverted horizontally
            det(-0.2, 0.1, 0.5, 0.5), // out of range
            det(0.2, 0.2, 0.6, 0.6),
        ]);
        assert_eq!(frame.detections.len(), 1);
        assert_eq!(frame.malformed_dropped, 2);
    }

    #[test]
    fn drops_non_finite_confidence() {
        let mut bad = det(0.2, 0.2, 0.6, 0.6);
        bad.confidence = f32::NAN;
        let frame = sanitize(vec![bad]);
        assert!(frame.detections.is_empty());
        assert_eq!(frame.malformed_dropped, 1);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let frame = sanitize(vec![]);
        assert!(frame.detections.is_empty());
        assert_eq!(frame.malformed_dropped, 0);
    }
}
