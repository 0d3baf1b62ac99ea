use super::types::FrameInput;

/// Per-frame detection producer.
///
/// The pipeline depends on this capability rather than a concrete detector so
/// that fixture sources can stand in during tests and the demo. Real
/// deployments adapt their camera/detector stack behind this trait.
///
/// Sources are pull-based: `next_frame` returns `None` when the stream is
/// exhausted. Implementations must not block for longer than one frame
/// interval.
pub trait DetectionSource: Send {
    /// Source identifier, for diagnostics.
    fn name(&self) -> &'static str;

    /// Produce the next frame of detections, or `None` at end of stream.
    fn next_frame(&mut self) -> Option<FrameInput>;
}

/// Fixture source that replays a pre-built frame sequence.
///
/// Used by the demo binary and by integration tests to drive a session with
/// a deterministic detection script.
pub struct ScriptedSource {
    frames: std::vec::IntoIter<FrameInput>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<FrameInput>) -> Self {
        Self {
            frames: frames.into_iter(),
        }
    }
}

impl DetectionSource for ScriptedSource {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn next_frame(&mut self) -> Option<FrameInput> {
        self.frames.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::types::{FrameInput, RawDetection};
    use crate::geometry::BoundingBox;

    #[test]
    fn scripted_source_replays_in_order_then_ends() {
        let frames = vec![
            FrameInput::new(0, 0, vec![]),
            FrameInput::new(
                1,
                33,
                vec![RawDetection::new(
                    BoundingBox::new(0.4, 0.4, 0.6, 0.6),
                    0.9,
                )],
            ),
        ];
        let mut source = ScriptedSource::new(frames);

        assert_eq!(source.name(), "scripted");
        let first = source.next_frame().expect("first frame");
        assert_eq!(first.frame_index, 0);
        assert!(first.detections.is_empty());

        let second = source.next_frame().expect("second frame");
        assert_eq!(second.frame_index, 1);
        assert_eq!(second.detections.len(), 1);

        assert!(source.next_frame().is_none());
        assert!(source.next_frame().is_none());
    }
}
