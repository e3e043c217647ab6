//! Captured frames as they travel through the pipeline.

use crate::geometry::ImageSize;
use crate::vision::ImageBuffer;
use std::time::SystemTime;

/// One captured image plus acquisition metadata
///
/// Frames are shared between consumers behind an `Arc` and never mutated.
#[derive(Debug, Clone)]
pub struct Frame<I> {
    /// Monotonic index assigned by the frame source, starting at 0 per run
    pub sequence: u64,
    /// Image data
    pub image: I,
    /// Wall-clock capture time
    pub timestamp: SystemTime,
    /// Position reported by the device (stream milliseconds), if any
    pub position: Option<f64>,
}

impl<I: ImageBuffer> Frame<I> {
    /// Create a frame captured now
    pub fn new(sequence: u64, image: I, position: Option<f64>) -> Self {
        Self {
            sequence,
            image,
            timestamp: SystemTime::now(),
            position,
        }
    }

    /// Dimensions of the frame's image
    pub fn size(&self) -> ImageSize {
        self.image.size()
    }
}
