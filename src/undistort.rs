//! Applies the latest calibration to the latest frame.

use crate::calibration::{CalibrationResult, CurrentCalibration};
use crate::frame::Frame;
use crate::vision::Vision;
use crate::Result;
use std::sync::Arc;

/// Distortion-corrected image and the calibration that produced it
#[derive(Debug, Clone)]
pub struct UndistortedFrame<I> {
    /// Sequence number of the source frame
    pub sequence: u64,
    /// Corrected image
    pub image: I,
    /// Calibration current when the frame was sampled
    pub calibration: Arc<CalibrationResult>,
}

/// Undistortion stage
///
/// Inert until a calibration becomes current. Never waits for a newer
/// calibration and never reprocesses a frame.
pub struct UndistortionStage<V: Vision> {
    vision: Arc<V>,
    current: Arc<CurrentCalibration>,
}

impl<V: Vision> UndistortionStage<V> {
    /// Create a stage reading from `current`
    pub fn new(vision: Arc<V>, current: Arc<CurrentCalibration>) -> Self {
        Self { vision, current }
    }

    /// Correct one frame with the calibration current right now
    ///
    /// Returns `Ok(None)` while no calibration exists.
    ///
    /// # Errors
    ///
    /// Returns the capability's error if undistortion fails
    pub fn process(&self, frame: &Frame<V::Image>) -> Result<Option<UndistortedFrame<V::Image>>> {
        let Some(calibration) = self.current.load() else {
            return Ok(None);
        };

        let image = self
            .vision
            .undistort(&frame.image, calibration.camera_matrix(), calibration.dist_coeffs())?;

        Ok(Some(UndistortedFrame {
            sequence: frame.sequence,
            image,
            calibration,
        }))
    }
}
