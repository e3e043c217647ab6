//! Utility functions for coordinate transformations.

pub mod safe_cast;

use crate::geometry::{BoundingBox, ImageSize};
use crate::{Error, Result};

/// Map boxes found on a downscaled processing image back to frame coordinates
///
/// Each box is divided by `processing_scale` and restricted to the frame bounds.
///
/// # Errors
///
/// Returns an error if `processing_scale` is not a positive finite number
pub fn map_to_frame(boxes: &mut [BoundingBox], processing_scale: f32, frame_size: ImageSize) -> Result<()> {
    if !processing_scale.is_finite() || processing_scale <= 0.0 {
        return Err(Error::InvalidInput(format!(
            "Processing scale must be positive, got {processing_scale}"
        )));
    }

    let frame = BoundingBox::from_size(frame_size);
    for bbox in boxes.iter_mut() {
        *bbox = bbox.scale(1.0 / processing_scale).intersection(&frame);
    }

    Ok(())
}
