//! Capability interface to the vision algorithms the pipeline orchestrates.
//!
//! Pattern detection, object detection, single-object tracking, parameter
//! solvers and undistortion are provided by an implementation of [`Vision`].
//! The pipeline only sequences these calls; it never looks inside an image.
//! With the `opencv` feature enabled, [`crate::opencv_backend`] provides one.

use crate::calibration::{CameraMatrix, DistortionCoefficients, PatternSpec};
use crate::geometry::{BoundingBox, ImageSize, Point2f, Point3f};
use crate::Result;
use nalgebra::Vector3;

/// Image buffer handled by the pipeline as an opaque value
pub trait ImageBuffer: Clone + Send + Sync + 'static {
    /// Dimensions of the image
    fn size(&self) -> ImageSize;

    /// True if the buffer holds no pixels (a failed grab)
    fn is_empty(&self) -> bool {
        self.size().is_empty()
    }
}

/// Result of a pattern search on one image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternDetection {
    /// Corner points found, in pattern order
    pub corners: Vec<Point2f>,
    /// Whether the detector recognised the complete pattern
    pub found: bool,
}

/// Result of advancing a single-object tracker by one image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerUpdate {
    /// Updated object location
    pub bbox: BoundingBox,
    /// False when the tracker lost the object
    pub success: bool,
}

/// Output of the camera-calibration solver
#[derive(Debug, Clone, PartialEq)]
pub struct IntrinsicEstimate {
    /// 3×3 camera matrix
    pub camera_matrix: CameraMatrix,
    /// Lens distortion coefficients
    pub dist_coeffs: DistortionCoefficients,
    /// RMS reprojection error in pixels
    pub reprojection_error: f64,
}

/// Output of the pose solver
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSolution {
    /// Rodrigues rotation vector
    pub rotation: Vector3<f64>,
    /// Translation vector
    pub translation: Vector3<f64>,
    /// False when the solver found no solution
    pub success: bool,
}

/// Vision algorithms consumed by the pipeline
///
/// Implementations are shared between worker threads, so every method takes
/// `&self`; implementations serialize internally where the underlying
/// algorithm needs exclusive access.
pub trait Vision: Send + Sync + 'static {
    /// Image type produced by the capture device and consumed by the algorithms
    type Image: ImageBuffer;

    /// Per-object tracker state, owned exclusively by one track
    type Tracker;

    /// Search an image for the calibration pattern
    fn detect_pattern(&self, image: &Self::Image, pattern: &PatternSpec) -> Result<PatternDetection>;

    /// Detect objects of interest
    fn detect_objects(&self, image: &Self::Image) -> Result<Vec<BoundingBox>>;

    /// Create a tracker for the object at `bbox`
    fn tracker_init(&self, image: &Self::Image, bbox: BoundingBox) -> Result<Self::Tracker>;

    /// Advance a tracker to a new image
    fn tracker_update(&self, tracker: &mut Self::Tracker, image: &Self::Image) -> Result<TrackerUpdate>;

    /// Release the native resources held by a tracker
    ///
    /// Called exactly once per tracker, when its track retires or the track
    /// set is cleared.
    fn tracker_release(&self, tracker: Self::Tracker) {
        drop(tracker);
    }

    /// Estimate camera intrinsics from matching object/image point sets
    fn calibrate_camera(
        &self,
        object_points: &[Vec<Point3f>],
        image_points: &[Vec<Point2f>],
        image_size: ImageSize,
    ) -> Result<IntrinsicEstimate>;

    /// Estimate the pattern pose relative to the camera
    fn solve_pose(
        &self,
        object_points: &[Point3f],
        image_points: &[Point2f],
        camera_matrix: &CameraMatrix,
        dist_coeffs: &DistortionCoefficients,
    ) -> Result<PoseSolution>;

    /// Remove lens distortion from an image
    fn undistort(
        &self,
        image: &Self::Image,
        camera_matrix: &CameraMatrix,
        dist_coeffs: &DistortionCoefficients,
    ) -> Result<Self::Image>;

    /// Map pixel coordinates to normalized, undistorted camera coordinates
    ///
    /// The default applies the inverse camera matrix and ignores distortion.
    fn undistort_points(
        &self,
        points: &[Point2f],
        camera_matrix: &CameraMatrix,
        _dist_coeffs: &DistortionCoefficients,
    ) -> Result<Vec<Point2f>> {
        let inverse = camera_matrix
            .try_inverse()
            .ok_or_else(|| crate::Error::Calibration("Camera matrix is singular".to_string()))?;

        #[allow(clippy::cast_possible_truncation)]
        Ok(points
            .iter()
            .map(|p| {
                let h = inverse * Vector3::new(f64::from(p.x), f64::from(p.y), 1.0);
                Point2f::new((h.x / h.z) as f32, (h.y / h.z) as f32)
            })
            .collect())
    }

    /// Resize an image by a uniform factor
    fn resize(&self, image: &Self::Image, scale: f32) -> Result<Self::Image>;
}
