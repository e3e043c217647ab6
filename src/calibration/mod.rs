//! Camera calibration: pattern sampling, intrinsic/extrinsic estimation and
//! persistence of the resulting parameters.
//!
//! The [`Calibrator`] ties an accumulator of pattern samples to the
//! [`CurrentCalibration`] cell read by the undistortion stage.

pub mod accumulator;
pub mod calibrator;
pub mod pattern;
pub mod result;
pub mod storage;

pub use accumulator::{
    CalibrationAccumulator, ExtrinsicProblem, IntrinsicProblem, SampleOutcome, SampleWindow, WindowMode,
};
pub use calibrator::{Calibrator, SampleReport};
pub use pattern::{CalibrationSample, PatternSpec};
pub use result::{CalibrationResult, CurrentCalibration};

use crate::constants::DISTORTION_COEFFICIENTS;
use crate::geometry::Point2f;
use crate::vision::Vision;
use crate::{Error, Result};

/// 3×3 pinhole camera matrix
pub type CameraMatrix = nalgebra::Matrix3<f64>;

/// Lens distortion coefficients (k1, k2, p1, p2, k3, k4, k5, k6)
pub type DistortionCoefficients = nalgebra::SVector<f64, DISTORTION_COEFFICIENTS>;

/// Signed angle in degrees between the optical axis and the ray through `point`
///
/// The point is undistorted into normalized camera coordinates; the sign
/// follows the horizontal offset, so objects left of the optical center give
/// negative angles.
///
/// # Errors
///
/// Returns an error if the capability cannot undistort the point.
pub fn bearing_angle<V: Vision>(vision: &V, calibration: &CalibrationResult, point: Point2f) -> Result<f64> {
    let normalized = vision
        .undistort_points(&[point], calibration.camera_matrix(), calibration.dist_coeffs())?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Vision("Undistortion returned no points".to_string()))?;

    let ray = nalgebra::Vector3::new(f64::from(normalized.x), f64::from(normalized.y), 1.0);
    let angle = (1.0 / ray.norm()).clamp(-1.0, 1.0).acos().to_degrees();

    Ok(if normalized.x < 0.0 { -angle } else { angle })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{BoundingBox, ImageSize, Point3f};
    use crate::vision::{ImageBuffer, IntrinsicEstimate, PatternDetection, PoseSolution, TrackerUpdate};
    use approx::assert_relative_eq;
    use nalgebra::Matrix3;

    #[derive(Clone)]
    struct Blank;

    impl ImageBuffer for Blank {
        fn size(&self) -> ImageSize {
            ImageSize::new(640, 480)
        }
    }

    /// Capability relying on the default pinhole `undistort_points`
    struct Pinhole;

    impl Vision for Pinhole {
        type Image = Blank;
        type Tracker = ();

        fn detect_pattern(&self, _: &Blank, _: &PatternSpec) -> Result<PatternDetection> {
            Ok(PatternDetection::default())
        }
        fn detect_objects(&self, _: &Blank) -> Result<Vec<BoundingBox>> {
            Ok(Vec::new())
        }
        fn tracker_init(&self, _: &Blank, _: BoundingBox) -> Result<()> {
            Ok(())
        }
        fn tracker_update(&self, _: &mut (), _: &Blank) -> Result<TrackerUpdate> {
            Err(Error::Vision("unused".to_string()))
        }
        fn calibrate_camera(&self, _: &[Vec<Point3f>], _: &[Vec<Point2f>], _: ImageSize) -> Result<IntrinsicEstimate> {
            Err(Error::Vision("unused".to_string()))
        }
        fn solve_pose(
            &self,
            _: &[Point3f],
            _: &[Point2f],
            _: &CameraMatrix,
            _: &DistortionCoefficients,
        ) -> Result<PoseSolution> {
            Err(Error::Vision("unused".to_string()))
        }
        fn undistort(&self, image: &Blank, _: &CameraMatrix, _: &DistortionCoefficients) -> Result<Blank> {
            Ok(image.clone())
        }
        fn resize(&self, image: &Blank, _: f32) -> Result<Blank> {
            Ok(image.clone())
        }
    }

    fn calibration() -> CalibrationResult {
        let k = Matrix3::new(500.0, 0.0, 320.0, 0.0, 500.0, 240.0, 0.0, 0.0, 1.0);
        CalibrationResult::new(k, DistortionCoefficients::zeros(), 0.1, None, None)
    }

    #[test]
    fn test_bearing_angle_on_axis_is_zero() {
        let angle = bearing_angle(&Pinhole, &calibration(), Point2f::new(320.0, 240.0)).unwrap();
        assert_relative_eq!(angle, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_bearing_angle_sign_follows_horizontal_offset() {
        // 500 px right of center at f = 500 is 45 degrees
        let right = bearing_angle(&Pinhole, &calibration(), Point2f::new(820.0, 240.0)).unwrap();
        let left = bearing_angle(&Pinhole, &calibration(), Point2f::new(-180.0, 240.0)).unwrap();

        assert_relative_eq!(right, 45.0, epsilon = 1e-4);
        assert_relative_eq!(left, -45.0, epsilon = 1e-4);
    }

    #[test]
    fn test_bearing_angle_singular_matrix() {
        let singular = CalibrationResult::new(Matrix3::zeros(), DistortionCoefficients::zeros(), 0.0, None, None);
        assert!(bearing_angle(&Pinhole, &singular, Point2f::new(1.0, 1.0)).is_err());
    }
}
