//! Calibration results and the single-slot "current calibration" cell.

use super::{CameraMatrix, DistortionCoefficients};
use crate::vision::{IntrinsicEstimate, PoseSolution};
use nalgebra::Vector3;
use parking_lot::RwLock;
use std::sync::Arc;

/// Camera intrinsics, optionally with a pose
///
/// Immutable once built; a new estimation always produces a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    camera_matrix: CameraMatrix,
    dist_coeffs: DistortionCoefficients,
    reprojection_error: f64,
    rotation: Option<Vector3<f64>>,
    translation: Option<Vector3<f64>>,
}

impl CalibrationResult {
    /// Build a result from raw parts
    #[must_use]
    pub const fn new(
        camera_matrix: CameraMatrix,
        dist_coeffs: DistortionCoefficients,
        reprojection_error: f64,
        rotation: Option<Vector3<f64>>,
        translation: Option<Vector3<f64>>,
    ) -> Self {
        Self {
            camera_matrix,
            dist_coeffs,
            reprojection_error,
            rotation,
            translation,
        }
    }

    /// Intrinsic-only result from the calibration solver
    #[must_use]
    pub fn from_intrinsics(estimate: IntrinsicEstimate) -> Self {
        Self::new(
            estimate.camera_matrix,
            estimate.dist_coeffs,
            estimate.reprojection_error,
            None,
            None,
        )
    }

    /// New result combining these intrinsics with a solved pose
    #[must_use]
    pub fn with_pose(&self, pose: &PoseSolution) -> Self {
        Self::new(
            self.camera_matrix,
            self.dist_coeffs,
            self.reprojection_error,
            Some(pose.rotation),
            Some(pose.translation),
        )
    }

    /// 3×3 camera matrix
    #[must_use]
    pub const fn camera_matrix(&self) -> &CameraMatrix {
        &self.camera_matrix
    }

    /// Distortion coefficients
    #[must_use]
    pub const fn dist_coeffs(&self) -> &DistortionCoefficients {
        &self.dist_coeffs
    }

    /// RMS reprojection error of the intrinsic estimation
    #[must_use]
    pub const fn reprojection_error(&self) -> f64 {
        self.reprojection_error
    }

    /// Rotation vector, present after extrinsic estimation
    #[must_use]
    pub const fn rotation(&self) -> Option<&Vector3<f64>> {
        self.rotation.as_ref()
    }

    /// Translation vector, present after extrinsic estimation
    #[must_use]
    pub const fn translation(&self) -> Option<&Vector3<f64>> {
        self.translation.as_ref()
    }

    /// True if both pose vectors are present
    #[must_use]
    pub const fn has_extrinsics(&self) -> bool {
        self.rotation.is_some() && self.translation.is_some()
    }

    /// Inverse of the camera matrix, `None` if it is singular
    #[must_use]
    pub fn inverse_camera_matrix(&self) -> Option<CameraMatrix> {
        self.camera_matrix.try_inverse()
    }
}

/// Last-writer-wins cell holding the calibration consumers should use
///
/// Readers get a cloned `Arc` of a complete result; the lock is only held for
/// the clone or the swap.
#[derive(Debug, Default)]
pub struct CurrentCalibration {
    slot: RwLock<Option<Arc<CalibrationResult>>>,
}

impl CurrentCalibration {
    /// Create an empty cell
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The current calibration, if any
    pub fn load(&self) -> Option<Arc<CalibrationResult>> {
        self.slot.read().clone()
    }

    /// Install a new calibration, returning the shared handle
    pub fn store(&self, result: CalibrationResult) -> Arc<CalibrationResult> {
        let result = Arc::new(result);
        *self.slot.write() = Some(Arc::clone(&result));
        result
    }

    /// True once any calibration has been installed
    pub fn is_available(&self) -> bool {
        self.slot.read().is_some()
    }
}
