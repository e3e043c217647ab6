//! Persisted calibration files in the `OpenCV` `FileStorage` YAML layout.
//!
//! ```yaml
//! %YAML:1.0
//! ---
//! cameraMatrix: !!opencv-matrix
//!   rows: 3
//!   cols: 3
//!   dt: d
//!   data: [ ... ]
//! ```
//!
//! The reprojection error is not part of the layout and loads as zero.

use super::result::CalibrationResult;
use super::{CameraMatrix, DistortionCoefficients};
use crate::constants::DISTORTION_COEFFICIENTS;
use crate::{Error, Result};
use log::info;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::path::Path;

const HEADER: &str = "%YAML:1.0\n---\n";
const MATRIX_TAG: &str = "!!opencv-matrix";

/// One `!!opencv-matrix` node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct MatrixNode {
    rows: usize,
    cols: usize,
    dt: String,
    data: Vec<f64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CalibrationFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    camera_matrix: Option<MatrixNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dist_coeffs: Option<MatrixNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    rotation_vector: Option<MatrixNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    translation_vector: Option<MatrixNode>,
}

impl MatrixNode {
    fn new(rows: usize, cols: usize, data: Vec<f64>) -> Self {
        Self {
            rows,
            cols,
            dt: "d".to_string(),
            data,
        }
    }

    /// Check the declared shape and element type against the data
    fn validate(&self, name: &str) -> Result<()> {
        if self.dt != "d" && self.dt != "f" {
            return Err(Error::CalibrationFile(format!(
                "{name}: unsupported element type '{}'",
                self.dt
            )));
        }
        if self.rows.checked_mul(self.cols) != Some(self.data.len()) {
            return Err(Error::CalibrationFile(format!(
                "{name}: {}x{} matrix with {} elements",
                self.rows,
                self.cols,
                self.data.len()
            )));
        }
        Ok(())
    }

    fn is_vector(&self) -> bool {
        self.rows == 1 || self.cols == 1
    }
}

/// Convert a node into a 3×3 camera matrix (data is row-major)
fn camera_matrix(node: &MatrixNode) -> Result<CameraMatrix> {
    node.validate("cameraMatrix")?;
    if node.rows != 3 || node.cols != 3 {
        return Err(Error::CalibrationFile(format!(
            "cameraMatrix must be 3x3, found {}x{}",
            node.rows, node.cols
        )));
    }
    Ok(CameraMatrix::from_row_slice(&node.data))
}

/// Convert a node into distortion coefficients, zero padding short vectors
fn dist_coeffs(node: &MatrixNode) -> Result<DistortionCoefficients> {
    node.validate("distCoeffs")?;
    if !node.is_vector() || node.data.len() > DISTORTION_COEFFICIENTS {
        return Err(Error::CalibrationFile(format!(
            "distCoeffs must be a vector of at most {DISTORTION_COEFFICIENTS} values, found {}x{}",
            node.rows, node.cols
        )));
    }
    let mut coeffs = DistortionCoefficients::zeros();
    for (slot, value) in coeffs.iter_mut().zip(&node.data) {
        *slot = *value;
    }
    Ok(coeffs)
}

fn vector3(node: &MatrixNode, name: &str) -> Result<Vector3<f64>> {
    node.validate(name)?;
    if !node.is_vector() || node.data.len() != 3 {
        return Err(Error::CalibrationFile(format!(
            "{name} must be a 3-vector, found {}x{}",
            node.rows, node.cols
        )));
    }
    Ok(Vector3::from_column_slice(&node.data))
}

/// Render a calibration in the `FileStorage` layout
///
/// Only the fields present on the result are written.
///
/// # Errors
///
/// Returns an error if YAML serialization fails
pub fn to_yaml_string(calibration: &CalibrationResult) -> Result<String> {
    // nalgebra stores column-major; FileStorage data is row-major
    let k = calibration.camera_matrix().transpose();
    let file = CalibrationFile {
        camera_matrix: Some(MatrixNode::new(3, 3, k.as_slice().to_vec())),
        dist_coeffs: Some(MatrixNode::new(
            DISTORTION_COEFFICIENTS,
            1,
            calibration.dist_coeffs().as_slice().to_vec(),
        )),
        rotation_vector: calibration
            .rotation()
            .map(|r| MatrixNode::new(3, 1, r.as_slice().to_vec())),
        translation_vector: calibration
            .translation()
            .map(|t| MatrixNode::new(3, 1, t.as_slice().to_vec())),
    };

    let body = serde_yaml::to_string(&file)?;
    let mut content = String::with_capacity(HEADER.len() + body.len() + 64);
    content.push_str(HEADER);
    for line in body.lines() {
        // Top-level keys introduce a matrix node
        if !line.starts_with(' ') && line.ends_with(':') {
            content.push_str(line);
            content.push(' ');
            content.push_str(MATRIX_TAG);
        } else {
            content.push_str(line);
        }
        content.push('\n');
    }
    Ok(content)
}

/// Parse a calibration in the `FileStorage` layout
///
/// The header and matrix tags are optional. A missing camera matrix or
/// distortion vector stays zero; missing pose vectors stay `None`.
///
/// # Errors
///
/// Returns `Error::CalibrationFile` for malformed content
pub fn from_yaml_str(content: &str) -> Result<CalibrationResult> {
    let body: String = content
        .lines()
        .filter(|line| !line.trim_start().starts_with("%YAML"))
        .map(|line| line.replace(MATRIX_TAG, ""))
        .collect::<Vec<_>>()
        .join("\n");

    let file: CalibrationFile = if body.trim().trim_start_matches("---").trim().is_empty() {
        CalibrationFile::default()
    } else {
        serde_yaml::from_str(&body).map_err(|e| Error::CalibrationFile(format!("Failed to parse calibration: {e}")))?
    };

    let camera_matrix = file
        .camera_matrix
        .as_ref()
        .map(camera_matrix)
        .transpose()?
        .unwrap_or_else(CameraMatrix::zeros);
    let dist_coeffs = file
        .dist_coeffs
        .as_ref()
        .map(dist_coeffs)
        .transpose()?
        .unwrap_or_else(DistortionCoefficients::zeros);
    let rotation = file
        .rotation_vector
        .as_ref()
        .map(|n| vector3(n, "rotationVector"))
        .transpose()?;
    let translation = file
        .translation_vector
        .as_ref()
        .map(|n| vector3(n, "translationVector"))
        .transpose()?;

    Ok(CalibrationResult::new(camera_matrix, dist_coeffs, 0.0, rotation, translation))
}

/// Write a calibration file
///
/// # Errors
///
/// Returns an error if serialization or the write fails
pub fn save<P: AsRef<Path>>(calibration: &CalibrationResult, path: P) -> Result<()> {
    let path = path.as_ref();
    std::fs::write(path, to_yaml_string(calibration)?)?;
    info!("Calibration saved to {}", path.display());
    Ok(())
}

/// Read a calibration file
///
/// # Errors
///
/// Returns an error if the file cannot be read or is malformed
pub fn load<P: AsRef<Path>>(path: P) -> Result<CalibrationResult> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;
    let calibration = from_yaml_str(&content)?;
    info!("Calibration loaded from {}", path.display());
    Ok(calibration)
}
