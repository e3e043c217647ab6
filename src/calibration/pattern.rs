//! Calibration pattern geometry and accepted samples.

use crate::constants::{PATTERN_COLUMNS, PATTERN_ROWS, PATTERN_SQUARE_SIZE};
use crate::geometry::{ImageSize, Point2f, Point3f};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// Planar grid of inner corners used as a calibration reference
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternSpec {
    /// Corners along the horizontal axis
    pub columns: u32,
    /// Corners along the vertical axis
    pub rows: u32,
    /// Spacing between neighbouring corners (m)
    pub square_size: f32,
}

impl Default for PatternSpec {
    fn default() -> Self {
        Self {
            columns: PATTERN_COLUMNS,
            rows: PATTERN_ROWS,
            square_size: PATTERN_SQUARE_SIZE,
        }
    }
}

impl PatternSpec {
    /// Number of corners a complete detection contains
    #[must_use]
    pub const fn cell_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Reference layout in the pattern's own plane: `(x·s, y·s, 0)`, row by row
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn object_points(&self) -> Vec<Point3f> {
        let s = self.square_size;
        (0..self.rows)
            .flat_map(|y| (0..self.columns).map(move |x| Point3f::new(x as f32 * s, y as f32 * s, 0.0)))
            .collect()
    }

    /// Pattern corners in world coordinates for a pattern standing upright
    /// with its first corner at `origin`: `(ox + x·s, oy, oz + z·s)`
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn world_points(&self, origin: Point3f) -> Vec<Point3f> {
        let s = self.square_size;
        (0..self.rows)
            .flat_map(|z| {
                (0..self.columns).map(move |x| Point3f::new(origin.x + x as f32 * s, origin.y, origin.z + z as f32 * s))
            })
            .collect()
    }
}

/// One frame's worth of pattern corners with the complete expected count
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSample {
    corners: Vec<Point2f>,
    image_size: ImageSize,
    captured_at: SystemTime,
}

impl CalibrationSample {
    /// Build a sample, or `None` if the corner count does not match the pattern
    #[must_use]
    pub fn new(corners: Vec<Point2f>, image_size: ImageSize, pattern: &PatternSpec) -> Option<Self> {
        (corners.len() == pattern.cell_count()).then(|| Self {
            corners,
            image_size,
            captured_at: SystemTime::now(),
        })
    }

    /// Detected corners in pattern order
    #[must_use]
    pub fn corners(&self) -> &[Point2f] {
        &self.corners
    }

    /// Size of the frame the sample was taken from
    #[must_use]
    pub const fn image_size(&self) -> ImageSize {
        self.image_size
    }

    /// When the sample was accepted
    #[must_use]
    pub const fn captured_at(&self) -> SystemTime {
        self.captured_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_object_points_layout() {
        let pattern = PatternSpec::default();
        let points = pattern.object_points();

        assert_eq!(points.len(), 54);
        assert_eq!(points[0], Point3f::new(0.0, 0.0, 0.0));
        // Second corner advances along the row
        assert_relative_eq!(points[1].x, 0.034);
        assert_relative_eq!(points[1].y, 0.0);
        // First corner of the second row
        assert_relative_eq!(points[9].x, 0.0);
        assert_relative_eq!(points[9].y, 0.034);
        assert!(points.iter().all(|p| p.z == 0.0));
    }

    #[test]
    fn test_world_points_are_vertical() {
        let pattern = PatternSpec::default();
        let origin = Point3f::new(0.424, 0.0, 1.965);
        let points = pattern.world_points(origin);

        assert_eq!(points.len(), 54);
        assert_eq!(points[0], origin);
        assert!(points.iter().all(|p| p.y == 0.0));
        assert_relative_eq!(points[53].x, 0.424 + 8.0 * 0.034, epsilon = 1e-5);
        assert_relative_eq!(points[53].z, 1.965 + 5.0 * 0.034, epsilon = 1e-5);
    }

    #[test]
    fn test_sample_requires_full_corner_count() {
        let pattern = PatternSpec::default();
        let size = ImageSize::new(640, 480);

        let full = vec![Point2f::new(1.0, 1.0); 54];
        assert!(CalibrationSample::new(full, size, &pattern).is_some());

        let short = vec![Point2f::new(1.0, 1.0); 53];
        assert!(CalibrationSample::new(short, size, &pattern).is_none());

        let long = vec![Point2f::new(1.0, 1.0); 55];
        assert!(CalibrationSample::new(long, size, &pattern).is_none());

        assert!(CalibrationSample::new(Vec::new(), size, &pattern).is_none());
    }
}
