//! Sample accumulation and parameter estimation.

use super::pattern::{CalibrationSample, PatternSpec};
use super::result::CalibrationResult;
use crate::geometry::{ImageSize, Point2f, Point3f};
use crate::utils::safe_cast::percent;
use crate::vision::{PatternDetection, Vision};
use crate::{Error, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What happens to new samples once the window holds N of them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowMode {
    /// Accumulate until N, then ignore further samples (one-shot estimation)
    #[default]
    GrowThenStop,
    /// Keep only the most recent N samples
    Sliding,
}

/// Effect of offering one detection to the accumulator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// The detector did not recognise the pattern
    NotFound,
    /// The corner count did not match the pattern; not counted
    Rejected {
        /// Corners actually detected
        corners: usize,
    },
    /// Sample stored; window not yet full
    Accepted {
        /// Samples now in the window
        count: usize,
    },
    /// Sample stored and the window reached its target on this sample
    Completed {
        /// Samples now in the window
        count: usize,
    },
    /// Window already full in grow-then-stop mode; sample discarded
    Ignored,
}

impl SampleOutcome {
    /// True if the sample was stored in the window
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. } | Self::Completed { .. })
    }
}

/// Bounded, ordered sequence of accepted samples
#[derive(Debug, Clone)]
pub struct SampleWindow {
    capacity: usize,
    mode: WindowMode,
    samples: VecDeque<CalibrationSample>,
    completed: bool,
}

impl SampleWindow {
    /// Create an empty window holding at most `capacity` samples
    #[must_use]
    pub fn new(capacity: usize, mode: WindowMode) -> Self {
        Self {
            capacity,
            mode,
            samples: VecDeque::with_capacity(capacity),
            completed: false,
        }
    }

    /// Add a sample according to the window mode
    pub fn push(&mut self, sample: CalibrationSample) -> SampleOutcome {
        if self.is_full() {
            match self.mode {
                WindowMode::GrowThenStop => return SampleOutcome::Ignored,
                WindowMode::Sliding => {
                    self.samples.pop_front();
                }
            }
        }
        self.samples.push_back(sample);

        let count = self.samples.len();
        if count == self.capacity && !self.completed {
            self.completed = true;
            SampleOutcome::Completed { count }
        } else {
            SampleOutcome::Accepted { count }
        }
    }

    /// Drop every sample
    pub fn clear(&mut self) {
        self.samples.clear();
        self.completed = false;
    }

    /// Samples currently held
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// True if no samples are held
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True once the window holds its target count
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.samples.len() >= self.capacity
    }

    /// Target sample count
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Window mode
    #[must_use]
    pub const fn mode(&self) -> WindowMode {
        self.mode
    }

    /// Oldest sample still held
    #[must_use]
    pub fn first(&self) -> Option<&CalibrationSample> {
        self.samples.front()
    }

    /// Samples in acceptance order
    pub fn iter(&self) -> impl Iterator<Item = &CalibrationSample> {
        self.samples.iter()
    }
}

/// Collects pattern samples and runs intrinsic/extrinsic estimation
#[derive(Debug, Clone)]
pub struct CalibrationAccumulator {
    pattern: PatternSpec,
    window: SampleWindow,
    last_quality: Option<u8>,
}

impl CalibrationAccumulator {
    /// Create an accumulator for `pattern` targeting `target` samples
    #[must_use]
    pub fn new(pattern: PatternSpec, target: usize, mode: WindowMode) -> Self {
        Self {
            pattern,
            window: SampleWindow::new(target, mode),
            last_quality: None,
        }
    }

    /// Pattern this accumulator expects
    #[must_use]
    pub const fn pattern(&self) -> &PatternSpec {
        &self.pattern
    }

    /// Accumulated samples
    #[must_use]
    pub const fn window(&self) -> &SampleWindow {
        &self.window
    }

    /// Percentage of expected corners found by the most recent detection
    #[must_use]
    pub const fn pattern_quality(&self) -> Option<u8> {
        self.last_quality
    }

    /// Forget every sample and the last quality score
    pub fn reset(&mut self) {
        self.window.clear();
        self.last_quality = None;
    }

    /// Offer one detection result
    ///
    /// Every attempt updates the quality score; only found detections with
    /// the full corner count reach the window.
    pub fn offer(&mut self, detection: PatternDetection, image_size: ImageSize) -> SampleOutcome {
        let corners = detection.corners.len();
        self.last_quality = Some(percent(corners, self.pattern.cell_count()));

        if !detection.found {
            return SampleOutcome::NotFound;
        }

        match CalibrationSample::new(detection.corners, image_size, &self.pattern) {
            Some(sample) => self.window.push(sample),
            None => {
                debug!(
                    "Rejecting sample with {corners} corners, expected {}",
                    self.pattern.cell_count()
                );
                SampleOutcome::Rejected { corners }
            }
        }
    }

    /// Snapshot the point sets for intrinsic estimation
    ///
    /// # Errors
    ///
    /// `Error::NotEnoughSamples` until the window holds its target count
    pub fn intrinsic_problem(&self) -> Result<IntrinsicProblem> {
        if !self.window.is_full() {
            return Err(Error::NotEnoughSamples {
                have: self.window.len(),
                need: self.window.capacity(),
            });
        }
        let image_size = self
            .window
            .first()
            .map(CalibrationSample::image_size)
            .ok_or(Error::NotEnoughSamples {
                have: 0,
                need: self.window.capacity(),
            })?;

        let grid = self.pattern.object_points();
        let image_points: Vec<_> = self.window.iter().map(|s| s.corners().to_vec()).collect();
        let object_points = vec![grid; image_points.len()];

        Ok(IntrinsicProblem {
            object_points,
            image_points,
            image_size,
        })
    }

    /// Snapshot the oldest sample against the pattern placed at `origin`
    ///
    /// # Errors
    ///
    /// `Error::NotEnoughSamples` if the window is empty
    pub fn extrinsic_problem(&self, origin: Point3f) -> Result<ExtrinsicProblem> {
        let sample = self.window.first().ok_or(Error::NotEnoughSamples {
            have: 0,
            need: 1,
        })?;

        Ok(ExtrinsicProblem {
            world_points: self.pattern.world_points(origin),
            image_points: sample.corners().to_vec(),
        })
    }

    /// Estimate intrinsics from the full window
    ///
    /// # Errors
    ///
    /// `Error::NotEnoughSamples` until the window holds its target count;
    /// otherwise whatever the calibration capability reports.
    pub fn estimate_intrinsic<V: Vision>(&self, vision: &V) -> Result<CalibrationResult> {
        self.intrinsic_problem()?.solve(vision)
    }

    /// Estimate the camera pose from the oldest sample and a known pattern origin
    ///
    /// Returns `Ok(None)` when the pose solver finds no solution.
    ///
    /// # Errors
    ///
    /// `Error::NotEnoughSamples` if the window is empty; otherwise whatever the
    /// pose capability reports.
    pub fn estimate_extrinsic<V: Vision>(
        &self,
        vision: &V,
        intrinsics: &CalibrationResult,
        origin: Point3f,
    ) -> Result<Option<CalibrationResult>> {
        self.extrinsic_problem(origin)?.solve(vision, intrinsics)
    }
}

/// Point sets for one intrinsic solve, detached from the window
#[derive(Debug, Clone)]
pub struct IntrinsicProblem {
    object_points: Vec<Vec<Point3f>>,
    image_points: Vec<Vec<Point2f>>,
    image_size: ImageSize,
}

impl IntrinsicProblem {
    /// Number of samples in the problem
    #[must_use]
    pub fn len(&self) -> usize {
        self.image_points.len()
    }

    /// True if there are no samples
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.image_points.is_empty()
    }

    /// Run the calibration solver
    ///
    /// # Errors
    ///
    /// Whatever the calibration capability reports, or `Error::Calibration`
    /// for a non-finite reprojection error
    pub fn solve<V: Vision>(&self, vision: &V) -> Result<CalibrationResult> {
        info!(
            "Estimating intrinsics from {} samples at {}x{}",
            self.image_points.len(),
            self.image_size.width,
            self.image_size.height
        );
        let estimate = vision.calibrate_camera(&self.object_points, &self.image_points, self.image_size)?;

        if !estimate.reprojection_error.is_finite() {
            return Err(Error::Calibration(format!(
                "Solver returned non-finite reprojection error {}",
                estimate.reprojection_error
            )));
        }
        info!("Intrinsic calibration error: {:.4}", estimate.reprojection_error);

        Ok(CalibrationResult::from_intrinsics(estimate))
    }
}

/// World and image points for one pose solve
#[derive(Debug, Clone)]
pub struct ExtrinsicProblem {
    world_points: Vec<Point3f>,
    image_points: Vec<Point2f>,
}

impl ExtrinsicProblem {
    /// Solve the pose against `intrinsics`
    ///
    /// Returns `Ok(None)` when the pose solver finds no solution.
    ///
    /// # Errors
    ///
    /// Whatever the pose capability reports
    pub fn solve<V: Vision>(&self, vision: &V, intrinsics: &CalibrationResult) -> Result<Option<CalibrationResult>> {
        let pose = vision.solve_pose(
            &self.world_points,
            &self.image_points,
            intrinsics.camera_matrix(),
            intrinsics.dist_coeffs(),
        )?;

        if pose.success {
            info!(
                "Extrinsic calibration: rotation {:?}, translation {:?}",
                pose.rotation.as_slice(),
                pose.translation.as_slice()
            );
            Ok(Some(intrinsics.with_pose(&pose)))
        } else {
            warn!("Pose solver found no solution");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2f;

    fn detection(corners: usize, found: bool) -> PatternDetection {
        PatternDetection {
            corners: vec![Point2f::new(10.0, 10.0); corners],
            found,
        }
    }

    fn size() -> ImageSize {
        ImageSize::new(640, 480)
    }

    #[test]
    fn test_grow_then_stop_caps_at_target() {
        let mut acc = CalibrationAccumulator::new(PatternSpec::default(), 3, WindowMode::GrowThenStop);

        assert_eq!(acc.offer(detection(54, true), size()), SampleOutcome::Accepted { count: 1 });
        assert_eq!(acc.offer(detection(54, true), size()), SampleOutcome::Accepted { count: 2 });
        assert_eq!(acc.offer(detection(54, true), size()), SampleOutcome::Completed { count: 3 });
        assert_eq!(acc.offer(detection(54, true), size()), SampleOutcome::Ignored);
        assert_eq!(acc.window().len(), 3);
    }

    #[test]
    fn test_sliding_window_keeps_latest() {
        let mut acc = CalibrationAccumulator::new(PatternSpec::default(), 3, WindowMode::Sliding);

        for _ in 0..3 {
            acc.offer(detection(54, true), size());
        }
        let first_before = acc.window().first().unwrap().captured_at();

        // Later samples are accepted but never re-complete the window
        assert_eq!(acc.offer(detection(54, true), size()), SampleOutcome::Accepted { count: 3 });
        assert_eq!(acc.offer(detection(54, true), size()), SampleOutcome::Accepted { count: 3 });
        assert_eq!(acc.window().len(), 3);
        assert!(acc.window().first().unwrap().captured_at() >= first_before);
    }

    #[test]
    fn test_wrong_corner_count_never_counts() {
        let mut acc = CalibrationAccumulator::new(PatternSpec::default(), 2, WindowMode::GrowThenStop);

        assert_eq!(acc.offer(detection(53, true), size()), SampleOutcome::Rejected { corners: 53 });
        assert_eq!(acc.offer(detection(0, true), size()), SampleOutcome::Rejected { corners: 0 });
        assert_eq!(acc.offer(detection(54, false), size()), SampleOutcome::NotFound);
        assert!(acc.window().is_empty());
    }

    #[test]
    fn test_pattern_quality_tracks_last_attempt() {
        let mut acc = CalibrationAccumulator::new(PatternSpec::default(), 2, WindowMode::GrowThenStop);
        assert_eq!(acc.pattern_quality(), None);

        acc.offer(detection(27, false), size());
        assert_eq!(acc.pattern_quality(), Some(50));

        acc.offer(detection(54, true), size());
        assert_eq!(acc.pattern_quality(), Some(100));

        acc.reset();
        assert_eq!(acc.pattern_quality(), None);
        assert!(acc.window().is_empty());
    }

    #[test]
    fn test_reset_allows_completion_again() {
        let mut acc = CalibrationAccumulator::new(PatternSpec::default(), 1, WindowMode::GrowThenStop);
        assert_eq!(acc.offer(detection(54, true), size()), SampleOutcome::Completed { count: 1 });
        acc.reset();
        assert_eq!(acc.offer(detection(54, true), size()), SampleOutcome::Completed { count: 1 });
    }
}
