//! Pattern search state and the calibration operations driven by the pipeline.

use super::accumulator::{CalibrationAccumulator, SampleOutcome, WindowMode};
use super::pattern::PatternSpec;
use super::result::{CalibrationResult, CurrentCalibration};
use super::storage;
use crate::config::CalibrationConfig;
use crate::frame::Frame;
use crate::geometry::Point3f;
use crate::vision::Vision;
use crate::{Error, Result};
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Result of one pattern sampling cycle
#[derive(Debug)]
pub struct SampleReport {
    /// Frame the pattern search ran on
    pub sequence: u64,
    /// What the accumulator did with the detection
    pub outcome: SampleOutcome,
    /// Percentage of expected corners found
    pub quality: u8,
    /// Samples in the window after this cycle
    pub count: usize,
    /// Time spent in pattern detection
    pub elapsed: Duration,
    /// Automatic intrinsic estimation, run when this sample completed the window
    pub calibration: Option<Result<Arc<CalibrationResult>>>,
}

/// Owns the sample window and installs estimation results as current
pub struct Calibrator<V: Vision> {
    vision: Arc<V>,
    accumulator: Mutex<CalibrationAccumulator>,
    current: Arc<CurrentCalibration>,
    searching: AtomicBool,
    world_origin: Point3f,
    auto_calibrate: bool,
}

impl<V: Vision> Calibrator<V> {
    /// Create a calibrator writing results into `current`
    pub fn new(
        vision: Arc<V>,
        pattern: PatternSpec,
        config: &CalibrationConfig,
        current: Arc<CurrentCalibration>,
    ) -> Self {
        let [x, y, z] = config.world_origin;
        Self {
            vision,
            accumulator: Mutex::new(CalibrationAccumulator::new(
                pattern,
                config.target_samples,
                config.window_mode,
            )),
            current,
            searching: AtomicBool::new(false),
            world_origin: Point3f::new(x, y, z),
            auto_calibrate: config.auto_calibrate,
        }
    }

    /// Clear the sample window and start accepting samples
    pub fn begin_search(&self) {
        self.accumulator.lock().reset();
        self.searching.store(true, Ordering::Release);
        info!("Pattern search started");
    }

    /// Stop accepting samples, keeping the window
    pub fn end_search(&self) {
        if self.searching.swap(false, Ordering::AcqRel) {
            info!("Pattern search stopped");
        }
    }

    /// True while samples are being collected
    pub fn is_searching(&self) -> bool {
        self.searching.load(Ordering::Acquire)
    }

    /// Samples currently in the window
    pub fn sample_count(&self) -> usize {
        self.accumulator.lock().window().len()
    }

    /// Samples required for intrinsic estimation
    pub fn target_samples(&self) -> usize {
        self.accumulator.lock().window().capacity()
    }

    /// True once the window holds its target count
    pub fn patterns_available(&self) -> bool {
        self.accumulator.lock().window().is_full()
    }

    /// Quality score of the most recent detection
    pub fn pattern_quality(&self) -> Option<u8> {
        self.accumulator.lock().pattern_quality()
    }

    /// Shared current-calibration cell
    pub fn current(&self) -> &Arc<CurrentCalibration> {
        &self.current
    }

    /// Run one pattern search on `frame`
    ///
    /// Returns `Ok(None)` when no search is in progress.
    ///
    /// # Errors
    ///
    /// Returns an error if pattern detection fails
    pub fn sample_frame(&self, frame: &Frame<V::Image>) -> Result<Option<SampleReport>> {
        if !self.is_searching() {
            return Ok(None);
        }

        let pattern = *self.accumulator.lock().pattern();
        let started = Instant::now();
        let detection = self.vision.detect_pattern(&frame.image, &pattern)?;
        let elapsed = started.elapsed();

        let (outcome, quality, count, problem) = {
            let mut accumulator = self.accumulator.lock();
            let outcome = accumulator.offer(detection, frame.size());
            let quality = accumulator.pattern_quality().unwrap_or(0);
            let count = accumulator.window().len();
            let mut problem = None;
            if let SampleOutcome::Completed { count } = outcome {
                info!("Collected {count} calibration samples");
                if accumulator.window().mode() == WindowMode::GrowThenStop {
                    self.searching.store(false, Ordering::Release);
                }
                if self.auto_calibrate {
                    problem = Some(accumulator.intrinsic_problem());
                }
            }
            (outcome, quality, count, problem)
        };
        debug!(
            "Frame {}: {outcome:?}, quality {quality}% in {:.1} ms",
            frame.sequence,
            elapsed.as_secs_f64() * 1000.0
        );

        // Solve outside the window lock
        let calibration = problem.map(|problem| {
            let result = problem
                .and_then(|problem| problem.solve(self.vision.as_ref()))
                .map(|result| self.current.store(result));
            if let Err(e) = &result {
                warn!("Automatic intrinsic calibration failed: {e}");
            }
            result
        });

        Ok(Some(SampleReport {
            sequence: frame.sequence,
            outcome,
            quality,
            count,
            elapsed,
            calibration,
        }))
    }

    /// Estimate intrinsics from the window and install the result
    ///
    /// # Errors
    ///
    /// `Error::NotEnoughSamples` before the window is full, or the solver's error
    pub fn calibrate_intrinsic(&self) -> Result<Arc<CalibrationResult>> {
        let problem = self.accumulator.lock().intrinsic_problem()?;
        let result = problem.solve(self.vision.as_ref())?;
        Ok(self.current.store(result))
    }

    /// Estimate the camera pose against the current intrinsics
    ///
    /// On solver failure returns `Ok(None)` and leaves the current calibration
    /// untouched.
    ///
    /// # Errors
    ///
    /// `Error::NoCalibration` without current intrinsics, `Error::NotEnoughSamples`
    /// with an empty window, or the solver's error
    pub fn calibrate_extrinsic(&self) -> Result<Option<Arc<CalibrationResult>>> {
        let intrinsics = self.current.load().ok_or(Error::NoCalibration)?;
        let problem = self.accumulator.lock().extrinsic_problem(self.world_origin)?;
        let solved = problem.solve(self.vision.as_ref(), &intrinsics)?;
        Ok(solved.map(|result| self.current.store(result)))
    }

    /// Write the current calibration to `path`
    ///
    /// # Errors
    ///
    /// `Error::NoCalibration` if nothing is current, or the I/O error
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let current = self.current.load().ok_or(Error::NoCalibration)?;
        storage::save(&current, path)
    }

    /// Load a calibration file and install it as current
    ///
    /// Nothing is installed when loading fails.
    ///
    /// # Errors
    ///
    /// Returns the I/O or format error
    pub fn open<P: AsRef<Path>>(&self, path: P) -> Result<Arc<CalibrationResult>> {
        let loaded = storage::load(path)?;
        Ok(self.current.store(loaded))
    }
}
