//! Helper types and functions for tests
//!
//! `FakeVision` and `FakeBackend` are scriptable stand-ins for the vision
//! algorithms and the capture device.

#![allow(dead_code)]

use camera_pipeline::calibration::{CameraMatrix, DistortionCoefficients, PatternSpec};
use camera_pipeline::capture::{CaptureBackend, CaptureDevice, VideoSource};
use camera_pipeline::frame::Frame;
use camera_pipeline::geometry::{BoundingBox, ImageSize, Point2f, Point3f};
use camera_pipeline::vision::{ImageBuffer, IntrinsicEstimate, PatternDetection, PoseSolution, TrackerUpdate, Vision};
use camera_pipeline::{Error, Result};
use nalgebra::{Matrix3, Vector3};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Image stand-in carrying only its size and the grab that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeImage {
    pub width: i32,
    pub height: i32,
    pub serial: u64,
}

impl FakeImage {
    pub fn new(width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            serial: 0,
        }
    }
}

impl ImageBuffer for FakeImage {
    fn size(&self) -> ImageSize {
        ImageSize::new(self.width, self.height)
    }
}

/// Build a 640×480 frame
pub fn frame(sequence: u64) -> Frame<FakeImage> {
    Frame::new(sequence, FakeImage::new(640, 480), None)
}

/// Tracker state handed out by `FakeVision`
#[derive(Debug)]
pub struct FakeTracker {
    pub origin: BoundingBox,
    pub bbox: BoundingBox,
}

/// Camera matrix returned by the fake calibration solver
pub fn fake_camera_matrix() -> CameraMatrix {
    Matrix3::new(800.0, 0.0, 320.0, 0.0, 800.0, 240.0, 0.0, 0.0, 1.0)
}

/// Scriptable vision capabilities
pub struct FakeVision {
    detections: Mutex<Vec<BoundingBox>>,
    detect_fails: AtomicBool,
    init_failures: Mutex<Vec<BoundingBox>>,
    lost_objects: Mutex<Vec<BoundingBox>>,
    motion: Mutex<(i32, i32)>,
    pattern_corners: AtomicUsize,
    pattern_found: AtomicBool,
    pose_success: AtomicBool,
    calibration_error: Mutex<f64>,
    calibration_delay: Mutex<Duration>,
    pub initialized: AtomicUsize,
    pub released: AtomicUsize,
    pub calibrate_calls: AtomicUsize,
    pub pattern_calls: AtomicUsize,
    pub undistort_calls: AtomicUsize,
}

impl Default for FakeVision {
    fn default() -> Self {
        Self {
            detections: Mutex::new(Vec::new()),
            detect_fails: AtomicBool::new(false),
            init_failures: Mutex::new(Vec::new()),
            lost_objects: Mutex::new(Vec::new()),
            motion: Mutex::new((0, 0)),
            pattern_corners: AtomicUsize::new(54),
            pattern_found: AtomicBool::new(true),
            pose_success: AtomicBool::new(true),
            calibration_error: Mutex::new(0.25),
            calibration_delay: Mutex::new(Duration::ZERO),
            initialized: AtomicUsize::new(0),
            released: AtomicUsize::new(0),
            calibrate_calls: AtomicUsize::new(0),
            pattern_calls: AtomicUsize::new(0),
            undistort_calls: AtomicUsize::new(0),
        }
    }
}

impl FakeVision {
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxes returned by every detection call
    pub fn set_detections(&self, boxes: Vec<BoundingBox>) {
        *self.detections.lock() = boxes;
    }

    /// Make detection calls return an error
    pub fn set_detect_fails(&self, fails: bool) {
        self.detect_fails.store(fails, Ordering::SeqCst);
    }

    /// Tracker init fails for a detection at `bbox`
    pub fn fail_init_at(&self, bbox: BoundingBox) {
        self.init_failures.lock().push(bbox);
    }

    /// Trackers started at `bbox` report a lost object from now on
    pub fn lose_object_at(&self, bbox: BoundingBox) {
        self.lost_objects.lock().push(bbox);
    }

    /// Every tracker update shifts its box by `(dx, dy)`
    pub fn set_motion(&self, dx: i32, dy: i32) {
        *self.motion.lock() = (dx, dy);
    }

    /// Corner count and found flag reported by pattern detection
    pub fn set_pattern(&self, corners: usize, found: bool) {
        self.pattern_corners.store(corners, Ordering::SeqCst);
        self.pattern_found.store(found, Ordering::SeqCst);
    }

    pub fn set_pose_success(&self, success: bool) {
        self.pose_success.store(success, Ordering::SeqCst);
    }

    pub fn set_calibration_error(&self, error: f64) {
        *self.calibration_error.lock() = error;
    }

    /// Make the calibration solver take `delay`
    pub fn set_calibration_delay(&self, delay: Duration) {
        *self.calibration_delay.lock() = delay;
    }
}

impl Vision for FakeVision {
    type Image = FakeImage;
    type Tracker = FakeTracker;

    fn detect_pattern(&self, image: &FakeImage, _pattern: &PatternSpec) -> Result<PatternDetection> {
        self.pattern_calls.fetch_add(1, Ordering::SeqCst);
        let count = self.pattern_corners.load(Ordering::SeqCst);
        #[allow(clippy::cast_precision_loss)]
        let corners = (0..count)
            .map(|i| Point2f::new(100.0 + (i % 9) as f32 * 20.0, 100.0 + (i / 9) as f32 * 20.0 + image.serial as f32 * 0.01))
            .collect();
        Ok(PatternDetection {
            corners,
            found: self.pattern_found.load(Ordering::SeqCst),
        })
    }

    fn detect_objects(&self, _image: &FakeImage) -> Result<Vec<BoundingBox>> {
        if self.detect_fails.load(Ordering::SeqCst) {
            return Err(Error::Vision("detector unavailable".to_string()));
        }
        Ok(self.detections.lock().clone())
    }

    fn tracker_init(&self, _image: &FakeImage, bbox: BoundingBox) -> Result<FakeTracker> {
        if self.init_failures.lock().contains(&bbox) {
            return Err(Error::Vision(format!("cannot track {bbox:?}")));
        }
        self.initialized.fetch_add(1, Ordering::SeqCst);
        Ok(FakeTracker { origin: bbox, bbox })
    }

    fn tracker_update(&self, tracker: &mut FakeTracker, _image: &FakeImage) -> Result<TrackerUpdate> {
        let (dx, dy) = *self.motion.lock();
        tracker.bbox = BoundingBox::new(tracker.bbox.x + dx, tracker.bbox.y + dy, tracker.bbox.width, tracker.bbox.height);
        let success = !self.lost_objects.lock().contains(&tracker.origin);
        Ok(TrackerUpdate {
            bbox: tracker.bbox,
            success,
        })
    }

    fn tracker_release(&self, _tracker: FakeTracker) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn calibrate_camera(
        &self,
        object_points: &[Vec<Point3f>],
        image_points: &[Vec<Point2f>],
        image_size: ImageSize,
    ) -> Result<IntrinsicEstimate> {
        self.calibrate_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.calibration_delay.lock();
        thread::sleep(delay);
        if object_points.len() != image_points.len() || image_size.is_empty() {
            return Err(Error::Calibration("mismatched point sets".to_string()));
        }
        let mut dist_coeffs = DistortionCoefficients::zeros();
        dist_coeffs[0] = -0.12;
        dist_coeffs[1] = 0.05;
        Ok(IntrinsicEstimate {
            camera_matrix: fake_camera_matrix(),
            dist_coeffs,
            reprojection_error: *self.calibration_error.lock(),
        })
    }

    fn solve_pose(
        &self,
        object_points: &[Point3f],
        image_points: &[Point2f],
        _camera_matrix: &CameraMatrix,
        _dist_coeffs: &DistortionCoefficients,
    ) -> Result<PoseSolution> {
        if object_points.len() != image_points.len() {
            return Err(Error::Calibration("mismatched point sets".to_string()));
        }
        let success = self.pose_success.load(Ordering::SeqCst);
        Ok(PoseSolution {
            rotation: Vector3::new(0.1, -0.2, 0.05),
            translation: Vector3::new(-0.4, 1.2, 2.5),
            success,
        })
    }

    fn undistort(
        &self,
        image: &FakeImage,
        _camera_matrix: &CameraMatrix,
        _dist_coeffs: &DistortionCoefficients,
    ) -> Result<FakeImage> {
        self.undistort_calls.fetch_add(1, Ordering::SeqCst);
        Ok(image.clone())
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn resize(&self, image: &FakeImage, scale: f32) -> Result<FakeImage> {
        Ok(FakeImage {
            width: (image.width as f32 * scale) as i32,
            height: (image.height as f32 * scale) as i32,
            serial: image.serial,
        })
    }
}

/// One scripted grab result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grab {
    Image,
    Nothing,
    Empty,
    Fail,
}

/// Shared observation points of a fake device
#[derive(Debug, Default)]
pub struct DeviceActivity {
    pub opened: AtomicUsize,
    pub grabs: AtomicU64,
    pub stopped_at: Mutex<Option<Instant>>,
    pub released_at: Mutex<Option<Instant>>,
}

impl DeviceActivity {
    pub fn is_released(&self) -> bool {
        self.released_at.lock().is_some()
    }
}

/// Scriptable capture backend
pub struct FakeBackend {
    script: Arc<Mutex<VecDeque<Grab>>>,
    frame_delay: Duration,
    frozen_position: bool,
    open_fails: bool,
    pub activity: Arc<DeviceActivity>,
}

impl FakeBackend {
    /// Backend delivering an image every `frame_delay`
    pub fn new(frame_delay: Duration) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            frame_delay,
            frozen_position: false,
            open_fails: false,
            activity: Arc::new(DeviceActivity::default()),
        }
    }

    /// Grab results to play before falling back to good images
    pub fn with_script(self, script: impl IntoIterator<Item = Grab>) -> Self {
        self.script.lock().extend(script);
        self
    }

    /// Device reports the same position for every frame
    pub fn with_frozen_position(mut self) -> Self {
        self.frozen_position = true;
        self
    }

    pub fn failing() -> Self {
        Self {
            open_fails: true,
            ..Self::new(Duration::from_millis(1))
        }
    }
}

impl CaptureBackend<FakeImage> for FakeBackend {
    fn open(&self, source: &VideoSource) -> Result<Box<dyn CaptureDevice<FakeImage>>> {
        if self.open_fails {
            return Err(Error::Capture(format!("Failed to open {source}")));
        }
        self.activity.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeDevice {
            script: Arc::clone(&self.script),
            frame_delay: self.frame_delay,
            frozen_position: self.frozen_position,
            serial: 0,
            activity: Arc::clone(&self.activity),
        }))
    }
}

struct FakeDevice {
    script: Arc<Mutex<VecDeque<Grab>>>,
    frame_delay: Duration,
    frozen_position: bool,
    serial: u64,
    activity: Arc<DeviceActivity>,
}

impl CaptureDevice<FakeImage> for FakeDevice {
    fn grab(&mut self) -> Result<Option<FakeImage>> {
        thread::sleep(self.frame_delay);
        self.activity.grabs.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().pop_front().unwrap_or(Grab::Image);
        match next {
            Grab::Image => {
                self.serial += 1;
                Ok(Some(FakeImage {
                    width: 640,
                    height: 480,
                    serial: self.serial,
                }))
            }
            Grab::Nothing => Ok(None),
            Grab::Empty => Ok(Some(FakeImage::new(0, 0))),
            Grab::Fail => Err(Error::Capture("device hiccup".to_string())),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn position(&self) -> Option<f64> {
        if self.frozen_position {
            Some(1000.0)
        } else {
            Some(self.serial as f64 * 33.0)
        }
    }

    fn stop(&mut self) {
        *self.activity.stopped_at.lock() = Some(Instant::now());
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        *self.activity.released_at.lock() = Some(Instant::now());
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
