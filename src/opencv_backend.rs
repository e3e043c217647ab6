//! `OpenCV` implementation of the vision and capture capabilities.
//!
//! - Pattern detection: `find_chessboard_corners` refined with `corner_sub_pix`
//! - Object detection: Haar cascade classifier
//! - Tracking: KCF
//! - Intrinsics: `calibrate_camera` with the rational distortion model
//! - Extrinsics: iterative `solve_pnp`

use crate::calibration::{CameraMatrix, DistortionCoefficients, PatternSpec};
use crate::capture::{CaptureBackend, CaptureDevice, VideoSource};
use crate::config::DetectorConfig;
use crate::constants::DISTORTION_COEFFICIENTS;
use crate::geometry::{BoundingBox, ImageSize, Point2f, Point3f};
use crate::utils::safe_cast::{f32_to_i32_clamp, u32_to_i32, usize_to_i32};
use crate::vision::{ImageBuffer, IntrinsicEstimate, PatternDetection, PoseSolution, TrackerUpdate, Vision};
use crate::{Error, Result};
use log::{debug, info};
use nalgebra::Vector3;
use opencv::{
    calib3d,
    core::{self, Mat, Ptr, Rect, Size, TermCriteria, Vector, CV_64F},
    imgproc, objdetect,
    prelude::*,
    tracking::{TrackerKCF, TrackerKCF_Params},
    videoio::{self, VideoCapture},
};
use parking_lot::Mutex;

/// Owned `OpenCV` image
#[derive(Debug, Clone)]
pub struct CvImage(pub Mat);

// SAFETY: the opencv bindings mark `Mat` as `Send` only, since it wraps a raw
// `cv::Mat` pointer. OpenCV allows concurrent reads of one `cv::Mat`: the pixel
// buffer is only read, and its reference count is updated atomically. A
// `CvImage` is never mutated after it is wrapped, and shared references reach
// OpenCV only through input-array parameters.
unsafe impl Sync for CvImage {}

impl ImageBuffer for CvImage {
    fn size(&self) -> ImageSize {
        ImageSize::new(self.0.cols(), self.0.rows())
    }

    fn is_empty(&self) -> bool {
        self.0.empty()
    }
}

impl From<Mat> for CvImage {
    fn from(mat: Mat) -> Self {
        Self(mat)
    }
}

fn to_rect(bbox: BoundingBox) -> Rect {
    Rect::new(bbox.x, bbox.y, bbox.width, bbox.height)
}

const fn from_rect(rect: Rect) -> BoundingBox {
    BoundingBox::new(rect.x, rect.y, rect.width, rect.height)
}

fn camera_matrix_to_mat(k: &CameraMatrix) -> Result<Mat> {
    let mut mat = Mat::zeros(3, 3, CV_64F)?.to_mat()?;
    for row in 0..3 {
        for col in 0..3 {
            *mat.at_2d_mut::<f64>(usize_to_i32(row)?, usize_to_i32(col)?)? = k[(row, col)];
        }
    }
    Ok(mat)
}

fn camera_matrix_from_mat(mat: &Mat) -> Result<CameraMatrix> {
    let mut k = CameraMatrix::zeros();
    for row in 0..3 {
        for col in 0..3 {
            k[(row, col)] = *mat.at_2d::<f64>(usize_to_i32(row)?, usize_to_i32(col)?)?;
        }
    }
    Ok(k)
}

fn dist_coeffs_to_mat(d: &DistortionCoefficients) -> Result<Mat> {
    let mut mat = Mat::zeros(usize_to_i32(DISTORTION_COEFFICIENTS)?, 1, CV_64F)?.to_mat()?;
    for (i, value) in d.iter().enumerate() {
        *mat.at_mut::<f64>(usize_to_i32(i)?)? = *value;
    }
    Ok(mat)
}

fn dist_coeffs_from_mat(mat: &Mat) -> Result<DistortionCoefficients> {
    let mut d = DistortionCoefficients::zeros();
    let available = usize::try_from(mat.total()).unwrap_or(0).min(DISTORTION_COEFFICIENTS);
    for i in 0..available {
        d[i] = *mat.at::<f64>(usize_to_i32(i)?)?;
    }
    Ok(d)
}

fn vector3_from_mat(mat: &Mat) -> Result<Vector3<f64>> {
    if mat.total() < 3 {
        return Err(Error::Vision(format!("Expected a 3-vector, got {} elements", mat.total())));
    }
    Ok(Vector3::new(*mat.at::<f64>(0)?, *mat.at::<f64>(1)?, *mat.at::<f64>(2)?))
}

fn image_points(points: &[Point2f]) -> Vector<core::Point2f> {
    points.iter().map(|p| core::Point2f::new(p.x, p.y)).collect()
}

fn object_points(points: &[Point3f]) -> Vector<core::Point3f> {
    points.iter().map(|p| core::Point3f::new(p.x, p.y, p.z)).collect()
}

fn to_gray(image: &Mat) -> Result<Mat> {
    if image.channels() == 1 {
        return Ok(image.try_clone()?);
    }
    let mut gray = Mat::default();
    imgproc::cvt_color(image, &mut gray, imgproc::COLOR_BGR2GRAY, 0)?;
    Ok(gray)
}

/// Vision capabilities backed by `OpenCV`
pub struct OpencvVision {
    cascade: Mutex<objdetect::CascadeClassifier>,
    scale_factor: f64,
    min_neighbours: i32,
    min_size: i32,
}

impl OpencvVision {
    /// Load the cascade model
    ///
    /// `processing_scale` shrinks the minimum object size to match the
    /// resized images the track manager hands to the detector.
    ///
    /// # Errors
    ///
    /// Returns an error if the cascade model cannot be loaded
    pub fn new(config: &DetectorConfig, processing_scale: f32) -> Result<Self> {
        info!("Loading cascade model {}", config.model);
        let cascade = objdetect::CascadeClassifier::new(&config.model)?;
        if cascade.empty()? {
            return Err(Error::Vision(format!("Cascade model {} is empty", config.model)));
        }

        #[allow(clippy::cast_precision_loss)]
        let min_size = f32_to_i32_clamp(config.min_size as f32 * processing_scale, 0, i32::MAX);

        Ok(Self {
            cascade: Mutex::new(cascade),
            scale_factor: config.scale_factor,
            min_neighbours: config.min_neighbours,
            min_size,
        })
    }
}

impl Vision for OpencvVision {
    type Image = CvImage;
    type Tracker = Ptr<TrackerKCF>;

    fn detect_pattern(&self, image: &CvImage, pattern: &PatternSpec) -> Result<PatternDetection> {
        let gray = to_gray(&image.0)?;
        let size = Size::new(u32_to_i32(pattern.columns)?, u32_to_i32(pattern.rows)?);
        let mut corners = Vector::<core::Point2f>::new();

        let found = calib3d::find_chessboard_corners(
            &gray,
            size,
            &mut corners,
            calib3d::CALIB_CB_ADAPTIVE_THRESH + calib3d::CALIB_CB_NORMALIZE_IMAGE + calib3d::CALIB_CB_FAST_CHECK,
        )?;

        if found {
            let criteria = TermCriteria::new(core::TermCriteria_EPS + core::TermCriteria_COUNT, 30, 0.1)?;
            imgproc::corner_sub_pix(&gray, &mut corners, Size::new(11, 11), Size::new(-1, -1), criteria)?;
        }

        Ok(PatternDetection {
            corners: corners.iter().map(|p| Point2f::new(p.x, p.y)).collect(),
            found,
        })
    }

    fn detect_objects(&self, image: &CvImage) -> Result<Vec<BoundingBox>> {
        let mut rects = Vector::<Rect>::new();
        self.cascade.lock().detect_multi_scale(
            &image.0,
            &mut rects,
            self.scale_factor,
            self.min_neighbours,
            0,
            Size::new(self.min_size, self.min_size),
            Size::default(),
        )?;
        Ok(rects.iter().map(from_rect).collect())
    }

    fn tracker_init(&self, image: &CvImage, bbox: BoundingBox) -> Result<Ptr<TrackerKCF>> {
        let mut tracker = TrackerKCF::create(TrackerKCF_Params::default()?)?;
        tracker.init(&image.0, to_rect(bbox))?;
        Ok(tracker)
    }

    fn tracker_update(&self, tracker: &mut Ptr<TrackerKCF>, image: &CvImage) -> Result<TrackerUpdate> {
        let mut rect = Rect::default();
        let success = tracker.update(&image.0, &mut rect)?;
        Ok(TrackerUpdate {
            bbox: from_rect(rect),
            success,
        })
    }

    fn tracker_release(&self, tracker: Ptr<TrackerKCF>) {
        debug!("Releasing KCF tracker");
        drop(tracker);
    }

    fn calibrate_camera(
        &self,
        object_sets: &[Vec<Point3f>],
        image_sets: &[Vec<Point2f>],
        image_size: ImageSize,
    ) -> Result<IntrinsicEstimate> {
        let objects: Vector<Vector<core::Point3f>> = object_sets.iter().map(|s| object_points(s)).collect();
        let images: Vector<Vector<core::Point2f>> = image_sets.iter().map(|s| image_points(s)).collect();

        let mut k = Mat::default();
        let mut d = Mat::default();
        let mut rvecs = Vector::<Mat>::new();
        let mut tvecs = Vector::<Mat>::new();
        let criteria = TermCriteria::new(core::TermCriteria_COUNT + core::TermCriteria_EPS, 30, 0.1)?;

        let error = calib3d::calibrate_camera(
            &objects,
            &images,
            Size::new(image_size.width, image_size.height),
            &mut k,
            &mut d,
            &mut rvecs,
            &mut tvecs,
            calib3d::CALIB_RATIONAL_MODEL,
            criteria,
        )?;

        Ok(IntrinsicEstimate {
            camera_matrix: camera_matrix_from_mat(&k)?,
            dist_coeffs: dist_coeffs_from_mat(&d)?,
            reprojection_error: error,
        })
    }

    fn solve_pose(
        &self,
        object: &[Point3f],
        image: &[Point2f],
        camera_matrix: &CameraMatrix,
        dist_coeffs: &DistortionCoefficients,
    ) -> Result<PoseSolution> {
        let mut rvec = Mat::default();
        let mut tvec = Mat::default();

        let success = calib3d::solve_pnp(
            &object_points(object),
            &image_points(image),
            &camera_matrix_to_mat(camera_matrix)?,
            &dist_coeffs_to_mat(dist_coeffs)?,
            &mut rvec,
            &mut tvec,
            false,
            calib3d::SOLVEPNP_ITERATIVE,
        )?;

        if !success {
            return Ok(PoseSolution {
                rotation: Vector3::zeros(),
                translation: Vector3::zeros(),
                success,
            });
        }

        Ok(PoseSolution {
            rotation: vector3_from_mat(&rvec)?,
            translation: vector3_from_mat(&tvec)?,
            success,
        })
    }

    fn undistort(
        &self,
        image: &CvImage,
        camera_matrix: &CameraMatrix,
        dist_coeffs: &DistortionCoefficients,
    ) -> Result<CvImage> {
        let k = camera_matrix_to_mat(camera_matrix)?;
        let d = dist_coeffs_to_mat(dist_coeffs)?;
        let mut output = Mat::default();
        calib3d::undistort(&image.0, &mut output, &k, &d, &k)?;
        Ok(CvImage(output))
    }

    fn undistort_points(
        &self,
        points: &[Point2f],
        camera_matrix: &CameraMatrix,
        dist_coeffs: &DistortionCoefficients,
    ) -> Result<Vec<Point2f>> {
        let mut output = Vector::<core::Point2f>::new();
        calib3d::undistort_points(
            &image_points(points),
            &mut output,
            &camera_matrix_to_mat(camera_matrix)?,
            &dist_coeffs_to_mat(dist_coeffs)?,
            &Mat::default(),
            &Mat::default(),
        )?;
        Ok(output.iter().map(|p| Point2f::new(p.x, p.y)).collect())
    }

    fn resize(&self, image: &CvImage, scale: f32) -> Result<CvImage> {
        let mut output = Mat::default();
        imgproc::resize(
            &image.0,
            &mut output,
            Size::default(),
            f64::from(scale),
            f64::from(scale),
            imgproc::INTER_LINEAR,
        )?;
        Ok(CvImage(output))
    }
}

/// `VideoCapture` device
pub struct OpencvDevice {
    capture: VideoCapture,
}

impl CaptureDevice<CvImage> for OpencvDevice {
    fn grab(&mut self) -> Result<Option<CvImage>> {
        let mut mat = Mat::default();
        if self.capture.read(&mut mat)? && !mat.empty() {
            Ok(Some(CvImage(mat)))
        } else {
            Ok(None)
        }
    }

    fn position(&self) -> Option<f64> {
        self.capture
            .get(videoio::CAP_PROP_POS_MSEC)
            .ok()
            .filter(|p| *p > 0.0)
    }
}

/// Opens cameras and streams through `VideoCapture`
#[derive(Debug, Default, Clone, Copy)]
pub struct OpencvCapture;

impl CaptureBackend<CvImage> for OpencvCapture {
    fn open(&self, source: &VideoSource) -> Result<Box<dyn CaptureDevice<CvImage>>> {
        let capture = match source {
            VideoSource::Camera(index) => {
                let mut cap = VideoCapture::new(*index, videoio::CAP_ANY)?;
                // Keep latency low on live cameras
                cap.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;
                cap
            }
            VideoSource::Stream(uri) => VideoCapture::from_file(uri, videoio::CAP_ANY)?,
        };

        if !capture.is_opened()? {
            return Err(Error::Capture(format!("Failed to open {source}")));
        }
        let width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)?;
        let height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)?;
        info!("Opened {source} at {width}x{height}");

        Ok(Box::new(OpencvDevice { capture }))
    }
}
