//! Real-time camera pipeline: frame acquisition, multi-object tracking and
//! camera calibration.
//!
//! The library orchestrates vision algorithms it does not implement itself:
//! - A frame source reads a capture device under a drop-latest policy
//! - A track manager keeps a set of live tracks from detections and
//!   per-object trackers
//! - A calibrator accumulates pattern samples and estimates intrinsic and
//!   extrinsic camera parameters
//! - An undistortion stage applies the latest calibration to the latest frame
//!
//! Algorithms are supplied through the [`vision::Vision`] trait and capture
//! devices through [`capture::CaptureBackend`]. The `opencv` feature enables
//! [`opencv_backend`], an implementation of both.
//!
//! # Examples
//!
//! ## Running the pipeline
//!
//! ```no_run
//! # #[cfg(feature = "opencv")]
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use camera_pipeline::config::Config;
//! use camera_pipeline::opencv_backend::{OpencvCapture, OpencvVision};
//! use camera_pipeline::pipeline::{Pipeline, PipelineEvent};
//! use std::sync::Arc;
//!
//! let config = Config::default();
//! let vision = Arc::new(OpencvVision::new(&config.detector, config.tracking.processing_scale)?);
//! let mut pipeline = Pipeline::new(vision, Arc::new(OpencvCapture), config)?;
//!
//! pipeline.start()?;
//! pipeline.find_patterns()?;
//!
//! for event in pipeline.events() {
//!     if let PipelineEvent::CalibrationUpdated(calibration) = event {
//!         println!("Reprojection error: {:.4}", calibration.reprojection_error());
//!         break;
//!     }
//! }
//!
//! pipeline.save_calibration("calibration.yml")?;
//! pipeline.stop();
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "opencv"))]
//! # fn main() {}
//! ```
//!
//! ## Calibration files
//!
//! ```no_run
//! use camera_pipeline::calibration::storage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let calibration = storage::load("calibration.yml")?;
//! println!("fx = {}", calibration.camera_matrix()[(0, 0)]);
//! # Ok(())
//! # }
//! ```

/// Camera calibration: sampling, estimation and persistence
pub mod calibration;

/// Capture device seam
pub mod capture;

/// Command-line arguments
pub mod cli;

/// Configuration management
pub mod config;

/// Constants used throughout the pipeline
pub mod constants;

/// Error types and result handling
pub mod error;

/// Captured frames
pub mod frame;

/// Frame acquisition with drop-latest delivery
pub mod frame_source;

/// Image-space geometry
pub mod geometry;

/// Single-slot overwrite mailbox
pub mod mailbox;

/// Pipeline orchestration
pub mod pipeline;

/// Multi-object tracking
pub mod tracking;

/// Undistortion stage
pub mod undistort;

/// Utility functions for coordinate transformations
pub mod utils;

/// Vision capability interface
pub mod vision;

/// `OpenCV` implementation of the vision and capture capabilities
#[cfg(feature = "opencv")]
pub mod opencv_backend;

pub use error::{Error, Result};
