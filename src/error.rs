//! Error types for the camera pipeline library.

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// `OpenCV` operation failed
    #[cfg(feature = "opencv")]
    #[error("OpenCV error: {0}")]
    OpenCV(#[from] opencv::Error),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML (de)serialization failed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Capture device could not be opened or driven
    #[error("Capture error: {0}")]
    Capture(String),

    /// A vision capability (detector, tracker, solver) reported an error
    #[error("Vision capability error: {0}")]
    Vision(String),

    /// Parameter estimation failed
    #[error("Calibration error: {0}")]
    Calibration(String),

    /// Intrinsic estimation requested before the sample window is full
    #[error("Not enough calibration samples: have {have}, need {need}")]
    NotEnoughSamples {
        /// Samples currently accumulated
        have: usize,
        /// Samples required
        need: usize,
    },

    /// An operation needs a calibration but none is current
    #[error("No calibration available")]
    NoCalibration,

    /// Persisted calibration file is malformed
    #[error("Calibration file error: {0}")]
    CalibrationFile(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline lifecycle error (worker spawn, command channel closed)
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
