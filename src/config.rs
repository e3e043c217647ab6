//! Configuration management for the camera pipeline

use crate::calibration::{PatternSpec, WindowMode};
use crate::constants::{
    DEFAULT_CASCADE_MODEL, DEFAULT_DETECTOR_MIN_NEIGHBOURS, DEFAULT_DETECTOR_MIN_SIZE, DEFAULT_DETECTOR_SCALE_FACTOR,
    DEFAULT_EVENT_CAPACITY, DEFAULT_RETRY_INTERVAL_MS, DEFAULT_SEARCH_INTERVAL_MS, DEFAULT_STOP_GRACE_MS,
    DEFAULT_TARGET_SAMPLES, DEFAULT_TRACKING_INTERVAL_MS, DEFAULT_UNDISTORT_INTERVAL_MS, DEFAULT_WORLD_ORIGIN,
};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Frame source configuration
    pub source: SourceConfig,

    /// Calibration pattern geometry
    pub pattern: PatternSpec,

    /// Sample accumulation and estimation
    pub calibration: CalibrationConfig,

    /// Track manager configuration
    pub tracking: TrackingConfig,

    /// Object detector parameters
    pub detector: DetectorConfig,

    /// Undistortion stage configuration
    pub undistortion: UndistortionConfig,

    /// Event channel configuration
    pub events: EventConfig,
}

/// Capture device configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Device index ("0") or stream URI
    pub device: String,

    /// Minimum time between delivered frames (ms); 0 delivers at device rate
    pub frame_interval_ms: u64,

    /// Pause after a failed grab before trying again (ms)
    pub retry_interval_ms: u64,

    /// Time to keep the device alive after stopping (ms)
    pub stop_grace_ms: u64,

    /// Drop frames whose device position did not advance
    pub drop_stale_frames: bool,
}

/// Calibration sampling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Number of accepted samples required for intrinsic estimation
    pub target_samples: usize,

    /// Interval between pattern search attempts (ms)
    pub search_interval_ms: u64,

    /// Behaviour once the sample window is full
    pub window_mode: WindowMode,

    /// Run intrinsic estimation as soon as the window fills
    pub auto_calibrate: bool,

    /// World position of the pattern origin for extrinsic estimation (m)
    pub world_origin: [f32; 3],
}

/// Track manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Run the tracking consumer
    pub enabled: bool,

    /// Interval between tracking cycles (ms)
    pub interval_ms: u64,

    /// Image scale used for detection and tracking (0, 1]
    pub processing_scale: f32,
}

/// Cascade object detector parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Cascade classifier model file
    pub model: String,

    /// Image pyramid step between detection scales
    pub scale_factor: f64,

    /// Neighbouring hits required to keep a detection
    pub min_neighbours: i32,

    /// Smallest object size at full resolution (pixels)
    pub min_size: i32,
}

/// Undistortion stage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UndistortionConfig {
    /// Run the undistortion consumer
    pub enabled: bool,

    /// Interval between undistortion refreshes (ms)
    pub interval_ms: u64,
}

/// Event channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventConfig {
    /// Events buffered before new ones are dropped
    pub capacity: usize,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            device: "0".to_string(),
            frame_interval_ms: 0,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
            drop_stale_frames: false,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            target_samples: DEFAULT_TARGET_SAMPLES,
            search_interval_ms: DEFAULT_SEARCH_INTERVAL_MS,
            window_mode: WindowMode::default(),
            auto_calibrate: true,
            world_origin: DEFAULT_WORLD_ORIGIN,
        }
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_TRACKING_INTERVAL_MS,
            processing_scale: 1.0,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_CASCADE_MODEL.to_string(),
            scale_factor: DEFAULT_DETECTOR_SCALE_FACTOR,
            min_neighbours: DEFAULT_DETECTOR_MIN_NEIGHBOURS,
            min_size: DEFAULT_DETECTOR_MIN_SIZE,
        }
    }
}

impl Default for UndistortionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: DEFAULT_UNDISTORT_INTERVAL_MS,
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl CalibrationConfig {
    /// Pattern search interval
    #[must_use]
    pub fn search_interval(&self) -> Duration {
        Duration::from_millis(self.search_interval_ms)
    }
}

impl TrackingConfig {
    /// Tracking cycle interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl UndistortionConfig {
    /// Undistortion refresh interval
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;

        serde_yaml::from_str(&content).map_err(|e| Error::ConfigError(format!("Failed to parse config: {e}")))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` describing the first invalid value
    pub fn validate(&self) -> Result<()> {
        if self.source.device.trim().is_empty() {
            return Err(Error::ConfigError("Source device must not be empty".to_string()));
        }

        if self.pattern.columns < 2 || self.pattern.rows < 2 {
            return Err(Error::ConfigError(
                "Pattern must have at least 2×2 inner corners".to_string(),
            ));
        }
        if !(self.pattern.square_size.is_finite() && self.pattern.square_size > 0.0) {
            return Err(Error::ConfigError("Pattern square size must be positive".to_string()));
        }

        if self.calibration.target_samples == 0 {
            return Err(Error::ConfigError(
                "Target sample count must be greater than 0".to_string(),
            ));
        }
        if self.calibration.search_interval_ms == 0 {
            return Err(Error::ConfigError(
                "Search interval must be greater than 0".to_string(),
            ));
        }
        if self.calibration.world_origin.iter().any(|v| !v.is_finite()) {
            return Err(Error::ConfigError("World origin must be finite".to_string()));
        }

        if !(self.tracking.processing_scale > 0.0 && self.tracking.processing_scale <= 1.0) {
            return Err(Error::ConfigError(
                "Processing scale must be in (0, 1]".to_string(),
            ));
        }
        if self.tracking.enabled && self.tracking.interval_ms == 0 {
            return Err(Error::ConfigError(
                "Tracking interval must be greater than 0".to_string(),
            ));
        }
        if self.detector.scale_factor <= 1.0 {
            return Err(Error::ConfigError(
                "Detector scale factor must be greater than 1".to_string(),
            ));
        }
        if self.detector.min_neighbours < 0 || self.detector.min_size < 0 {
            return Err(Error::ConfigError(
                "Detector neighbours and size must not be negative".to_string(),
            ));
        }
        if self.undistortion.enabled && self.undistortion.interval_ms == 0 {
            return Err(Error::ConfigError(
                "Undistortion interval must be greater than 0".to_string(),
            ));
        }

        if self.events.capacity == 0 {
            return Err(Error::ConfigError(
                "Event capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Camera Pipeline Configuration

# Capture device: an index ("0") or a stream URI
source:
  device: "0"
  frame_interval_ms: 0
  retry_interval_ms: 5
  stop_grace_ms: 1000
  drop_stale_frames: false

# Calibration pattern (inner corners)
pattern:
  columns: 9
  rows: 6
  square_size: 0.034

# Sample accumulation
calibration:
  target_samples: 30
  search_interval_ms: 1000
  window_mode: grow_then_stop
  auto_calibrate: true
  world_origin: [0.424, 0.0, 1.965]

# Object tracking
tracking:
  enabled: true
  interval_ms: 33
  processing_scale: 1.0

# Cascade object detector
detector:
  model: haarcascade_frontalface_default.xml
  scale_factor: 1.1
  min_neighbours: 3
  min_size: 30

# Undistortion preview
undistortion:
  enabled: true
  interval_ms: 50

# Event channel
events:
  capacity: 64
"#;
