//! Constants used throughout the pipeline

/// Inner corners along the calibration pattern's horizontal axis
pub const PATTERN_COLUMNS: u32 = 9;

/// Inner corners along the calibration pattern's vertical axis
pub const PATTERN_ROWS: u32 = 6;

/// Distance between neighbouring pattern corners, in meters
pub const PATTERN_SQUARE_SIZE: f32 = 0.034;

/// Number of accepted samples that triggers intrinsic estimation
pub const DEFAULT_TARGET_SAMPLES: usize = 30;

/// Interval between pattern search attempts (ms)
pub const DEFAULT_SEARCH_INTERVAL_MS: u64 = 1000;

/// Interval between track manager cycles (ms), roughly 30 FPS
pub const DEFAULT_TRACKING_INTERVAL_MS: u64 = 33;

/// Interval between undistortion refreshes (ms)
pub const DEFAULT_UNDISTORT_INTERVAL_MS: u64 = 50;

/// Cascade classifier model used for object detection
pub const DEFAULT_CASCADE_MODEL: &str = "haarcascade_frontalface_default.xml";

/// Pyramid step between cascade detection scales
pub const DEFAULT_DETECTOR_SCALE_FACTOR: f64 = 1.1;

/// Neighbouring hits required to keep a cascade detection
pub const DEFAULT_DETECTOR_MIN_NEIGHBOURS: i32 = 3;

/// Smallest detectable object at full resolution (pixels)
pub const DEFAULT_DETECTOR_MIN_SIZE: i32 = 30;

/// Delay between a failed grab and the next attempt (ms)
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 5;

/// Time the capture device is kept alive after stopping (ms)
pub const DEFAULT_STOP_GRACE_MS: u64 = 1000;

/// Real-world location of the pattern origin used for extrinsic estimation
pub const DEFAULT_WORLD_ORIGIN: [f32; 3] = [0.424, 0.0, 1.965];

/// Number of distortion coefficients (rational model)
pub const DISTORTION_COEFFICIENTS: usize = 8;

/// Capacity of the pipeline event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Quality score of a pattern detection with every corner found
pub const MAX_PATTERN_QUALITY: u8 = 100;
