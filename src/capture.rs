//! Capture device seam used by the frame source.

use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where frames come from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoSource {
    /// Local capture device index
    Camera(i32),
    /// Stream URI or video file path
    Stream(String),
}

impl FromStr for VideoSource {
    type Err = std::convert::Infallible;

    /// Integers select a device index, anything else is treated as a URI
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(trimmed
            .parse::<i32>()
            .map_or_else(|_| Self::Stream(trimmed.to_string()), Self::Camera))
    }
}

impl fmt::Display for VideoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Camera(index) => write!(f, "camera {index}"),
            Self::Stream(uri) => write!(f, "{uri}"),
        }
    }
}

/// An opened capture device
///
/// Owned by the acquisition thread for the lifetime of one run. Dropping the
/// device releases it.
pub trait CaptureDevice<I>: Send {
    /// Grab the next image
    ///
    /// `Ok(None)` means no image was available this cycle.
    fn grab(&mut self) -> Result<Option<I>>;

    /// Current device position in milliseconds, if the device reports one
    fn position(&self) -> Option<f64> {
        None
    }

    /// Stop delivering images; called before the release grace period
    fn stop(&mut self) {}
}

/// Factory for capture devices
pub trait CaptureBackend<I>: Send + Sync + 'static {
    /// Open the device named by `source`
    fn open(&self, source: &VideoSource) -> Result<Box<dyn CaptureDevice<I>>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_video_source() {
        assert_eq!("0".parse::<VideoSource>().unwrap(), VideoSource::Camera(0));
        assert_eq!(" 2 ".parse::<VideoSource>().unwrap(), VideoSource::Camera(2));
        assert_eq!(
            "rtsp://10.0.0.2:554/media/video1".parse::<VideoSource>().unwrap(),
            VideoSource::Stream("rtsp://10.0.0.2:554/media/video1".to_string())
        );
        assert_eq!(
            "clip.mp4".parse::<VideoSource>().unwrap(),
            VideoSource::Stream("clip.mp4".to_string())
        );
    }
}
