//! Multi-object track lifecycle.
//!
//! Tracks are born from detections that overlap no live track, followed by a
//! per-track visual tracker, and retired the first time that tracker fails or
//! the box leaves the frame. A retired id never comes back.

mod manager;
mod track;

pub use manager::{TrackManager, TrackReport, TrackSnapshot};
pub use track::{Track, TrackId, TrackState};
