use super::track::{Track, TrackId, TrackState};
use crate::frame::Frame;
use crate::geometry::{BoundingBox, ImageSize};
use crate::utils::map_to_frame;
use crate::vision::{ImageBuffer, Vision};
use crate::{Error, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::SystemTime;

/// One live track as reported for a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSnapshot {
    /// Track identity
    pub id: TrackId,
    /// Box in frame coordinates
    pub bbox: BoundingBox,
    /// Spawned during this cycle
    pub is_new: bool,
}

/// Live set after one Track Manager cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackReport {
    /// Sequence number of the frame processed
    pub sequence: u64,
    /// Capture time of that frame
    pub timestamp: SystemTime,
    /// Frame dimensions the boxes refer to
    pub frame_size: ImageSize,
    /// Live tracks in creation order
    pub tracks: Vec<TrackSnapshot>,
    /// Tracks removed during this cycle
    pub retired: Vec<TrackId>,
}

impl TrackReport {
    /// First reported track, the crop target for downstream consumers
    #[must_use]
    pub fn primary(&self) -> Option<&TrackSnapshot> {
        self.tracks.first()
    }

    /// True if a track with `id` is live
    #[must_use]
    pub fn contains(&self, id: TrackId) -> bool {
        self.tracks.iter().any(|t| t.id == id)
    }
}

/// Maintains the set of live tracks across frames
///
/// Each call to [`TrackManager::update`] advances every tracker, retires the
/// lost ones, and spawns tracks for detections that do not overlap any live
/// track. Tracker handles are released through [`Vision::tracker_release`].
pub struct TrackManager<V: Vision> {
    vision: Arc<V>,
    tracks: Vec<Track<V::Tracker>>,
    next_id: u64,
    processing_scale: f32,
}

impl<V: Vision> TrackManager<V> {
    /// Create an empty manager
    ///
    /// # Errors
    ///
    /// Returns an error if `processing_scale` is outside (0, 1]
    pub fn new(vision: Arc<V>, processing_scale: f32) -> Result<Self> {
        if !(processing_scale > 0.0 && processing_scale <= 1.0) {
            return Err(Error::InvalidInput(format!(
                "Processing scale must be in (0, 1], got {processing_scale}"
            )));
        }
        Ok(Self {
            vision,
            tracks: Vec::new(),
            next_id: 1,
            processing_scale,
        })
    }

    /// Number of live tracks
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// True if no track is live
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Live tracks, boxes in processing coordinates
    pub fn tracks(&self) -> impl Iterator<Item = &Track<V::Tracker>> {
        self.tracks.iter()
    }

    /// Run one cycle on `frame`
    ///
    /// # Errors
    ///
    /// Returns an error only if the frame cannot be resized to the processing
    /// scale; tracker and detector failures are absorbed by the cycle.
    pub fn update(&mut self, frame: &Frame<V::Image>) -> Result<TrackReport> {
        let frame_size = frame.size();
        let scaled;
        let image = if (self.processing_scale - 1.0).abs() > f32::EPSILON {
            scaled = self.vision.resize(&frame.image, self.processing_scale)?;
            &scaled
        } else {
            &frame.image
        };
        let region = image.size();

        for track in &mut self.tracks {
            let update = self.vision.tracker_update(track.tracker_mut(), image);
            track.apply_update(update, region);
        }

        let mut retired = Vec::new();
        let (live, lost): (Vec<_>, Vec<_>) = self.tracks.drain(..).partition(|t| !t.is_retired());
        self.tracks = live;
        for track in lost {
            retired.push(track.id());
            self.vision.tracker_release(track.into_tracker());
        }

        let detections = self.vision.detect_objects(image).unwrap_or_else(|e| {
            warn!("Object detection failed on frame {}: {e}", frame.sequence);
            Vec::new()
        });

        for detection in detections {
            let bbox = detection.clip_to(region);
            if bbox.is_empty() || self.tracks.iter().any(|t| t.bbox().intersects(&bbox)) {
                continue;
            }
            match self.vision.tracker_init(image, bbox) {
                Ok(tracker) => {
                    let id = TrackId(self.next_id);
                    self.next_id += 1;
                    debug!("Spawned track {id} at {bbox:?}");
                    self.tracks.push(Track::new(id, bbox, tracker));
                }
                Err(e) => warn!("Tracker init failed for {bbox:?}: {e}"),
            }
        }

        let mut boxes: Vec<BoundingBox> = self.tracks.iter().map(Track::bbox).collect();
        map_to_frame(&mut boxes, self.processing_scale, frame_size)?;

        let tracks = self
            .tracks
            .iter()
            .zip(boxes)
            .map(|(track, bbox)| TrackSnapshot {
                id: track.id(),
                bbox,
                is_new: track.state() == TrackState::Tentative,
            })
            .collect();

        Ok(TrackReport {
            sequence: frame.sequence,
            timestamp: frame.timestamp,
            frame_size,
            tracks,
            retired,
        })
    }

    /// Retire every track, releasing its tracker
    pub fn clear(&mut self) {
        if self.tracks.is_empty() {
            return;
        }
        info!("Releasing {} trackers", self.tracks.len());
        for track in self.tracks.drain(..) {
            self.vision.tracker_release(track.into_tracker());
        }
    }
}

impl<V: Vision> Drop for TrackManager<V> {
    fn drop(&mut self) {
        self.clear();
    }
}
