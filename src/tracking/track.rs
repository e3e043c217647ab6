use crate::geometry::{BoundingBox, ImageSize};
use crate::vision::TrackerUpdate;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable track identity, assigned from 1 in creation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Track lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackState {
    /// Spawned this cycle
    Tentative,
    /// Survived at least one tracker update
    Active,
    /// Lost; removed from the live set at the end of the update step
    Retired,
}

/// One followed object and the tracker that follows it
pub struct Track<T> {
    id: TrackId,
    bbox: BoundingBox,
    tracker: T,
    state: TrackState,
    age: u32,
}

impl<T> Track<T> {
    pub(crate) const fn new(id: TrackId, bbox: BoundingBox, tracker: T) -> Self {
        Self {
            id,
            bbox,
            tracker,
            state: TrackState::Tentative,
            age: 0,
        }
    }

    /// Track identity
    pub const fn id(&self) -> TrackId {
        self.id
    }

    /// Current box in processing coordinates
    pub const fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    /// Lifecycle state
    pub const fn state(&self) -> TrackState {
        self.state
    }

    /// Tracker updates survived
    pub const fn age(&self) -> u32 {
        self.age
    }

    /// True only during the cycle the track was created
    pub const fn is_new(&self) -> bool {
        self.age == 0
    }

    pub const fn is_retired(&self) -> bool {
        matches!(self.state, TrackState::Retired)
    }

    pub(crate) fn tracker_mut(&mut self) -> &mut T {
        &mut self.tracker
    }

    pub(crate) fn into_tracker(self) -> T {
        self.tracker
    }

    /// Apply one tracker update
    ///
    /// Errors, lost objects and boxes that leave `region` retire the track.
    /// Survivors age by one and become active.
    pub(crate) fn apply_update(&mut self, update: Result<TrackerUpdate>, region: ImageSize) {
        let bbox = match update {
            Ok(TrackerUpdate { bbox, success: true }) => bbox.clip_to(region),
            Ok(_) => {
                log::debug!("Track {} lost its object", self.id);
                self.state = TrackState::Retired;
                return;
            }
            Err(e) => {
                log::debug!("Track {} update failed: {e}", self.id);
                self.state = TrackState::Retired;
                return;
            }
        };

        if bbox.is_empty() {
            log::debug!("Track {} left the frame", self.id);
            self.state = TrackState::Retired;
            return;
        }

        self.bbox = bbox;
        self.age = self.age.saturating_add(1);
        self.state = TrackState::Active;
    }
}

impl<T> fmt::Debug for Track<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("bbox", &self.bbox)
            .field("state", &self.state)
            .field("age", &self.age)
            .finish_non_exhaustive()
    }
}
