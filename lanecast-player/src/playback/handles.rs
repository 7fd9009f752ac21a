//! Process-local lane tables
//!
//! [`HandleTable`] maps a lane to the supervisor of its streaming track.
//! [`LaneCache`] keeps the volume factor off the store for the per-frame
//! path. Neither leaves the process; the store stays authoritative.

use super::supervisor::TrackSupervisor;
use lanecast_common::store::DEFAULT_VOLUME;
use lanecast_common::{LaneKey, QueueStore};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::warn;

/// Active supervisors, at most one per lane
#[derive(Default)]
pub struct HandleTable {
    handles: RwLock<HashMap<LaneKey, TrackSupervisor>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the supervisor for a starting track, cancelling any stale one
    pub async fn register(&self, lane: &LaneKey, supervisor: TrackSupervisor) {
        let previous = self.handles.write().await.insert(lane.clone(), supervisor);
        if let Some(previous) = previous {
            warn!(lane = %lane, "Replacing a live track supervisor");
            previous.cancel();
        }
    }

    /// Remove the entry only if it still belongs to `supervisor`
    pub async fn deregister(&self, lane: &LaneKey, supervisor: &TrackSupervisor) {
        let mut handles = self.handles.write().await;
        if handles
            .get(lane)
            .is_some_and(|current| current.same_track(supervisor))
        {
            handles.remove(lane);
        }
    }

    pub async fn get(&self, lane: &LaneKey) -> Option<TrackSupervisor> {
        self.handles.read().await.get(lane).cloned()
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedVolume {
    factor: f64,
    fetched: Instant,
}

/// Volume cache in front of the store.
///
/// Entries are replaced on every local write and re-read after `max_age`,
/// which bounds how long a change made by another process goes unseen.
pub struct LaneCache {
    volumes: RwLock<HashMap<LaneKey, CachedVolume>>,
    max_age: Duration,
}

impl LaneCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            volumes: RwLock::new(HashMap::new()),
            max_age,
        }
    }

    /// Current factor for the lane, reading through to the store when the
    /// entry is missing or old. Store failures fall back to the default.
    pub async fn volume(&self, store: &dyn QueueStore, lane: &LaneKey) -> f64 {
        if let Some(cached) = self.volumes.read().await.get(lane) {
            if cached.fetched.elapsed() < self.max_age {
                return cached.factor;
            }
        }

        let factor = match store.get_volume(lane).await {
            Ok(factor) => factor,
            Err(e) => {
                warn!(lane = %lane, error = %e, "Volume read failed, using default");
                DEFAULT_VOLUME
            }
        };
        self.put_volume(lane, factor).await;
        factor
    }

    /// Record a value just written to the store
    pub async fn put_volume(&self, lane: &LaneKey, factor: f64) {
        self.volumes.write().await.insert(
            lane.clone(),
            CachedVolume {
                factor,
                fetched: Instant::now(),
            },
        );
    }
}
