//! Durable lane-keyed queue store
//!
//! The store is the single source of truth for queue contents, now-playing
//! and playback flags across both processes. Each call is atomic on its own;
//! read-then-write sequences built from several calls are not.

mod sqlite;

pub use sqlite::SqliteQueueStore;

use crate::{LaneKey, Result, TrackEntry};
use async_trait::async_trait;

/// Volume factor reported when none has been stored
pub const DEFAULT_VOLUME: f64 = 1.0;

/// Queue and playback-state persistence shared by every process
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Append a track to the tail of the lane's queue
    async fn append(&self, lane: &LaneKey, track: &TrackEntry) -> Result<()>;

    /// Remove and return the head of the queue, `None` when empty
    async fn pop_next(&self, lane: &LaneKey) -> Result<Option<TrackEntry>>;

    /// Ordered copy of the queue
    async fn snapshot(&self, lane: &LaneKey) -> Result<Vec<TrackEntry>>;

    /// Remove the entry at `index`; out-of-range fails with
    /// [`crate::Error::IndexOutOfRange`] and leaves the queue untouched
    async fn remove_at(&self, lane: &LaneKey, index: usize) -> Result<()>;

    /// Remove every queued entry
    async fn clear(&self, lane: &LaneKey) -> Result<()>;

    async fn length(&self, lane: &LaneKey) -> Result<usize>;

    async fn save_metadata(&self, lane: &LaneKey, url: &str, track: &TrackEntry) -> Result<()>;

    async fn lookup_metadata(&self, lane: &LaneKey, url: &str) -> Result<Option<TrackEntry>>;

    async fn clear_metadata(&self, lane: &LaneKey) -> Result<()>;

    /// Set or (with `None`) clear the now-playing entry
    async fn set_now_playing(&self, lane: &LaneKey, track: Option<&TrackEntry>) -> Result<()>;

    async fn get_now_playing(&self, lane: &LaneKey) -> Result<Option<TrackEntry>>;

    async fn set_playing(&self, lane: &LaneKey, value: bool) -> Result<()>;

    async fn is_playing(&self, lane: &LaneKey) -> Result<bool>;

    async fn set_paused(&self, lane: &LaneKey, value: bool) -> Result<()>;

    async fn is_paused(&self, lane: &LaneKey) -> Result<bool>;

    /// Store a volume factor; range checks belong to the caller
    async fn set_volume(&self, lane: &LaneKey, factor: f64) -> Result<()>;

    /// Stored volume factor, [`DEFAULT_VOLUME`] when unset
    async fn get_volume(&self, lane: &LaneKey) -> Result<f64>;
}
