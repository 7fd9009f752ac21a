//! Playback control surface
//!
//! Every operation writes the store first; process-local handles (the
//! active track supervisor and the volume cache) are updated afterwards.

use super::handles::{HandleTable, LaneCache};
use super::processor::WorkerRegistry;
use crate::audio::volume::{factor_to_percent, percent_to_factor};
use crate::config::PlayerConfig;
use crate::error::{Error, Result};
use crate::events::LaneEvent;
use crate::media::MediaResolver;
use crate::validation::{canonical_media_url, is_accepted_media_url, prepare_search_query};
use crate::voice::VoiceConnectionManager;
use chrono::Utc;
use lanecast_common::{history, LaneKey, QueueStore, TrackEntry};
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Highest accepted volume, in percent
pub const MAX_VOLUME_PERCENT: u32 = 200;

/// How long a cached volume is trusted before re-reading the store
const VOLUME_CACHE_MAX_AGE: Duration = Duration::from_secs(1);

/// Where a requested track comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackSource {
    Url(String),
    Search(String),
}

/// A request to enqueue one track
#[derive(Debug, Clone)]
pub struct AddTrackRequest {
    pub source: TrackSource,
    pub requested_by: String,
    pub requested_by_id: String,
}

impl AddTrackRequest {
    pub fn url(
        url: impl Into<String>,
        requested_by: impl Into<String>,
        requested_by_id: impl Into<String>,
    ) -> Self {
        Self {
            source: TrackSource::Url(url.into()),
            requested_by: requested_by.into(),
            requested_by_id: requested_by_id.into(),
        }
    }

    pub fn search(
        query: impl Into<String>,
        requested_by: impl Into<String>,
        requested_by_id: impl Into<String>,
    ) -> Self {
        Self {
            source: TrackSource::Search(query.into()),
            requested_by: requested_by.into(),
            requested_by_id: requested_by_id.into(),
        }
    }
}

/// Result of a successful enqueue
#[derive(Debug, Clone, Serialize)]
pub struct AddedTrack {
    pub entry: TrackEntry,
    /// Queue length after the append
    pub position: usize,
    /// Query actually searched, when sanitising changed it
    pub sanitised_query: Option<String>,
    /// True when this call started the lane's worker
    pub started_worker: bool,
}

/// Point-in-time view of a lane
#[derive(Debug, Clone, Serialize)]
pub struct LaneSnapshot {
    pub now_playing: Option<TrackEntry>,
    pub tracks: Vec<TrackEntry>,
    pub is_playing: bool,
    pub is_paused: bool,
    pub volume_percent: u32,
}

pub(crate) struct EngineInner {
    pub(crate) store: Arc<dyn QueueStore>,
    pub(crate) voice: Arc<VoiceConnectionManager>,
    pub(crate) resolver: Arc<dyn MediaResolver>,
    pub(crate) config: PlayerConfig,
    pub(crate) handles: HandleTable,
    pub(crate) cache: LaneCache,
    pub(crate) workers: WorkerRegistry,
    pub(crate) events: broadcast::Sender<LaneEvent>,
    pub(crate) history: Option<SqlitePool>,
}

impl EngineInner {
    pub(crate) fn broadcast(&self, event: LaneEvent) {
        // Ignore send errors (no receivers is OK)
        let _ = self.events.send(event);
    }
}

/// Multi-lane playback engine
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    pub fn new(
        store: Arc<dyn QueueStore>,
        voice: Arc<VoiceConnectionManager>,
        resolver: Arc<dyn MediaResolver>,
        config: PlayerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            inner: Arc::new(EngineInner {
                store,
                voice,
                resolver,
                config,
                handles: HandleTable::new(),
                cache: LaneCache::new(VOLUME_CACHE_MAX_AGE),
                workers: WorkerRegistry::default(),
                events,
                history: None,
            }),
        }
    }

    /// Record accepted tracks into the recently played list of `db`.
    ///
    /// Must be called before the engine is cloned or used.
    pub fn with_history(mut self, db: SqlitePool) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.history = Some(db),
            None => warn!("Engine already shared; history recording not enabled"),
        }
        self
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<LaneEvent> {
        self.inner.events.subscribe()
    }

    pub fn voice(&self) -> &Arc<VoiceConnectionManager> {
        &self.inner.voice
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.inner.config
    }

    /// True while this process runs a worker for the lane
    pub async fn has_worker(&self, lane: &LaneKey) -> bool {
        self.inner.workers.is_running(lane).await
    }

    /// Validate, resolve and enqueue a track, starting the lane if idle
    pub async fn add_track(&self, lane: &LaneKey, request: AddTrackRequest) -> Result<AddedTrack> {
        let store = &self.inner.store;

        let (url, sanitised_query) = match request.source {
            TrackSource::Url(url) => {
                let url = url.trim().to_string();
                if !is_accepted_media_url(&url) {
                    return Err(Error::Validation(format!("invalid URL: {}", url)));
                }
                (canonical_media_url(&url), None)
            }
            TrackSource::Search(query) => {
                let (query, sanitised) = prepare_search_query(&query)
                    .ok_or_else(|| Error::Validation("invalid search query".to_string()))?;
                let url = self
                    .inner
                    .resolver
                    .search_best_match(&query)
                    .await?
                    .filter(|url| is_accepted_media_url(url))
                    .map(|url| canonical_media_url(&url))
                    .ok_or_else(|| {
                        Error::Validation(format!("no results found for: {}", query))
                    })?;
                (url, sanitised.then_some(query))
            }
        };

        let entry = TrackEntry::placeholder(url, request.requested_by, request.requested_by_id);
        store.append(lane, &entry).await?;
        let position = store.length(lane).await?;

        self.spawn_metadata_backfill(lane, entry.clone());

        let mut started_worker = false;
        if !store.is_playing(lane).await? {
            store.set_playing(lane, true).await?;
            started_worker = self.inner.ensure_worker(lane).await;
        }

        info!(
            lane = %lane,
            url = %entry.url,
            position = position,
            started_worker = started_worker,
            "Track queued"
        );

        Ok(AddedTrack {
            entry,
            position,
            sanitised_query,
            started_worker,
        })
    }

    fn spawn_metadata_backfill(&self, lane: &LaneKey, entry: TrackEntry) {
        let inner = Arc::clone(&self.inner);
        let lane = lane.clone();

        tokio::spawn(async move {
            let recorded = match inner.resolver.fetch_metadata(&entry.url).await {
                Ok(meta) => {
                    let enriched = entry.with_metadata(&meta);
                    if let Err(e) = inner
                        .store
                        .save_metadata(&lane, &enriched.url, &enriched)
                        .await
                    {
                        warn!(lane = %lane, error = %e, "Failed to cache metadata");
                    }
                    enriched
                }
                Err(e) => {
                    warn!(lane = %lane, url = %entry.url, error = %e, "Metadata lookup failed");
                    entry
                }
            };

            if let Some(db) = &inner.history {
                if let Err(e) = history::record(db, &lane, &recorded).await {
                    warn!(lane = %lane, error = %e, "Failed to record recently played");
                }
            }
        });
    }

    /// Remove a queued entry by display position.
    ///
    /// While a track is playing, position 0 is that track (use skip) and
    /// queued entries start at 1. When idle, queued entries start at 0.
    pub async fn remove_track(&self, lane: &LaneKey, position: usize) -> Result<()> {
        let store = &self.inner.store;
        let playing = store.is_playing(lane).await? && store.get_now_playing(lane).await?.is_some();

        let index = if playing {
            if position == 0 {
                return Err(Error::Validation(
                    "cannot remove the playing track; skip it instead".to_string(),
                ));
            }
            position - 1
        } else {
            position
        };

        store.remove_at(lane, index).await?;
        info!(lane = %lane, position = position, "Track removed");
        Ok(())
    }

    /// Empty the queue, metadata cache and now-playing entry
    pub async fn clear_queue(&self, lane: &LaneKey) -> Result<()> {
        let store = &self.inner.store;
        store.clear(lane).await?;
        store.clear_metadata(lane).await?;
        store.set_now_playing(lane, None).await?;
        info!(lane = %lane, "Queue cleared");
        Ok(())
    }

    pub async fn set_paused(&self, lane: &LaneKey, paused: bool) -> Result<()> {
        self.inner.store.set_paused(lane, paused).await?;

        if let Some(supervisor) = self.inner.handles.get(lane).await {
            supervisor.set_paused(paused);
        }

        self.inner.broadcast(LaneEvent::PauseChanged {
            lane: lane.clone(),
            paused,
            timestamp: Utc::now(),
        });
        info!(lane = %lane, paused = paused, "Pause state changed");
        Ok(())
    }

    /// Flip the pause state; returns the new state
    pub async fn toggle_pause(&self, lane: &LaneKey) -> Result<bool> {
        let paused = !self.inner.store.is_paused(lane).await?;
        self.set_paused(lane, paused).await?;
        Ok(paused)
    }

    /// Cancel the active track; the worker advances to the next entry
    pub async fn request_skip(&self, lane: &LaneKey) -> Result<()> {
        match self.inner.handles.get(lane).await {
            Some(supervisor) => {
                supervisor.cancel();
                info!(lane = %lane, "Skip requested");
                Ok(())
            }
            None => Err(Error::NotPlaying),
        }
    }

    /// Stop playback, clear the lane, and leave the voice room after a grace
    pub async fn request_stop(&self, lane: &LaneKey) -> Result<()> {
        let store = &self.inner.store;

        // Empty the queue before cancelling so the worker cannot pick up
        // another entry in between
        store.clear(lane).await?;
        store.clear_metadata(lane).await?;
        store.set_now_playing(lane, None).await?;
        store.set_playing(lane, false).await?;
        store.set_paused(lane, false).await?;

        if let Some(supervisor) = self.inner.handles.get(lane).await {
            supervisor.set_paused(false);
            supervisor.cancel();
        }

        self.inner.broadcast(LaneEvent::Stopped {
            lane: lane.clone(),
            timestamp: Utc::now(),
        });
        info!(lane = %lane, "Stop requested");

        tokio::time::sleep(self.inner.config.timing.stop_grace()).await;

        if let Some(sink) = self.inner.voice.get_connection(lane).await {
            if let Err(e) = sink.set_speaking(false).await {
                debug!(lane = %lane, error = %e, "Could not clear speaking");
            }
            if let Err(e) = sink.disconnect().await {
                warn!(lane = %lane, error = %e, "Voice disconnect failed");
            }
        }
        Ok(())
    }

    /// Set the lane volume in percent (0 to 200)
    pub async fn set_volume(&self, lane: &LaneKey, percent: u32) -> Result<()> {
        if percent > MAX_VOLUME_PERCENT {
            return Err(Error::Validation(format!(
                "volume {} out of range 0-{}",
                percent, MAX_VOLUME_PERCENT
            )));
        }

        let factor = percent_to_factor(percent);
        self.inner.store.set_volume(lane, factor).await?;
        self.inner.cache.put_volume(lane, factor).await;

        self.inner.broadcast(LaneEvent::VolumeChanged {
            lane: lane.clone(),
            percent,
            timestamp: Utc::now(),
        });
        info!(lane = %lane, percent = percent, "Volume changed");
        Ok(())
    }

    /// Now-playing, queue (with any backfilled metadata) and flags
    pub async fn get_snapshot(&self, lane: &LaneKey) -> Result<LaneSnapshot> {
        let store = &self.inner.store;

        let mut tracks = store.snapshot(lane).await?;
        for track in tracks.iter_mut() {
            if let Some(cached) = store.lookup_metadata(lane, &track.url).await? {
                *track = cached;
            }
        }

        Ok(LaneSnapshot {
            now_playing: store.get_now_playing(lane).await?,
            tracks,
            is_playing: store.is_playing(lane).await?,
            is_paused: store.is_paused(lane).await?,
            volume_percent: factor_to_percent(store.get_volume(lane).await?),
        })
    }
}
