//! Per-lane queue worker
//!
//! Loop: dequeue → stream → dequeue ... until the queue is empty, then
//! drain: clear now-playing, wait out the cool-down, re-check the queue and
//! either keep going or leave the voice room and exit.
//!
//! The [`WorkerRegistry`] keeps this to one worker per lane in this process.
//! Nothing stops another process from starting its own worker for the same
//! lane; the store's atomic pop keeps them from playing the same entry.

use super::control::EngineInner;
use super::supervisor::TrackSupervisor;
use crate::audio::{stream_track, StreamContext};
use crate::error::Result;
use crate::events::{LaneEvent, TrackOutcome};
use chrono::Utc;
use lanecast_common::{LaneKey, TrackEntry};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

/// Lanes that have a live worker in this process
#[derive(Default)]
pub struct WorkerRegistry {
    lanes: Mutex<HashSet<LaneKey>>,
}

impl WorkerRegistry {
    /// Claim the lane; false if a worker already holds it
    pub async fn try_claim(&self, lane: &LaneKey) -> bool {
        self.lanes.lock().await.insert(lane.clone())
    }

    pub async fn release(&self, lane: &LaneKey) {
        self.lanes.lock().await.remove(lane);
    }

    pub async fn is_running(&self, lane: &LaneKey) -> bool {
        self.lanes.lock().await.contains(lane)
    }

    async fn lock(&self) -> MutexGuard<'_, HashSet<LaneKey>> {
        self.lanes.lock().await
    }
}

impl EngineInner {
    /// Spawn a worker for the lane unless one is already running here.
    ///
    /// Returns true when a new worker was started.
    pub(crate) async fn ensure_worker(self: &Arc<Self>, lane: &LaneKey) -> bool {
        if !self.workers.try_claim(lane).await {
            debug!(lane = %lane, "Worker already running");
            return false;
        }

        let inner = Arc::clone(self);
        let lane = lane.clone();
        tokio::spawn(async move {
            inner.run_lane(lane).await;
        });
        true
    }

    async fn run_lane(self: Arc<Self>, lane: LaneKey) {
        info!(lane = %lane, "Lane worker started");

        loop {
            let next = match self.store.pop_next(&lane).await {
                Ok(next) => next,
                Err(e) => {
                    error!(lane = %lane, error = %e, "Dequeue failed, stopping lane worker");
                    if let Err(e) = self.store.set_playing(&lane, false).await {
                        warn!(lane = %lane, error = %e, "Failed to clear playing flag");
                    }
                    self.workers.release(&lane).await;
                    break;
                }
            };

            match next {
                Some(track) => self.play_track(&lane, track).await,
                None => {
                    if !self.drain(&lane).await {
                        break;
                    }
                }
            }
        }

        info!(lane = %lane, "Lane worker exited");
    }

    async fn play_track(&self, lane: &LaneKey, track: TrackEntry) {
        let track = match self.store.lookup_metadata(lane, &track.url).await {
            Ok(Some(cached)) => cached,
            Ok(None) => track,
            Err(e) => {
                debug!(lane = %lane, error = %e, "Metadata lookup failed, using queued entry");
                track
            }
        };

        let paused = match self.store.is_paused(lane).await {
            Ok(paused) => paused,
            Err(e) => {
                warn!(lane = %lane, error = %e, "Pause read failed, starting unpaused");
                false
            }
        };

        // Registered before the lane is marked playing, so a skip or stop
        // issued from here on always finds this track
        let supervisor = TrackSupervisor::new(paused);
        self.handles.register(lane, supervisor.clone()).await;

        // A stop that landed between the dequeue and the registration above
        // only shows up in the store
        if matches!(self.store.is_playing(lane).await, Ok(false)) {
            info!(lane = %lane, url = %track.url, "Lane stopped before track start, dropping it");
            self.handles.deregister(lane, &supervisor).await;
            return;
        }

        if let Err(e) = self.store.set_now_playing(lane, Some(&track)).await {
            warn!(lane = %lane, error = %e, "Failed to set now playing");
        }
        if let Err(e) = self.store.set_playing(lane, true).await {
            warn!(lane = %lane, error = %e, "Failed to set playing flag");
        }

        let remaining = self.store.length(lane).await.unwrap_or(0);
        info!(lane = %lane, title = %track.display_title(), remaining = remaining, "Now playing");
        self.broadcast(LaneEvent::TrackStarted {
            lane: lane.clone(),
            track: track.clone(),
            remaining,
            timestamp: Utc::now(),
        });

        let outcome = match self.stream_to_voice(lane, &track, &supervisor).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(lane = %lane, url = %track.url, error = %e, "Track failed");
                TrackOutcome::Failed
            }
        };
        self.handles.deregister(lane, &supervisor).await;

        self.broadcast(LaneEvent::TrackFinished {
            lane: lane.clone(),
            url: track.url.clone(),
            outcome,
            timestamp: Utc::now(),
        });
    }

    async fn stream_to_voice(
        &self,
        lane: &LaneKey,
        track: &TrackEntry,
        supervisor: &TrackSupervisor,
    ) -> Result<TrackOutcome> {
        let sink = match self.voice.get_connection(lane).await {
            Some(sink) if sink.is_ready() => sink,
            _ => {
                tokio::select! {
                    _ = supervisor.cancelled() => {
                        debug!(lane = %lane, "Cancelled while joining voice");
                        return Ok(TrackOutcome::Cancelled);
                    }
                    joined = self.voice.join_room(lane, Some(&track.requested_by_id)) => joined?,
                }
            }
        };

        stream_track(StreamContext {
            lane,
            url: &track.url,
            media: &self.config.media,
            timing: &self.config.timing,
            sink,
            supervisor,
            store: self.store.as_ref(),
            cache: &self.cache,
        })
        .await
    }

    /// Returns true when the queue refilled before the lane was released
    async fn drain(&self, lane: &LaneKey) -> bool {
        if let Err(e) = self.store.set_now_playing(lane, None).await {
            warn!(lane = %lane, error = %e, "Failed to clear now playing");
        }
        if let Err(e) = self.store.set_playing(lane, false).await {
            warn!(lane = %lane, error = %e, "Failed to clear playing flag");
        }

        tokio::time::sleep(self.config.timing.drain_cooldown()).await;

        if self.refilled(lane).await {
            return true;
        }

        // Still claimed while leaving the room: an add arriving now is
        // picked up by this worker at the re-check below.
        self.leave_voice(lane).await;

        // Held across the final re-check, so an add that races it either
        // lands before the check or starts a fresh worker after removal.
        let mut workers = self.workers.lock().await;
        if self.refilled(lane).await {
            return true;
        }
        workers.remove(lane);
        drop(workers);

        info!(lane = %lane, "Queue drained");
        self.broadcast(LaneEvent::QueueDrained {
            lane: lane.clone(),
            timestamp: Utc::now(),
        });
        false
    }

    /// Re-check the queue after the cool-down; true keeps the worker running
    async fn refilled(&self, lane: &LaneKey) -> bool {
        match self.store.length(lane).await {
            Ok(0) => false,
            Ok(queued) => {
                debug!(lane = %lane, queued = queued, "Queue refilled during drain");
                if let Err(e) = self.store.set_playing(lane, true).await {
                    warn!(lane = %lane, error = %e, "Failed to set playing flag");
                }
                true
            }
            Err(e) => {
                warn!(lane = %lane, error = %e, "Queue re-check failed, draining");
                false
            }
        }
    }

    async fn leave_voice(&self, lane: &LaneKey) {
        if let Some(sink) = self.voice.get_connection(lane).await {
            if let Err(e) = sink.set_speaking(false).await {
                debug!(lane = %lane, error = %e, "Could not clear speaking");
            }
            if let Err(e) = sink.disconnect().await {
                warn!(lane = %lane, error = %e, "Voice disconnect failed");
            }
        }
    }
}
