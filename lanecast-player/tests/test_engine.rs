//! Test harness around [`Engine`]
//!
//! Real SQLite store (in memory unless a pool is passed in), real subprocess
//! pipeline with shell stand-ins for the fetch and decode tools, and the
//! file-backed voice platform, optionally slowed down. Only media lookup is
//! faked.

#![allow(dead_code)]

use async_trait::async_trait;
use lanecast_common::db::init_memory_database;
use lanecast_common::track::TrackMetadata;
use lanecast_common::{LaneKey, SqliteQueueStore};
use lanecast_player::audio::FrameEncoder;
use lanecast_player::config::{MediaConfig, PlayerConfig, TimingConfig};
use lanecast_player::media::MediaResolver;
use lanecast_player::voice::{FilePlatform, VoiceConnectionManager, VoicePlatform, VoiceSink};
use lanecast_player::{Engine, LaneEvent, Result, TrackOutcome};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{broadcast, mpsc};

pub const GUILD: &str = "111111111111111111";
pub const CHANNEL: &str = "222222222222222222";

pub const URL_A: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";
pub const URL_B: &str = "https://www.youtube.com/watch?v=9bZkp7q19f0";
/// Short link for [`URL_B`]; queued under the canonical form
pub const URL_B_SHORT: &str = "https://youtu.be/9bZkp7q19f0";

/// Frames emitted by [`short_track`]
pub const SHORT_TRACK_FRAMES: u64 = 10;

/// 3840-byte frames, matching 20 ms of 48 kHz stereo s16le
pub const FRAME_BYTES: usize = 3840;

pub fn lane() -> LaneKey {
    LaneKey::new(GUILD, CHANNEL).unwrap()
}

/// Source that ends after [`SHORT_TRACK_FRAMES`] frames of silence
pub fn short_track() -> MediaConfig {
    stand_in(format!(
        "head -c {} /dev/zero",
        FRAME_BYTES * SHORT_TRACK_FRAMES as usize
    ))
}

/// Source that emits one frame every 20 ms until killed
pub fn endless_track() -> MediaConfig {
    stand_in(format!(
        "while :; do head -c {} /dev/zero; sleep 0.02; done",
        FRAME_BYTES
    ))
}

/// Like [`endless_track`], but every frame is random bytes
pub fn noise_track() -> MediaConfig {
    stand_in(format!(
        "while :; do head -c {} /dev/urandom; sleep 0.02; done",
        FRAME_BYTES
    ))
}

/// Source that exits without producing any audio
pub fn silent_track() -> MediaConfig {
    stand_in("exit 0".to_string())
}

fn stand_in(script: String) -> MediaConfig {
    MediaConfig {
        yt_dlp_path: "sh".to_string(),
        fetch_args: vec!["-c".to_string(), script],
        ffmpeg_path: "cat".to_string(),
        decode_args: Vec::new(),
        ..MediaConfig::default()
    }
}

pub fn fast_timing() -> TimingConfig {
    TimingConfig {
        min_playback_grace_ms: 200,
        pipeline_ceiling_secs: 30,
        drain_cooldown_ms: 200,
        stop_grace_ms: 50,
        sink_warmup_ms: 0,
        process_reap_ms: 500,
        pause_poll_ms: 20,
        state_refresh_ms: 100,
    }
}

/// Search returns [`URL_B_SHORT`] unless the query mentions "nothing";
/// metadata titles are derived from the URL
pub struct FakeResolver;

#[async_trait]
impl MediaResolver for FakeResolver {
    async fn search_best_match(&self, query: &str) -> Result<Option<String>> {
        if query.contains("nothing") {
            Ok(None)
        } else {
            Ok(Some(URL_B_SHORT.to_string()))
        }
    }

    async fn fetch_metadata(&self, url: &str) -> Result<TrackMetadata> {
        let title = if url == URL_A { "Track A" } else { "Track B" };
        Ok(TrackMetadata {
            title: title.to_string(),
            artist: "Test Artist".to_string(),
            duration_seconds: 1,
            thumbnail: String::new(),
        })
    }
}

/// Extra latency on voice platform calls
#[derive(Debug, Clone, Copy, Default)]
pub struct VoiceDelays {
    pub join: Duration,
    pub disconnect: Duration,
}

/// [`FilePlatform`] behind artificial join and disconnect latency
pub struct SlowPlatform {
    inner: Arc<FilePlatform>,
    delays: VoiceDelays,
}

impl SlowPlatform {
    fn wrap(&self, sink: Arc<dyn VoiceSink>) -> Arc<dyn VoiceSink> {
        Arc::new(SlowSink {
            inner: sink,
            disconnect_delay: self.delays.disconnect,
        })
    }
}

#[async_trait]
impl VoicePlatform for SlowPlatform {
    async fn connection(&self, guild_id: &str) -> Option<Arc<dyn VoiceSink>> {
        self.inner
            .connection(guild_id)
            .await
            .map(|sink| self.wrap(sink))
    }

    async fn user_voice_channel(&self, guild_id: &str, user_id: &str) -> Result<Option<String>> {
        self.inner.user_voice_channel(guild_id, user_id).await
    }

    async fn join(&self, guild_id: &str, channel_id: &str) -> Result<Arc<dyn VoiceSink>> {
        tokio::time::sleep(self.delays.join).await;
        let sink = self.inner.join(guild_id, channel_id).await?;
        Ok(self.wrap(sink))
    }
}

struct SlowSink {
    inner: Arc<dyn VoiceSink>,
    disconnect_delay: Duration,
}

#[async_trait]
impl VoiceSink for SlowSink {
    async fn set_speaking(&self, speaking: bool) -> Result<()> {
        self.inner.set_speaking(speaking).await
    }

    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    fn frame_sender(&self) -> mpsc::Sender<Vec<u8>> {
        self.inner.frame_sender()
    }

    fn frame_encoder(&self) -> Box<dyn FrameEncoder> {
        self.inner.frame_encoder()
    }

    async fn disconnect(&self) -> Result<()> {
        tokio::time::sleep(self.disconnect_delay).await;
        self.inner.disconnect().await
    }
}

pub struct TestEngine {
    pub engine: Engine,
    pub platform: Arc<FilePlatform>,
    pub db: SqlitePool,
    pub events: broadcast::Receiver<LaneEvent>,
    _output: TempDir,
}

impl TestEngine {
    pub async fn new(media: MediaConfig) -> Self {
        Self::with_timing(media, fast_timing()).await
    }

    pub async fn with_timing(media: MediaConfig, timing: TimingConfig) -> Self {
        let db = init_memory_database().await.unwrap();
        Self::build(media, timing, db, VoiceDelays::default())
    }

    /// Engine over an existing pool, as a second process would open it
    pub async fn on_database(media: MediaConfig, db: SqlitePool) -> Self {
        Self::build(media, fast_timing(), db, VoiceDelays::default())
    }

    pub async fn with_voice_delays(media: MediaConfig, delays: VoiceDelays) -> Self {
        let db = init_memory_database().await.unwrap();
        Self::build(media, fast_timing(), db, delays)
    }

    pub fn build(
        media: MediaConfig,
        timing: TimingConfig,
        db: SqlitePool,
        delays: VoiceDelays,
    ) -> Self {
        let store = Arc::new(SqliteQueueStore::new(db.clone()));
        let output = TempDir::new().unwrap();
        let platform = Arc::new(FilePlatform::new(output.path()));
        let slow = Arc::new(SlowPlatform {
            inner: platform.clone(),
            delays,
        });
        let voice = Arc::new(VoiceConnectionManager::new(slow));

        let config = PlayerConfig {
            media,
            timing,
            ..PlayerConfig::default()
        };

        let engine =
            Engine::new(store, voice, Arc::new(FakeResolver), config).with_history(db.clone());
        let events = engine.subscribe_events();

        Self {
            engine,
            platform,
            db,
            events,
            _output: output,
        }
    }

    /// Frames written to the guild's output so far
    pub async fn frames_written(&self) -> u64 {
        match self.platform.session(GUILD).await {
            Some(sink) => sink.frames_written(),
            None => 0,
        }
    }

    /// Next event for the test lane matching `pred`, skipping others
    pub async fn wait_for<F>(&mut self, mut pred: F) -> LaneEvent
    where
        F: FnMut(&LaneEvent) -> bool,
    {
        let lane = lane();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                match self.events.recv().await {
                    Ok(event) if event.lane() == &lane && pred(&event) => return event,
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
                }
            }
        })
        .await
        .expect("timed out waiting for lane event")
    }

    pub async fn wait_started(&mut self, url: &str) -> LaneEvent {
        let url = url.to_string();
        self.wait_for(|e| matches!(e, LaneEvent::TrackStarted { track, .. } if track.url == url))
            .await
    }

    /// Outcome of the next finished track
    pub async fn wait_finished(&mut self) -> (String, TrackOutcome) {
        match self
            .wait_for(|e| matches!(e, LaneEvent::TrackFinished { .. }))
            .await
        {
            LaneEvent::TrackFinished { url, outcome, .. } => (url, outcome),
            other => panic!("unexpected event {:?}", other),
        }
    }

    pub async fn wait_drained(&mut self) {
        self.wait_for(|e| matches!(e, LaneEvent::QueueDrained { .. }))
            .await;
    }
}
