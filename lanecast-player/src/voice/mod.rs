//! Voice sessions
//!
//! The chat platform is reached only through [`VoicePlatform`] and the
//! [`VoiceSink`] it hands out. [`VoiceConnectionManager`] decides which room
//! to join for a lane and caches who is sitting in which room.

mod file_sink;

pub use file_sink::{FilePlatform, FileSink};

use crate::audio::FrameEncoder;
use crate::error::{Error, Result};
use async_trait::async_trait;
use lanecast_common::LaneKey;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

/// Outbound audio endpoint of a joined voice room
#[async_trait]
pub trait VoiceSink: Send + Sync {
    /// Toggle the speaking indicator
    async fn set_speaking(&self, speaking: bool) -> Result<()>;

    /// True while the session can accept frames
    fn is_ready(&self) -> bool;

    /// Channel for encoded frames, in sink format
    fn frame_sender(&self) -> mpsc::Sender<Vec<u8>>;

    /// Encoder producing this sink's wire format
    fn frame_encoder(&self) -> Box<dyn FrameEncoder>;

    async fn disconnect(&self) -> Result<()>;
}

/// Chat platform voice operations
#[async_trait]
pub trait VoicePlatform: Send + Sync {
    /// Existing voice session in the guild, if any
    async fn connection(&self, guild_id: &str) -> Option<Arc<dyn VoiceSink>>;

    /// Room a user currently sits in, according to the platform
    async fn user_voice_channel(&self, guild_id: &str, user_id: &str) -> Result<Option<String>>;

    async fn join(&self, guild_id: &str, channel_id: &str) -> Result<Arc<dyn VoiceSink>>;
}

/// guild -> user -> voice channel
type PresenceMap = HashMap<String, HashMap<String, String>>;

/// Resolves and creates voice sessions for lanes
pub struct VoiceConnectionManager {
    platform: Arc<dyn VoicePlatform>,
    presence: RwLock<PresenceMap>,
}

impl VoiceConnectionManager {
    pub fn new(platform: Arc<dyn VoicePlatform>) -> Self {
        Self {
            platform,
            presence: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get_connection(&self, lane: &LaneKey) -> Option<Arc<dyn VoiceSink>> {
        self.platform.connection(lane.guild_id()).await
    }

    pub async fn is_connected(&self, lane: &LaneKey) -> bool {
        match self.get_connection(lane).await {
            Some(sink) => sink.is_ready(),
            None => false,
        }
    }

    /// Join a room for the lane.
    ///
    /// Room choice: the requester's cached presence, then the platform's view
    /// of the requester, then the lane's own room.
    pub async fn join_room(
        &self,
        lane: &LaneKey,
        requester_id: Option<&str>,
    ) -> Result<Arc<dyn VoiceSink>> {
        let channel = self.target_channel(lane, requester_id).await;
        if channel.is_empty() {
            return Err(Error::Voice(format!("no voice room found for lane {}", lane)));
        }

        info!(lane = %lane, channel = %channel, "Joining voice room");
        self.platform
            .join(lane.guild_id(), &channel)
            .await
            .map_err(|e| match e {
                Error::Voice(_) => e,
                other => Error::Voice(format!("join failed: {}", other)),
            })
    }

    async fn target_channel(&self, lane: &LaneKey, requester_id: Option<&str>) -> String {
        if let Some(user) = requester_id.filter(|u| !u.is_empty()) {
            if let Some(channel) = self.cached_channel(lane.guild_id(), user).await {
                return channel;
            }

            match self.platform.user_voice_channel(lane.guild_id(), user).await {
                Ok(Some(channel)) if !channel.is_empty() => return channel,
                Ok(_) => {}
                Err(e) => debug!(lane = %lane, user = user, error = %e, "Voice state lookup failed"),
            }
        }

        lane.channel_id().to_string()
    }

    async fn cached_channel(&self, guild_id: &str, user_id: &str) -> Option<String> {
        self.presence
            .read()
            .await
            .get(guild_id)
            .and_then(|users| users.get(user_id))
            .cloned()
    }

    /// Record a voice state update; `None` means the user left voice
    pub async fn record_voice_state(&self, guild_id: &str, user_id: &str, channel_id: Option<&str>) {
        let mut presence = self.presence.write().await;
        match channel_id.filter(|c| !c.is_empty()) {
            Some(channel) => {
                presence
                    .entry(guild_id.to_string())
                    .or_default()
                    .insert(user_id.to_string(), channel.to_string());
            }
            None => {
                if let Some(users) = presence.get_mut(guild_id) {
                    users.remove(user_id);
                    if users.is_empty() {
                        presence.remove(guild_id);
                    }
                }
            }
        }
    }

    /// Users cached in a guild, for diagnostics
    pub async fn cached_user_count(&self, guild_id: &str) -> usize {
        self.presence
            .read()
            .await
            .get(guild_id)
            .map_or(0, |users| users.len())
    }
}
