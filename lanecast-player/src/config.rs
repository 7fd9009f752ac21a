//! Player configuration
//!
//! Bootstrap settings loaded from TOML. Every field has a built-in default,
//! so a missing or partial file still produces a usable configuration.
//!
//! ```toml
//! database_path = "/var/lib/lanecast/lanecast.db"
//!
//! [logging]
//! level = "debug"
//!
//! [media]
//! yt_dlp_path = "/usr/local/bin/yt-dlp"
//!
//! [timing]
//! drain_cooldown_ms = 750
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder replaced by the source URL in fetch arguments
pub const URL_PLACEHOLDER: &str = "{url}";

/// Top-level bootstrap configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Shared database; resolved from the root folder when absent
    pub database_path: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub media: MediaConfig,
    pub timing: TimingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,

    /// Log file path (logs to stderr if not specified)
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "lanecast_player=debug,lanecast_common=info".to_string(),
            file: None,
        }
    }
}

/// External media tools
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub yt_dlp_path: String,
    pub ffmpeg_path: String,

    /// Arguments for the fetch stage; `{url}` is substituted
    pub fetch_args: Vec<String>,

    /// Arguments for the decode stage (reads stdin, writes raw PCM)
    pub decode_args: Vec<String>,

    /// Read buffer on the decoder's stdout
    pub read_buffer_bytes: usize,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            ffmpeg_path: "ffmpeg".to_string(),
            fetch_args: ["-f", "bestaudio", "--no-playlist", "-o", "-", URL_PLACEHOLDER]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            decode_args: [
                "-i", "pipe:0", "-f", "s16le", "-ar", "48000", "-ac", "2", "pipe:1",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            read_buffer_bytes: 16384,
        }
    }
}

impl MediaConfig {
    /// Fetch-stage arguments for `url`
    pub fn fetch_args_for(&self, url: &str) -> Vec<String> {
        self.fetch_args
            .iter()
            .map(|arg| arg.replace(URL_PLACEHOLDER, url))
            .collect()
    }
}

/// Playback timing, all in milliseconds unless named otherwise
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// How long a track that produced no audio is kept alive
    pub min_playback_grace_ms: u64,
    /// Hard ceiling on a single pipeline
    pub pipeline_ceiling_secs: u64,
    /// Wait after the queue empties before leaving the voice room
    pub drain_cooldown_ms: u64,
    /// Wait after a stop before disconnecting
    pub stop_grace_ms: u64,
    /// Delay between sink lookup and the first frame
    pub sink_warmup_ms: u64,
    /// Bound on waiting for a killed subprocess
    pub process_reap_ms: u64,
    /// Re-check interval while paused
    pub pause_poll_ms: u64,
    /// How often a streaming track re-reads the playing and pause flags
    pub state_refresh_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            min_playback_grace_ms: 500,
            pipeline_ceiling_secs: 3 * 60 * 60,
            drain_cooldown_ms: 500,
            stop_grace_ms: 500,
            sink_warmup_ms: 100,
            process_reap_ms: 1000,
            pause_poll_ms: 100,
            state_refresh_ms: 1000,
        }
    }
}

impl TimingConfig {
    pub fn min_playback_grace(&self) -> Duration {
        Duration::from_millis(self.min_playback_grace_ms)
    }

    pub fn pipeline_ceiling(&self) -> Duration {
        Duration::from_secs(self.pipeline_ceiling_secs)
    }

    pub fn drain_cooldown(&self) -> Duration {
        Duration::from_millis(self.drain_cooldown_ms)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn sink_warmup(&self) -> Duration {
        Duration::from_millis(self.sink_warmup_ms)
    }

    pub fn process_reap(&self) -> Duration {
        Duration::from_millis(self.process_reap_ms)
    }

    pub fn pause_poll(&self) -> Duration {
        Duration::from_millis(self.pause_poll_ms)
    }

    pub fn state_refresh(&self) -> Duration {
        Duration::from_millis(self.state_refresh_ms)
    }
}

impl PlayerConfig {
    /// Load from a TOML file.
    ///
    /// Returns `None` for a missing file so the caller can fall back to
    /// defaults once logging is up. A file that exists but does not parse is
    /// an error.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Ok(Some(config))
    }

    /// Parse TOML text
    pub fn from_toml(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PlayerConfig::default();
        assert_eq!(config.media.read_buffer_bytes, 16384);
        assert_eq!(config.timing.pipeline_ceiling(), Duration::from_secs(10800));
        assert_eq!(config.timing.pause_poll(), Duration::from_millis(100));
        assert_eq!(config.timing.state_refresh(), Duration::from_secs(1));
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let config = PlayerConfig::from_toml(
            r#"
            [timing]
            drain_cooldown_ms = 50

            [media]
            ffmpeg_path = "/opt/ffmpeg"
            "#,
        )
        .unwrap();

        assert_eq!(config.timing.drain_cooldown(), Duration::from_millis(50));
        assert_eq!(config.timing.stop_grace(), Duration::from_millis(500));
        assert_eq!(config.media.ffmpeg_path, "/opt/ffmpeg");
        assert_eq!(config.media.yt_dlp_path, "yt-dlp");
    }

    #[test]
    fn test_fetch_args_substitute_url() {
        let media = MediaConfig::default();
        let args = media.fetch_args_for("https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(args.last().unwrap(), "https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(args[0], "-f");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let loaded = PlayerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert!(loaded.is_none());
        assert_eq!(loaded.unwrap_or_default().timing.sink_warmup_ms, 100);
    }

    #[test]
    fn test_existing_file_is_loaded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("player.toml");
        std::fs::write(&path, "[timing]\nstop_grace_ms = 5\n").unwrap();
        let config = PlayerConfig::load(&path).unwrap().unwrap();
        assert_eq!(config.timing.stop_grace(), Duration::from_millis(5));
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "timing = [").unwrap();
        assert!(matches!(PlayerConfig::load(&path), Err(Error::Config(_))));
    }
}
