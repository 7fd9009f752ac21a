//! Media lookup collaborators
//!
//! Search and metadata resolution for source URLs. The playback path only
//! needs the [`MediaResolver`] trait; [`YtDlpResolver`] is the production
//! implementation.

mod ytdlp;

pub use ytdlp::YtDlpResolver;

use crate::config::MediaConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use lanecast_common::track::TrackMetadata;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Resolves search queries and metadata for playable URLs
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Best single match for a (validated) search query, `None` when the
    /// search produced nothing playable
    async fn search_best_match(&self, query: &str) -> Result<Option<String>>;

    /// Display metadata for a URL; callers treat failure as non-fatal
    async fn fetch_metadata(&self, url: &str) -> Result<TrackMetadata>;
}

/// Check that a program resolves on PATH
pub async fn tool_available(program: &str) -> bool {
    let result = Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    let available = result.map(|status| status.success()).unwrap_or(false);
    debug!(command = program, available = available, "Tool availability check");
    available
}

/// Fail unless both the fetch and decode tools can be found
pub async fn ensure_tools_available(media: &MediaConfig) -> Result<()> {
    for program in [&media.yt_dlp_path, &media.ffmpeg_path] {
        if !tool_available(program).await {
            return Err(Error::Config(format!("{} not found on PATH", program)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tool_available() {
        assert!(tool_available("sh").await);
        assert!(!tool_available("lanecast-no-such-tool").await);
    }

    #[tokio::test]
    async fn test_missing_tool_is_config_error() {
        let media = MediaConfig {
            yt_dlp_path: "sh".to_string(),
            ffmpeg_path: "lanecast-no-such-tool".to_string(),
            ..MediaConfig::default()
        };
        assert!(matches!(
            ensure_tools_available(&media).await,
            Err(Error::Config(_))
        ));
    }
}
