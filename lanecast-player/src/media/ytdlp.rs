//! yt-dlp backed search and metadata

use super::MediaResolver;
use crate::error::{Error, Result};
use crate::validation::is_accepted_media_url;
use async_trait::async_trait;
use lanecast_common::track::TrackMetadata;
use serde::Deserialize;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

/// Subset of `--dump-json` output we read
#[derive(Debug, Default, Deserialize)]
struct DumpJson {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    thumbnail: Option<String>,
}

impl DumpJson {
    fn into_metadata(self) -> TrackMetadata {
        let artist = [self.artist, self.channel, self.uploader]
            .into_iter()
            .flatten()
            .map(|s| s.trim().to_string())
            .find(|s| !s.is_empty())
            .unwrap_or_default();

        let duration_seconds = self
            .duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .map(|d| d.round().min(u32::MAX as f64) as u32)
            .unwrap_or(0);

        TrackMetadata {
            title: self.title.unwrap_or_default().trim().to_string(),
            artist,
            duration_seconds,
            thumbnail: self.thumbnail.unwrap_or_default().trim().to_string(),
        }
    }
}

/// First non-empty stdout line, if it is a playable URL
fn first_playable_line(stdout: &str) -> Option<String> {
    let line = stdout.trim().lines().next()?.trim();
    if line.is_empty() || !is_accepted_media_url(line) {
        return None;
    }
    Some(line.to_string())
}

/// [`MediaResolver`] that shells out to yt-dlp
#[derive(Debug, Clone)]
pub struct YtDlpResolver {
    program: String,
}

impl YtDlpResolver {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| Error::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Stream(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for YtDlpResolver {
    fn default() -> Self {
        Self::new("yt-dlp")
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn search_best_match(&self, query: &str) -> Result<Option<String>> {
        let target = format!("ytsearch1:{}", query);
        let stdout = self
            .run(&["--flat-playlist", "--get-url", &target])
            .await?;

        let found = first_playable_line(&stdout);
        match &found {
            Some(url) => debug!(query = query, url = %url, "Search resolved"),
            None => warn!(query = query, "Search returned no playable result"),
        }
        Ok(found)
    }

    async fn fetch_metadata(&self, url: &str) -> Result<TrackMetadata> {
        let stdout = self.run(&["--dump-json", "--no-playlist", url]).await?;
        let raw: DumpJson = serde_json::from_str(stdout.trim())
            .map_err(|e| Error::Stream(format!("Unreadable metadata for {}: {}", url, e)))?;
        Ok(raw.into_metadata())
    }
}
