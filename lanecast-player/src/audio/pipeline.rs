//! Two-stage transcoding pipeline
//!
//! Stage A fetches the source and writes container bytes to stdout; stage B
//! decodes stdin to raw PCM on stdout. A copier task joins the two, and each
//! stage's stderr is drained into the log so neither can block on a full
//! pipe. Both children are spawned with `kill_on_drop`, so dropping the
//! pipeline on any path releases them.

use crate::config::MediaConfig;
use crate::error::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, warn};

/// Running fetch + decode pair for one track
pub struct TranscodePipeline {
    fetch: Child,
    decode: Child,
    reader: BufReader<ChildStdout>,
    copier: Option<JoinHandle<()>>,
    log_drains: Vec<JoinHandle<()>>,
    bytes_read: u64,
}

impl TranscodePipeline {
    /// Start both stages for `url`.
    ///
    /// The URL must already have passed validation.
    pub fn spawn(url: &str, media: &MediaConfig) -> Result<Self> {
        let mut fetch = Command::new(&media.yt_dlp_path)
            .args(media.fetch_args_for(url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: media.yt_dlp_path.clone(),
                source,
            })?;

        let mut decode = Command::new(&media.ffmpeg_path)
            .args(&media.decode_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::Spawn {
                program: media.ffmpeg_path.clone(),
                source,
            })?;

        let mut fetch_out = fetch
            .stdout
            .take()
            .ok_or_else(|| Error::Stream("fetch stage has no stdout".to_string()))?;
        let mut decode_in = decode
            .stdin
            .take()
            .ok_or_else(|| Error::Stream("decode stage has no stdin".to_string()))?;
        let decode_out = decode
            .stdout
            .take()
            .ok_or_else(|| Error::Stream("decode stage has no stdout".to_string()))?;

        let copier = tokio::spawn(async move {
            match tokio::io::copy(&mut fetch_out, &mut decode_in).await {
                Ok(bytes) => debug!(bytes = bytes, "Fetch stage finished"),
                // Broken pipe is the normal result of killing the decoder first
                Err(e) => debug!(error = %e, "Fetch copy ended"),
            }
            // dropping decode_in closes the decoder's stdin
        });

        let mut log_drains = Vec::with_capacity(2);
        if let Some(stderr) = fetch.stderr.take() {
            log_drains.push(drain_stderr(media.yt_dlp_path.clone(), stderr));
        }
        if let Some(stderr) = decode.stderr.take() {
            log_drains.push(drain_stderr(media.ffmpeg_path.clone(), stderr));
        }

        Ok(Self {
            fetch,
            decode,
            reader: BufReader::with_capacity(media.read_buffer_bytes.max(1), decode_out),
            copier: Some(copier),
            log_drains,
            bytes_read: 0,
        })
    }

    /// Fill `frame` completely from the decoder.
    ///
    /// Returns `Ok(false)` at end of stream; a partial trailing frame is
    /// dropped.
    pub async fn read_frame(&mut self, frame: &mut [u8]) -> Result<bool> {
        let mut filled = 0;
        while filled < frame.len() {
            let n = self
                .reader
                .read(&mut frame[filled..])
                .await
                .map_err(|e| Error::Stream(format!("decoder read failed: {}", e)))?;
            if n == 0 {
                if filled > 0 {
                    debug!(bytes = filled, "Dropping partial trailing frame");
                }
                return Ok(false);
            }
            filled += n;
            self.bytes_read += n as u64;
        }
        Ok(true)
    }

    /// PCM bytes delivered so far
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Wait until `deadline` or until the fetch copier ends, whichever is first
    pub async fn wait_for_fetch(&mut self, deadline: Instant) {
        let Some(copier) = self.copier.as_mut() else {
            return;
        };
        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {}
            _ = copier => {
                self.copier = None;
            }
        }
    }

    /// Kill anything still running and reap both children.
    ///
    /// Each wait is bounded by `reap_timeout`.
    pub async fn shutdown(mut self, reap_timeout: Duration) {
        reap("fetch", &mut self.fetch, reap_timeout).await;
        reap("decode", &mut self.decode, reap_timeout).await;

        if let Some(copier) = self.copier.take() {
            copier.abort();
        }
        for drain in self.log_drains.drain(..) {
            drain.abort();
        }
    }
}

async fn reap(stage: &str, child: &mut Child, reap_timeout: Duration) {
    match child.try_wait() {
        Ok(Some(status)) => {
            if !status.success() {
                warn!(stage = stage, status = %status, "Pipeline stage exited with failure");
            }
            return;
        }
        Ok(None) => {}
        Err(e) => {
            warn!(stage = stage, error = %e, "Could not poll pipeline stage");
        }
    }

    if let Err(e) = child.start_kill() {
        debug!(stage = stage, error = %e, "Kill failed (already exited?)");
    }

    match timeout(reap_timeout, child.wait()).await {
        Ok(Ok(status)) => debug!(stage = stage, status = %status, "Pipeline stage reaped"),
        Ok(Err(e)) => warn!(stage = stage, error = %e, "Waiting on pipeline stage failed"),
        Err(_) => warn!(stage = stage, "Pipeline stage did not exit in time"),
    }
}

fn drain_stderr<R>(program: String, stderr: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(program = %program, "{}", line);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::FRAME_BYTES;

    /// Stage A emits `bytes` zero bytes, stage B passes them through
    fn stand_in(bytes: usize) -> MediaConfig {
        MediaConfig {
            yt_dlp_path: "sh".to_string(),
            fetch_args: vec![
                "-c".to_string(),
                format!("head -c {} /dev/zero", bytes),
            ],
            ffmpeg_path: "cat".to_string(),
            decode_args: Vec::new(),
            ..MediaConfig::default()
        }
    }

    #[tokio::test]
    async fn test_reads_whole_frames_then_eof() {
        let media = stand_in(FRAME_BYTES * 3 + 10);
        let mut pipeline = TranscodePipeline::spawn("https://youtu.be/dQw4w9WgXcQ", &media).unwrap();
        let mut frame = vec![0u8; FRAME_BYTES];

        let mut frames = 0;
        while pipeline.read_frame(&mut frame).await.unwrap() {
            frames += 1;
        }

        assert_eq!(frames, 3);
        assert_eq!(pipeline.bytes_read(), (FRAME_BYTES * 3 + 10) as u64);
        pipeline.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn test_shutdown_kills_running_stages() {
        let media = MediaConfig {
            yt_dlp_path: "sh".to_string(),
            fetch_args: vec!["-c".to_string(), "sleep 30".to_string()],
            ffmpeg_path: "cat".to_string(),
            decode_args: Vec::new(),
            ..MediaConfig::default()
        };
        let pipeline = TranscodePipeline::spawn("https://youtu.be/dQw4w9WgXcQ", &media).unwrap();

        let started = std::time::Instant::now();
        pipeline.shutdown(Duration::from_secs(1)).await;
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let media = MediaConfig {
            yt_dlp_path: "lanecast-no-such-tool".to_string(),
            ..MediaConfig::default()
        };
        let result = TranscodePipeline::spawn("https://youtu.be/dQw4w9WgXcQ", &media);
        assert!(matches!(result, Err(Error::Spawn { .. })));
    }
}
