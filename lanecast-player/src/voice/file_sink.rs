//! Local voice platform that writes encoded frames to a file
//!
//! Used by the `lanecast play` command to drive the full pipeline without a
//! chat platform session. One output file per guild session.

use super::{VoicePlatform, VoiceSink};
use crate::audio::{FrameEncoder, PcmFrameEncoder};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Frames buffered between the stream and the file writer
const SINK_QUEUE_FRAMES: usize = 2;

/// [`VoiceSink`] backed by a raw PCM file
pub struct FileSink {
    path: PathBuf,
    tx: mpsc::Sender<Vec<u8>>,
    ready: Arc<AtomicBool>,
    frames_written: Arc<AtomicU64>,
}

impl FileSink {
    /// Create (truncating) the output file and start the writer task
    pub async fn create(path: PathBuf) -> Result<Self> {
        let mut file = File::create(&path).await?;
        let (tx, mut rx) = mpsc::channel::<Vec<u8>>(SINK_QUEUE_FRAMES);
        let ready = Arc::new(AtomicBool::new(true));
        let frames_written = Arc::new(AtomicU64::new(0));

        let writer_ready = Arc::clone(&ready);
        let writer_count = Arc::clone(&frames_written);
        let writer_path = path.clone();
        tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                let written = match file.write_all(&frame).await {
                    Ok(()) => file.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    warn!(path = %writer_path.display(), error = %e, "Frame write failed");
                    writer_ready.store(false, Ordering::SeqCst);
                    break;
                }
                writer_count.fetch_add(1, Ordering::Relaxed);
            }
        });

        info!("Writing voice output to {}", path.display());
        Ok(Self {
            path,
            tx,
            ready,
            frames_written,
        })
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl VoiceSink for FileSink {
    async fn set_speaking(&self, speaking: bool) -> Result<()> {
        debug!(path = %self.path.display(), speaking = speaking, "Speaking state");
        Ok(())
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn frame_sender(&self) -> mpsc::Sender<Vec<u8>> {
        self.tx.clone()
    }

    fn frame_encoder(&self) -> Box<dyn FrameEncoder> {
        Box::new(PcmFrameEncoder)
    }

    async fn disconnect(&self) -> Result<()> {
        // The writer task ends when the last sender clone is dropped
        self.ready.store(false, Ordering::SeqCst);
        info!(
            "Closed voice output {} ({} frames)",
            self.path.display(),
            self.frames_written()
        );
        Ok(())
    }
}

/// [`VoicePlatform`] whose sessions are [`FileSink`]s under one directory
pub struct FilePlatform {
    output_dir: PathBuf,
    sessions: Mutex<HashMap<String, Arc<FileSink>>>,
}

impl FilePlatform {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Session for a guild, including ones already disconnected
    pub async fn session(&self, guild_id: &str) -> Option<Arc<FileSink>> {
        self.sessions.lock().await.get(guild_id).cloned()
    }
}

#[async_trait]
impl VoicePlatform for FilePlatform {
    async fn connection(&self, guild_id: &str) -> Option<Arc<dyn VoiceSink>> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(guild_id)
            .filter(|sink| sink.is_ready())
            .map(|sink| Arc::clone(sink) as Arc<dyn VoiceSink>)
    }

    async fn user_voice_channel(&self, _guild_id: &str, _user_id: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn join(&self, guild_id: &str, channel_id: &str) -> Result<Arc<dyn VoiceSink>> {
        let path = self
            .output_dir
            .join(format!("{}-{}.pcm", guild_id, channel_id));
        let sink = Arc::new(FileSink::create(path).await?);
        self.sessions
            .lock()
            .await
            .insert(guild_id.to_string(), Arc::clone(&sink));
        Ok(sink)
    }
}
