//! Streaming one track into a voice sink
//!
//! Reads fixed-size PCM frames from the pipeline, applies the lane volume
//! and hands frames to an encode-and-forward task. Pausing simply stops
//! reading, so the subprocesses block on their pipes and playback resumes
//! at the next unread frame.

use super::pipeline::TranscodePipeline;
use super::volume::{apply_volume, samples_from_le_bytes};
use super::{FrameEncoder, FRAME_BYTES};
use crate::config::{MediaConfig, TimingConfig};
use crate::error::{Error, Result};
use crate::events::TrackOutcome;
use crate::playback::{LaneCache, TrackSupervisor};
use crate::validation::is_accepted_media_url;
use crate::voice::VoiceSink;
use lanecast_common::{LaneKey, QueueStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Frames queued between the read loop and the encoder
const FORWARD_QUEUE_FRAMES: usize = 2;

/// Everything one streaming run needs
pub struct StreamContext<'a> {
    pub lane: &'a LaneKey,
    pub url: &'a str,
    pub media: &'a MediaConfig,
    pub timing: &'a TimingConfig,
    pub sink: Arc<dyn VoiceSink>,
    pub supervisor: &'a TrackSupervisor,
    pub store: &'a dyn QueueStore,
    pub cache: &'a LaneCache,
}

/// Stream `ctx.url` until it ends, is cancelled, or hits the ceiling.
///
/// Errors are returned only for failures before streaming starts (URL
/// rejected, spawn failure). Problems mid-stream end the track with
/// [`TrackOutcome::Failed`]. Subprocesses are reaped and the speaking flag
/// cleared on every path after spawn.
pub async fn stream_track(ctx: StreamContext<'_>) -> Result<TrackOutcome> {
    if !is_accepted_media_url(ctx.url) {
        return Err(Error::Validation(format!("unsupported media URL: {}", ctx.url)));
    }

    if ctx.supervisor.is_cancelled() {
        debug!(lane = %ctx.lane, url = ctx.url, "Cancelled before start");
        return Ok(TrackOutcome::Cancelled);
    }

    let mut pipeline = TranscodePipeline::spawn(ctx.url, ctx.media)?;
    let started = Instant::now();
    debug!(lane = %ctx.lane, url = ctx.url, "Pipeline started");

    tokio::select! {
        _ = ctx.supervisor.cancelled() => {}
        _ = sleep(ctx.timing.sink_warmup()) => {}
    }
    if let Err(e) = ctx.sink.set_speaking(true).await {
        warn!(lane = %ctx.lane, error = %e, "Could not set speaking");
    }

    let (frame_tx, frame_rx) = mpsc::channel::<Vec<i16>>(FORWARD_QUEUE_FRAMES);
    let forwarder = tokio::spawn(forward_frames(
        frame_rx,
        ctx.sink.frame_encoder(),
        ctx.sink.frame_sender(),
    ));

    let ceiling = sleep(ctx.timing.pipeline_ceiling());
    tokio::pin!(ceiling);

    let mut frame = vec![0u8; FRAME_BYTES];
    let mut next_refresh = Instant::now() + ctx.timing.state_refresh();

    let outcome = loop {
        if ctx.supervisor.is_cancelled() {
            break TrackOutcome::Cancelled;
        }

        if Instant::now() >= next_refresh {
            next_refresh = Instant::now() + ctx.timing.state_refresh();
            if !refresh_from_store(&ctx).await {
                ctx.supervisor.cancel();
                break TrackOutcome::Cancelled;
            }
        }

        if ctx.supervisor.is_paused() {
            tokio::select! {
                _ = ctx.supervisor.cancelled() => break TrackOutcome::Cancelled,
                _ = &mut ceiling => break TrackOutcome::TimedOut,
                _ = sleep(ctx.timing.pause_poll()) => continue,
            }
        }

        let read = tokio::select! {
            biased;
            _ = ctx.supervisor.cancelled() => break TrackOutcome::Cancelled,
            _ = &mut ceiling => break TrackOutcome::TimedOut,
            read = pipeline.read_frame(&mut frame) => read,
        };

        match read {
            Ok(true) => {}
            Ok(false) => {
                if pipeline.bytes_read() > 0 {
                    break TrackOutcome::Completed;
                }
                debug!(lane = %ctx.lane, "No audio received, holding for minimum playback");
                tokio::select! {
                    _ = ctx.supervisor.cancelled() => break TrackOutcome::Cancelled,
                    _ = pipeline.wait_for_fetch(started + ctx.timing.min_playback_grace()) => {}
                }
                warn!(lane = %ctx.lane, url = ctx.url, "Source produced no audio");
                break TrackOutcome::Failed;
            }
            Err(e) => {
                warn!(lane = %ctx.lane, error = %e, "Stream read failed");
                break TrackOutcome::Failed;
            }
        }

        let mut samples = samples_from_le_bytes(&frame);
        let factor = ctx.cache.volume(ctx.store, ctx.lane).await;
        apply_volume(&mut samples, factor);

        if !ctx.sink.is_ready() {
            warn!(lane = %ctx.lane, "Voice sink not ready, ending track");
            break TrackOutcome::Failed;
        }

        tokio::select! {
            biased;
            _ = ctx.supervisor.cancelled() => break TrackOutcome::Cancelled,
            _ = &mut ceiling => break TrackOutcome::TimedOut,
            sent = frame_tx.send(samples) => {
                if sent.is_err() {
                    warn!(lane = %ctx.lane, "Frame forwarder stopped, ending track");
                    break TrackOutcome::Failed;
                }
            }
        }
    };

    drop(frame_tx);
    if outcome == TrackOutcome::Completed {
        // let the last queued frames reach the sink
        if timeout(ctx.timing.process_reap(), forwarder).await.is_err() {
            debug!(lane = %ctx.lane, "Forwarder did not drain in time");
        }
    } else {
        forwarder.abort();
    }

    if outcome == TrackOutcome::TimedOut {
        warn!(lane = %ctx.lane, url = ctx.url, "Pipeline ceiling reached, terminating");
    }

    pipeline.shutdown(ctx.timing.process_reap()).await;

    if let Err(e) = ctx.sink.set_speaking(false).await {
        debug!(lane = %ctx.lane, error = %e, "Could not clear speaking");
    }

    info!(
        lane = %ctx.lane,
        url = ctx.url,
        outcome = ?outcome,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Track stream ended"
    );
    Ok(outcome)
}

/// Pull state written by other processes into the supervisor.
///
/// Returns false when the lane was stopped in the store while this track
/// was streaming.
async fn refresh_from_store(ctx: &StreamContext<'_>) -> bool {
    match ctx.store.is_playing(ctx.lane).await {
        Ok(false) => {
            info!(lane = %ctx.lane, url = ctx.url, "Lane stopped elsewhere, ending track");
            return false;
        }
        Ok(true) => {}
        Err(e) => debug!(lane = %ctx.lane, error = %e, "Playing refresh failed"),
    }

    match ctx.store.is_paused(ctx.lane).await {
        Ok(paused) => ctx.supervisor.set_paused(paused),
        Err(e) => debug!(lane = %ctx.lane, error = %e, "Pause refresh failed"),
    }
    true
}

/// Encode frames and push them to the sink until either side closes
async fn forward_frames(
    mut frames: mpsc::Receiver<Vec<i16>>,
    mut encoder: Box<dyn FrameEncoder>,
    sink: mpsc::Sender<Vec<u8>>,
) -> u64 {
    let mut forwarded = 0;
    while let Some(pcm) = frames.recv().await {
        let packet = match encoder.encode(&pcm) {
            Ok(packet) => packet,
            Err(e) => {
                warn!(error = %e, "Frame encode failed");
                break;
            }
        };
        if sink.send(packet).await.is_err() {
            debug!("Sink channel closed");
            break;
        }
        forwarded += 1;
    }
    forwarded
}
