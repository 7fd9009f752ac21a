//! # Lanecast Player Library
//!
//! Voice-audio queue and streaming engine. For every (guild, voice room)
//! lane it keeps a durable queue, runs at most one audio pipeline per
//! process, and exposes pause/resume/skip/stop/volume controls that stay
//! consistent with other processes sharing the same store.
//!
//! **Architecture:** per-lane worker tasks driving a yt-dlp → ffmpeg
//! subprocess pipeline whose PCM output is volume-scaled, encoded and
//! forwarded to a [`voice::VoiceSink`].

pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod media;
pub mod playback;
pub mod validation;
pub mod voice;

pub use error::{Error, Result};
pub use events::{LaneEvent, TrackOutcome};
pub use playback::{AddTrackRequest, Engine, LaneSnapshot};
