//! Audio path: subprocess transcoding, volume scaling, frame encoding and
//! sink forwarding.
//!
//! **Format:** signed 16-bit little-endian PCM, 48 kHz, stereo interleaved
//! (`[L, R, L, R, ...]`), cut into 20 ms frames.

pub mod encoder;
pub mod pipeline;
pub mod stream;
pub mod volume;

pub use encoder::{FrameEncoder, PcmFrameEncoder};
pub use pipeline::TranscodePipeline;
pub use stream::{stream_track, StreamContext};

/// Output channel count
pub const CHANNELS: usize = 2;

/// Output sample rate in Hz
pub const SAMPLE_RATE: u32 = 48_000;

/// Samples per channel in one frame (20 ms at 48 kHz)
pub const FRAME_SIZE: usize = 960;

/// Interleaved samples in one frame
pub const FRAME_SAMPLES: usize = FRAME_SIZE * CHANNELS;

/// Bytes in one s16le frame
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;
