//! Error types for lanecast-player
//!
//! Validation failures are raised before any state is touched. Everything
//! else is either an upstream failure (store, subprocess spawn, voice join)
//! or a per-track stream failure that ends only the current track.

use thiserror::Error;

/// Main error type for the player
#[derive(Error, Debug)]
pub enum Error {
    /// Rejected request: bad URL, bad search query, bad lane id,
    /// out-of-range volume or position
    #[error("Validation error: {0}")]
    Validation(String),

    /// Durable store failure
    #[error("Store error: {0}")]
    Store(#[from] lanecast_common::Error),

    /// External process could not be started
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Voice session could not be found or joined
    #[error("Voice error: {0}")]
    Voice(String),

    /// Stream ended abnormally (read failure, non-zero exit, sink gone)
    #[error("Stream error: {0}")]
    Stream(String),

    /// Operation needs an active track but the lane is idle
    #[error("Nothing is playing")]
    NotPlaying,

    /// Configuration file loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors raised before any mutation
    pub fn is_validation(&self) -> bool {
        match self {
            Error::Validation(_) => true,
            Error::Store(lanecast_common::Error::InvalidInput(_)) => true,
            Error::Store(lanecast_common::Error::IndexOutOfRange { .. }) => true,
            _ => false,
        }
    }
}

/// Convenience Result type using the player Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        assert!(Error::Validation("bad url".into()).is_validation());
        assert!(Error::Store(lanecast_common::Error::IndexOutOfRange { index: 3, len: 1 })
            .is_validation());
        assert!(!Error::NotPlaying.is_validation());
        assert!(!Error::Stream("eof".into()).is_validation());
    }
}
