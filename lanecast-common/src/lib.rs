//! # Lanecast Common Library
//!
//! Shared code for both Lanecast processes (the voice-session holder and the
//! HTTP-facing side), including:
//! - Lane identity and track records
//! - The durable queue store contract and its SQLite implementation
//! - Database initialization
//! - Recently played history
//! - Configuration loading

pub mod config;
pub mod db;
pub mod error;
pub mod history;
pub mod lane;
pub mod store;
pub mod track;

pub use error::{Error, Result};
pub use lane::LaneKey;
pub use store::{QueueStore, SqliteQueueStore};
pub use track::TrackEntry;
