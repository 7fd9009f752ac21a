//! Lane events
//!
//! Broadcast by the engine so the command layer can announce what is playing
//! without the engine knowing how replies are delivered.

use chrono::{DateTime, Utc};
use lanecast_common::{LaneKey, TrackEntry};
use serde::{Deserialize, Serialize};

/// How a track left the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackOutcome {
    /// Source ran to its end
    Completed,
    /// Cancelled by skip or stop
    Cancelled,
    /// Pipeline ceiling reached
    TimedOut,
    /// Spawn, read or sink failure
    Failed,
}

/// Lane event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LaneEvent {
    /// A track was dequeued and is about to stream
    TrackStarted {
        lane: LaneKey,
        track: TrackEntry,
        /// Entries still queued behind this one
        remaining: usize,
        timestamp: DateTime<Utc>,
    },

    TrackFinished {
        lane: LaneKey,
        url: String,
        outcome: TrackOutcome,
        timestamp: DateTime<Utc>,
    },

    /// Queue ran dry; the worker is leaving the room
    QueueDrained {
        lane: LaneKey,
        timestamp: DateTime<Utc>,
    },

    PauseChanged {
        lane: LaneKey,
        paused: bool,
        timestamp: DateTime<Utc>,
    },

    VolumeChanged {
        lane: LaneKey,
        percent: u32,
        timestamp: DateTime<Utc>,
    },

    /// Lane stopped and cleared on request
    Stopped {
        lane: LaneKey,
        timestamp: DateTime<Utc>,
    },
}

impl LaneEvent {
    pub fn lane(&self) -> &LaneKey {
        match self {
            LaneEvent::TrackStarted { lane, .. }
            | LaneEvent::TrackFinished { lane, .. }
            | LaneEvent::QueueDrained { lane, .. }
            | LaneEvent::PauseChanged { lane, .. }
            | LaneEvent::VolumeChanged { lane, .. }
            | LaneEvent::Stopped { lane, .. } => lane,
        }
    }

    /// Get event type as string, as used in the serialized `type` tag
    pub fn event_type(&self) -> &'static str {
        match self {
            LaneEvent::TrackStarted { .. } => "TrackStarted",
            LaneEvent::TrackFinished { .. } => "TrackFinished",
            LaneEvent::QueueDrained { .. } => "QueueDrained",
            LaneEvent::PauseChanged { .. } => "PauseChanged",
            LaneEvent::VolumeChanged { .. } => "VolumeChanged",
            LaneEvent::Stopped { .. } => "Stopped",
        }
    }
}
