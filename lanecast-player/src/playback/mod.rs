//! Playback engine
//!
//! [`Engine`] is the control surface (add, remove, pause, skip, stop,
//! volume, snapshot). Each non-idle lane gets one worker task that dequeues
//! tracks and streams them until the queue drains.

pub mod control;
pub mod handles;
pub mod processor;
pub mod supervisor;

pub use control::{AddTrackRequest, AddedTrack, Engine, LaneSnapshot, TrackSource};
pub use handles::{HandleTable, LaneCache};
pub use processor::WorkerRegistry;
pub use supervisor::TrackSupervisor;
