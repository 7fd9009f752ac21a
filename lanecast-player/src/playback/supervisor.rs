//! Per-track control handle
//!
//! Created fresh for every track. The streaming loop observes it; control
//! operations (skip, stop, pause) write to it from other tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Cancellation token plus latest pause state for one streaming track
#[derive(Debug, Clone)]
pub struct TrackSupervisor {
    token: CancellationToken,
    paused: Arc<AtomicBool>,
}

impl TrackSupervisor {
    pub fn new(paused: bool) -> Self {
        Self {
            token: CancellationToken::new(),
            paused: Arc::new(AtomicBool::new(paused)),
        }
    }

    /// End the track; idempotent
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    /// Latest-wins; the stream loop reads the current value each iteration
    pub fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    /// True when both handles control the same track
    pub fn same_track(&self, other: &TrackSupervisor) -> bool {
        Arc::ptr_eq(&self.paused, &other.paused)
    }
}
