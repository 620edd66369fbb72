//! Shared cache state between the listener task and consumers.
//!
//! A single [`PreviewShared`] sits behind `Arc` on both sides. The
//! listener overwrites; consumers clone out. All accessors take the lock
//! for the duration of a field copy only, so `latest()` stays effectively
//! non-blocking no matter how fast frames arrive.

use chrono::{DateTime, Utc};
use genbridge_engine::messages::{FrameFormat, PreviewFrame};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Health of the event-stream subscription backing the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Establishing (or re-establishing) the subscription.
    Connecting,
    /// Subscribed; frames may arrive at any moment.
    Connected,
    /// The subscription dropped; a reconnect is pending.
    Disconnected,
    /// The relay was stopped; no more frames will ever arrive.
    Stopped,
}

/// The most recent preview frame, stamped with its arrival time.
///
/// The stamp lets consumers decide for themselves whether a frame is
/// stale; the cache never expires anything on its own.
#[derive(Debug, Clone)]
pub struct CachedFrame {
    pub format: FrameFormat,
    pub data: Vec<u8>,
    pub received_at: DateTime<Utc>,
}

/// Step-level progress of the node currently executing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    /// Current step.
    pub value: i32,
    /// Total steps.
    pub max: i32,
    /// The executing node, when the engine names it.
    pub node: Option<String>,
}

#[derive(Debug)]
struct Inner {
    frame: Option<CachedFrame>,
    progress: Option<Progress>,
    connection: ConnectionState,
}

/// Latest-frame cache shared between the listener and all handles.
#[derive(Debug)]
pub struct PreviewShared {
    inner: RwLock<Inner>,
}

impl Default for PreviewShared {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner {
                frame: None,
                progress: None,
                connection: ConnectionState::Connecting,
            }),
        }
    }
}

impl PreviewShared {
    /// Replace the cached frame with a newer one. Frames only ever move
    /// forward; there is no way to restore an older frame.
    pub fn store_frame(&self, frame: PreviewFrame) {
        let cached = CachedFrame {
            format: frame.format,
            data: frame.data,
            received_at: Utc::now(),
        };
        self.write().frame = Some(cached);
    }

    pub fn set_progress(&self, progress: Progress) {
        self.write().progress = Some(progress);
    }

    /// Clear progress between jobs (the engine signals job completion by
    /// reporting an empty executing node).
    pub fn clear_progress(&self) {
        self.write().progress = None;
    }

    pub fn set_connection(&self, state: ConnectionState) {
        self.write().connection = state;
    }

    /// Clone out the most recent frame, if any has arrived yet.
    pub fn latest_frame(&self) -> Option<CachedFrame> {
        self.read().frame.clone()
    }

    pub fn progress(&self) -> Option<Progress> {
        self.read().progress.clone()
    }

    pub fn connection(&self) -> ConnectionState {
        self.read().connection
    }

    // A poisoned lock means a writer panicked mid-copy; the cached frame
    // is still just bytes, so carry on with whatever is there.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|p| p.into_inner())
    }
}
