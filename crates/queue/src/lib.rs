//! Task queue and worker coordination for engine job execution.
//!
//! The engine executes one job at a time; this crate serializes access to
//! it. The first caller to submit against an idle queue becomes the
//! worker and drains tasks in FIFO order; callers arriving while the
//! worker is busy become passive monitors that wake when the queue
//! drains. Every caller gets its own terminating [`StatusUpdate`] stream.
//!
//! [`StatusUpdate`]: genbridge_core::types::StatusUpdate

pub mod bridge;
pub mod coordinator;
pub mod executor;
pub mod queue;
pub mod state;

pub use bridge::Bridge;
pub use coordinator::Coordinator;
pub use executor::{EngineExecutor, ExecutionContext, SubmitError, TaskExecutor};
pub use queue::{CallerRole, TaskQueue};
