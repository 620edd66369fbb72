//! Live preview relay for the engine's event stream.
//!
//! The engine pushes in-progress preview frames over its WebSocket much
//! faster than any consumer wants them. This crate keeps one persistent
//! subscription per session, caches only the most recent frame, and lets
//! consumers grab it on their own schedule without ever blocking on the
//! network.

pub mod listener;
pub mod relay;
pub mod state;

pub use relay::{PreviewHandle, PreviewRelay};
pub use state::{CachedFrame, ConnectionState, Progress};
