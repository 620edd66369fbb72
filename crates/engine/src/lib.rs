//! HTTP and WebSocket client for the generation engine.
//!
//! Provides the stateless request/response wrapper around the engine's
//! best-effort surface (submission, queue listing, history, interrupt)
//! plus the event-stream subscription, typed message parsing, and
//! reconnection logic. No business logic lives here; completion inference
//! and queue coordination are built on top in the `detect` and `queue`
//! crates.

pub mod api;
pub mod messages;
pub mod reconnect;
pub mod session;
