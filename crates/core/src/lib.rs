//! Shared types for the genbridge generation-job coordinator.
//!
//! Identifier newtypes, the task / job / result data model, and the
//! environment-driven engine configuration used by every other crate in
//! the workspace.

pub mod config;
pub mod types;
