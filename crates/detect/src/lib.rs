//! Completion detection for jobs submitted to the engine.
//!
//! The engine offers no reliable "job finished" callback, so completion is
//! inferred from whichever unreliable signal a job supports: a marker
//! record in the history log, disappearance from the live queue listing,
//! or new files in the output directory. [`detector::CompletionDetector`]
//! wraps the three strategies behind one `detect` call that always
//! resolves to a terminal [`CompletionResult`] within its deadline.
//!
//! [`CompletionResult`]: genbridge_core::types::CompletionResult

pub mod detector;
pub mod history;
pub mod outputs;
pub mod probe;
pub mod strategy;
