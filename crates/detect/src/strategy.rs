//! Completion-strategy selection.
//!
//! The strategy is decided once, at submission time, from the payload's
//! declared capabilities, and recorded on the [`JobHandle`] for the rest
//! of that job's life.
//!
//! [`JobHandle`]: genbridge_core::types::JobHandle

use genbridge_core::types::CompletionStrategy;

/// True when the payload contains at least one node whose `class_type` is
/// one of the configured marker output node types.
///
/// Marker nodes write a side-channel completion record the history
/// endpoint can be polled for; their presence is what "declares a
/// completion marker" in the data model.
pub fn declares_marker(payload: &serde_json::Value, marker_node_types: &[String]) -> bool {
    let Some(nodes) = payload.as_object() else {
        return false;
    };

    nodes.values().any(|node| {
        node.get("class_type")
            .and_then(|ct| ct.as_str())
            .map(|ct| marker_node_types.iter().any(|m| m == ct))
            .unwrap_or(false)
    })
}

/// Choose the completion strategy for a payload.
///
/// Marker when the payload declares one; otherwise queue-absence, the
/// default-safe fallback. The output-diff strategy is never chosen here —
/// it runs as a supplement inside detection, or when a caller requests it
/// explicitly.
pub fn choose_strategy(
    payload: &serde_json::Value,
    marker_node_types: &[String],
) -> CompletionStrategy {
    if declares_marker(payload, marker_node_types) {
        CompletionStrategy::Marker
    } else {
        CompletionStrategy::QueueAbsence
    }
}
