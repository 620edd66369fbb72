//! Interpretation of the engine's history records.
//!
//! The history endpoint returns eventually-consistent JSON whose shape has
//! drifted across engine versions. An explicit "completed" flag cannot be
//! trusted as the sole success criterion; presence of an `outputs` field is
//! the stronger signal. These helpers normalize the mess into something the
//! detector can act on.

use std::path::{Path, PathBuf};

use genbridge_core::types::JobOutputs;

/// What a history entry says about a job, after normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryStatus {
    /// The entry indicates the job finished successfully.
    Completed,
    /// The entry carries an explicit error/cancellation status.
    Failed(String),
    /// The entry exists but says nothing conclusive yet.
    Pending,
}

const COMPLETED_WORDS: [&str; 5] = ["completed", "complete", "finished", "success", "succeeded"];
const FAILED_WORDS: [&str; 6] = ["error", "failed", "failure", "cancelled", "canceled", "stopped"];

/// Locate the entry for `job_id` inside a history response.
///
/// Entries are usually keyed directly by job id, but some engine builds
/// nest the map under `history`, `prompts`, or `data`.
pub fn find_entry<'a>(payload: &'a serde_json::Value, job_id: &str) -> Option<&'a serde_json::Value> {
    let map = payload.as_object()?;

    if let Some(entry) = map.get(job_id) {
        return Some(entry);
    }

    for key in ["history", "prompts", "data"] {
        if let Some(nested) = map.get(key).and_then(|v| v.as_object()) {
            if let Some(entry) = nested.get(job_id) {
                return Some(entry);
            }
        }
    }

    None
}

/// Normalize one history entry into a [`HistoryStatus`].
pub fn entry_status(entry: &serde_json::Value) -> HistoryStatus {
    let status_block = entry.get("status");

    let status_word = match status_block {
        Some(serde_json::Value::Object(map)) => map
            .get("status")
            .or_else(|| map.get("status_str"))
            .or_else(|| map.get("result"))
            .and_then(|v| v.as_str()),
        Some(serde_json::Value::String(s)) => Some(s.as_str()),
        _ => None,
    };

    if let Some(word) = status_word {
        let normalized = word.to_ascii_lowercase();
        if COMPLETED_WORDS.contains(&normalized.as_str()) {
            return HistoryStatus::Completed;
        }
        if FAILED_WORDS.contains(&normalized.as_str()) {
            return HistoryStatus::Failed(failure_detail(status_block, &normalized));
        }
    }

    // No conclusive status word. An entry that already has outputs is done;
    // the engine simply never wrote the flag.
    if entry.get("outputs").is_some() || entry.get("images").is_some() {
        return HistoryStatus::Completed;
    }

    HistoryStatus::Pending
}

/// Build a human-readable reason from a failed status block.
fn failure_detail(status_block: Option<&serde_json::Value>, status_word: &str) -> String {
    let Some(serde_json::Value::Object(map)) = status_block else {
        return status_word.to_string();
    };

    for key in ["message", "error", "detail"] {
        if let Some(detail) = map.get(key).and_then(|v| v.as_str()) {
            return format!("{status_word}: {detail}");
        }
    }

    if let Some(messages) = map.get("messages").and_then(|v| v.as_array()) {
        if !messages.is_empty() {
            let joined = messages
                .iter()
                .map(|m| m.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return format!("{status_word}: {joined}");
        }
    }

    status_word.to_string()
}

/// Extract output file paths from a history entry.
///
/// Walks `outputs.<node_id>.{images,videos,gifs}` and resolves each item
/// against the engine's output directory. Items whose `type` points at a
/// non-output directory (temp previews, inputs) are skipped, as are files
/// that do not exist on disk.
pub fn extract_outputs(entry: &serde_json::Value, output_dir: &Path) -> JobOutputs {
    let mut outputs = JobOutputs::default();

    let Some(node_map) = entry
        .get("outputs")
        .or_else(|| entry.get("output"))
        .and_then(|v| v.as_object())
    else {
        return outputs;
    };

    for node_outputs in node_map.values() {
        let Some(node_outputs) = node_outputs.as_object() else {
            continue;
        };

        for item in list_items(node_outputs, "images") {
            if let Some(path) = resolve_item(item, output_dir) {
                if !outputs.images.contains(&path) {
                    outputs.images.push(path);
                }
            }
        }
        for key in ["videos", "gifs"] {
            for item in list_items(node_outputs, key) {
                if let Some(path) = resolve_item(item, output_dir) {
                    if !outputs.videos.contains(&path) {
                        outputs.videos.push(path);
                    }
                }
            }
        }
    }

    outputs
}

fn list_items<'a>(
    node_outputs: &'a serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> impl Iterator<Item = &'a serde_json::Value> {
    node_outputs
        .get(key)
        .and_then(|v| v.as_array())
        .map(|a| a.iter())
        .into_iter()
        .flatten()
}

/// Resolve one `{filename, subfolder, type}` item to an existing file.
fn resolve_item(item: &serde_json::Value, output_dir: &Path) -> Option<PathBuf> {
    let filename = item.get("filename")?.as_str()?;
    let subfolder = item.get("subfolder").and_then(|v| v.as_str()).unwrap_or("");
    let kind = item.get("type").and_then(|v| v.as_str()).unwrap_or("output");

    if kind != "output" {
        return None;
    }

    let mut path = output_dir.to_path_buf();
    if !subfolder.is_empty() {
        path.push(subfolder);
    }
    path.push(filename);

    path.is_file().then_some(path)
}
