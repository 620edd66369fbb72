//! Typed parsing of the engine's WebSocket traffic.
//!
//! The engine mixes two kinds of frames on one socket: JSON text messages
//! shaped `{"type": "<kind>", "data": {...}}`, and binary frames carrying
//! in-progress preview images behind an 8-byte header. [`parse_message`]
//! handles the former, [`parse_preview_frame`] the latter.

use serde::Deserialize;

/// All known JSON message types on the event stream.
///
/// Deserialized via the internally-tagged `"type"` field with associated
/// `"data"` content. Unknown types are a parse error; callers log and
/// continue.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EngineMessage {
    /// Server status broadcast (queue depth, etc.).
    #[serde(rename = "status")]
    Status(StatusData),

    /// A job has started executing.
    #[serde(rename = "execution_start")]
    ExecutionStart(ExecutionStartData),

    /// Some nodes were skipped because their outputs are cached.
    #[serde(rename = "execution_cached")]
    ExecutionCached(ExecutionCachedData),

    /// A specific node is executing, or the job finished when `node` is `None`.
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Step-level progress from a long-running node.
    #[serde(rename = "progress")]
    Progress(ProgressData),

    /// A node finished and produced output.
    #[serde(rename = "executed")]
    Executed(ExecutedData),

    /// Execution failed with an error.
    #[serde(rename = "execution_error")]
    ExecutionError(ErrorData),
}

/// Queue status information.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

/// Current queue state.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

/// Execution queue statistics.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i32,
}

/// Payload for `execution_start` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionStartData {
    pub prompt_id: String,
}

/// Payload for `execution_cached` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionCachedData {
    pub prompt_id: String,
    /// Node ids whose outputs were served from cache.
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Payload for `executing` messages.
///
/// When `node` is `None`, execution of the job has completed.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    pub prompt_id: String,
}

/// Payload for `progress` messages (step N of M within a node).
#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    /// Current step number.
    pub value: i32,
    /// Total number of steps.
    pub max: i32,
    /// The node reporting progress, when the engine includes it.
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

/// Payload for `executed` messages (per-node output).
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutedData {
    /// The node that produced this output.
    pub node: String,
    /// Raw output value (images, filenames, etc.).
    pub output: serde_json::Value,
    pub prompt_id: String,
}

/// Payload for `execution_error` messages.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    pub node_id: String,
    pub exception_message: String,
    pub exception_type: String,
}

/// Parse an event-stream text message into a typed enum.
///
/// Returns `Err` for malformed JSON or unknown `type` values.
pub fn parse_message(text: &str) -> Result<EngineMessage, serde_json::Error> {
    serde_json::from_str(text)
}

// ---------------------------------------------------------------------------
// Binary preview frames
// ---------------------------------------------------------------------------

/// Binary frame message type carrying a preview image.
const BINARY_TYPE_PREVIEW_IMAGE: u32 = 1;

/// Encoding of a preview frame's image payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    Jpeg,
    Png,
    /// The engine declared a format code we do not know. The bytes may
    /// still be displayable; callers decide.
    Unknown(u32),
}

/// One decoded in-progress preview image.
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub format: FrameFormat,
    /// Raw encoded image bytes (header already stripped).
    pub data: Vec<u8>,
}

/// Errors from binary preview-frame parsing.
#[derive(Debug, thiserror::Error)]
pub enum PreviewFrameError {
    /// The frame is shorter than the 8-byte type/format header.
    #[error("binary frame too short to carry a preview ({0} bytes)")]
    TooShort(usize),

    /// The frame's message type is not a preview image.
    #[error("unsupported binary message type {0}")]
    UnsupportedType(u32),
}

/// Parse a binary event-stream frame into a [`PreviewFrame`].
///
/// Frames start with two big-endian u32s: the message type (1 for preview
/// images) and the image format code (1 = JPEG, 2 = PNG). The encoded
/// image bytes follow.
pub fn parse_preview_frame(data: &[u8]) -> Result<PreviewFrame, PreviewFrameError> {
    if data.len() <= 8 {
        return Err(PreviewFrameError::TooShort(data.len()));
    }

    let message_type = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    if message_type != BINARY_TYPE_PREVIEW_IMAGE {
        return Err(PreviewFrameError::UnsupportedType(message_type));
    }

    let format = match u32::from_be_bytes([data[4], data[5], data[6], data[7]]) {
        1 => FrameFormat::Jpeg,
        2 => FrameFormat::Png,
        other => FrameFormat::Unknown(other),
    };

    Ok(PreviewFrame {
        format,
        data: data[8..].to_vec(),
    })
}
