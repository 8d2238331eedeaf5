//! Frames sent from the daemon to clients.

use serde::{Deserialize, Serialize};

use crate::clip::ClipData;

/// Any frame the daemon writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Reply to exactly one request.
    Response(ResponseBody),
    /// Pushed to every client when the monitor ingests a clip.
    NewClip(ClipData),
}

impl ServerMessage {
    /// Serialize as a newline-terminated line.
    pub fn encode_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Payload of a `response` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ClipList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl ResponseBody {
    /// Success with no payload.
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            code: None,
        }
    }

    /// Success carrying a list of clips.
    pub fn clips(clips: Vec<ClipData>) -> Self {
        Self {
            data: Some(ClipList::new(clips)),
            ..Self::ok()
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            code: Some(code),
        }
    }
}

/// A list of clips plus its length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipList {
    pub clips: Vec<ClipData>,
    pub count: usize,
}

impl ClipList {
    pub fn new(clips: Vec<ClipData>) -> Self {
        let count = clips.len();
        Self { clips, count }
    }
}

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// No clip with the requested id in either tier.
    NotFound,
    /// The pinned ledger failed; the operation was not applied.
    StorageError,
    /// The request frame was malformed or named an unknown type.
    ProtocolError,
    /// The system clipboard could not be written.
    ClipboardError,
}
