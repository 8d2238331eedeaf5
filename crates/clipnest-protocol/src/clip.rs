//! Clip payloads as they appear on the wire.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What kind of clipboard content an entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClipKind {
    Text,
    Image,
    Unknown,
    Error,
}

impl ClipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClipKind::Text => "text",
            ClipKind::Image => "image",
            ClipKind::Unknown => "unknown",
            ClipKind::Error => "error",
        }
    }
}

impl fmt::Display for ClipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for ClipKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ClipKind::Text),
            "image" => Ok(ClipKind::Image),
            "unknown" => Ok(ClipKind::Unknown),
            "error" => Ok(ClipKind::Error),
            other => Err(format!("unknown clip kind: {other}")),
        }
    }
}

/// How `ClipData::content` is encoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentEncoding {
    /// Content is the UTF-8 text itself.
    #[default]
    Utf8,
    /// Content is standard base64 of the raw bytes.
    Base64,
}

impl ContentEncoding {
    fn is_utf8(&self) -> bool {
        matches!(self, ContentEncoding::Utf8)
    }
}

/// A clip as sent to clients, both in list responses and `new_clip` pushes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClipData {
    pub id: i64,
    pub content: String,
    /// Omitted on the wire for plain text.
    #[serde(default, skip_serializing_if = "ContentEncoding::is_utf8")]
    pub encoding: ContentEncoding,
    pub kind: ClipKind,
    /// Capture time, unix seconds.
    pub captured_at: i64,
    pub pinned: bool,
}

impl ClipData {
    /// Build wire data from raw bytes, falling back to base64 when the bytes
    /// are not valid UTF-8.
    pub fn from_bytes(id: i64, bytes: &[u8], kind: ClipKind, captured_at: i64, pinned: bool) -> Self {
        let (content, encoding) = match std::str::from_utf8(bytes) {
            Ok(text) => (text.to_string(), ContentEncoding::Utf8),
            Err(_) => (STANDARD.encode(bytes), ContentEncoding::Base64),
        };
        Self {
            id,
            content,
            encoding,
            kind,
            captured_at,
            pinned,
        }
    }

    /// Recover the raw content bytes.
    pub fn content_bytes(&self) -> Result<Vec<u8>, base64::DecodeError> {
        match self.encoding {
            ContentEncoding::Utf8 => Ok(self.content.as_bytes().to_vec()),
            ContentEncoding::Base64 => STANDARD.decode(&self.content),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_clip_wire_shape() {
        let clip = ClipData::from_bytes(7, b"hello", ClipKind::Text, 1_700_000_000, true);
        let json = serde_json::to_value(&clip).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["content"], "hello");
        assert_eq!(json["kind"], "text");
        assert_eq!(json["capturedAt"], 1_700_000_000_i64);
        assert_eq!(json["pinned"], true);
        assert!(json.get("encoding").is_none());
    }

    #[test]
    fn test_binary_clip_uses_base64() {
        let bytes = [0x89, 0x50, 0x4e, 0x47, 0xff, 0x00];
        let clip = ClipData::from_bytes(1, &bytes, ClipKind::Image, 0, false);

        assert_eq!(clip.encoding, ContentEncoding::Base64);
        let json = serde_json::to_string(&clip).unwrap();
        assert!(json.contains("\"encoding\":\"base64\""));

        let parsed: ClipData = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.content_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_kind_parse() {
        assert_eq!("image".parse::<ClipKind>().unwrap(), ClipKind::Image);
        assert!("html".parse::<ClipKind>().is_err());
        assert_eq!(ClipKind::Error.to_string(), "error");
    }
}
