//! Clip entries shared by both storage tiers.

use bytes::Bytes;
use chrono::{DateTime, Utc};

use clipnest_protocol::ClipData;
pub use clipnest_protocol::ClipKind;

/// Identity of a clip. Assigned once, never reused for different content.
pub type ClipId = i64;

/// One captured clipboard value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipEntry {
    pub id: ClipId,
    /// Opaque content bytes. Cheap to clone.
    pub content: Bytes,
    pub kind: ClipKind,
    pub captured_at: DateTime<Utc>,
    pub pinned: bool,
}

impl ClipEntry {
    pub fn new(id: ClipId, content: impl Into<Bytes>, kind: ClipKind) -> Self {
        Self {
            id,
            content: content.into(),
            kind,
            captured_at: Utc::now(),
            pinned: false,
        }
    }

    /// Substring match on raw bytes. An empty needle matches everything.
    pub fn contains(&self, needle: &[u8]) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.content
            .windows(needle.len())
            .any(|window| window == needle)
    }

    pub fn to_wire(&self) -> ClipData {
        ClipData::from_bytes(
            self.id,
            &self.content,
            self.kind,
            self.captured_at.timestamp(),
            self.pinned,
        )
    }
}
