//! Clipboard access.
//!
//! [`ClipboardAccess`] is a synchronous point-in-time interface. Platform
//! clipboards block, so async callers run it on the blocking pool.

mod memory;
#[cfg(feature = "system-clipboard")]
mod system;

pub use memory::MemoryClipboard;
#[cfg(feature = "system-clipboard")]
pub use system::SystemClipboard;

use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ClipboardBackend;
use crate::model::ClipKind;

/// Errors from a clipboard backend.
#[derive(Debug, Error)]
pub enum ClipboardError {
    /// No clipboard could be opened (no display server, locked, ...).
    #[error("clipboard unavailable: {0}")]
    Unavailable(String),

    /// The backend cannot hold content of this kind.
    #[error("cannot write {0} content to the clipboard")]
    Unsupported(ClipKind),

    /// Image bytes could not be converted.
    #[error("image conversion failed: {0}")]
    Image(String),

    /// The read or write itself failed.
    #[error("clipboard access failed: {0}")]
    Access(String),
}

/// What the clipboard held at one point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipSnapshot {
    pub content: Bytes,
    pub kind: ClipKind,
}

impl ClipSnapshot {
    pub fn new(content: impl Into<Bytes>, kind: ClipKind) -> Self {
        Self {
            content: content.into(),
            kind,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self::new(text.into().into_bytes(), ClipKind::Text)
    }

    /// An empty clipboard.
    pub fn empty() -> Self {
        Self::new(Bytes::new(), ClipKind::Unknown)
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// Point-in-time read and write of the system clipboard.
pub trait ClipboardAccess: Send + Sync {
    /// Current clipboard content. An empty clipboard is an empty snapshot,
    /// not an error.
    fn read(&self) -> Result<ClipSnapshot, ClipboardError>;

    /// Replace the clipboard content.
    fn write(&self, content: &[u8], kind: ClipKind) -> Result<(), ClipboardError>;
}

/// Build the backend selected in configuration.
pub fn from_backend(backend: ClipboardBackend) -> Result<Arc<dyn ClipboardAccess>, ClipboardError> {
    match backend {
        ClipboardBackend::Memory => Ok(Arc::new(MemoryClipboard::new())),
        #[cfg(feature = "system-clipboard")]
        ClipboardBackend::System => Ok(Arc::new(SystemClipboard::new())),
        #[cfg(not(feature = "system-clipboard"))]
        ClipboardBackend::System => Err(ClipboardError::Unavailable(
            "built without the system-clipboard feature".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_helpers() {
        let snap = ClipSnapshot::text("hello");
        assert_eq!(snap.kind, ClipKind::Text);
        assert_eq!(snap.content.as_ref(), b"hello");
        assert!(!snap.is_empty());
        assert!(ClipSnapshot::empty().is_empty());
    }

    #[test]
    fn test_memory_backend_selected() {
        let clipboard = from_backend(ClipboardBackend::Memory).unwrap();
        assert!(clipboard.read().unwrap().is_empty());
    }
}
