//! In-process clipboard for headless runs and tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::{ClipSnapshot, ClipboardAccess, ClipboardError};
use crate::model::ClipKind;

#[derive(Debug, Default)]
pub struct MemoryClipboard {
    current: Mutex<Option<ClipSnapshot>>,
    failing: AtomicBool,
}

impl MemoryClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a user copy.
    pub fn set(&self, snapshot: ClipSnapshot) {
        if let Ok(mut current) = self.current.lock() {
            *current = Some(snapshot);
        }
    }

    pub fn set_text(&self, text: &str) {
        self.set(ClipSnapshot::text(text));
    }

    pub fn clear(&self) {
        if let Ok(mut current) = self.current.lock() {
            *current = None;
        }
    }

    /// Make every read and write fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), ClipboardError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ClipboardError::Access("simulated failure".to_string()));
        }
        Ok(())
    }
}

impl ClipboardAccess for MemoryClipboard {
    fn read(&self) -> Result<ClipSnapshot, ClipboardError> {
        self.check()?;
        let current = self
            .current
            .lock()
            .map_err(|e| ClipboardError::Access(e.to_string()))?;
        Ok(current.clone().unwrap_or_else(ClipSnapshot::empty))
    }

    fn write(&self, content: &[u8], kind: ClipKind) -> Result<(), ClipboardError> {
        self.check()?;
        let mut current = self
            .current
            .lock()
            .map_err(|e| ClipboardError::Access(e.to_string()))?;
        *current = Some(ClipSnapshot::new(content.to_vec(), kind));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let clipboard = MemoryClipboard::new();
        clipboard.write(b"copied", ClipKind::Text).unwrap();
        assert_eq!(clipboard.read().unwrap(), ClipSnapshot::text("copied"));

        clipboard.clear();
        assert!(clipboard.read().unwrap().is_empty());
    }

    #[test]
    fn test_failing_mode() {
        let clipboard = MemoryClipboard::new();
        clipboard.set_text("x");
        clipboard.set_failing(true);
        assert!(matches!(clipboard.read(), Err(ClipboardError::Access(_))));
        assert!(clipboard.write(b"y", ClipKind::Text).is_err());

        clipboard.set_failing(false);
        assert_eq!(clipboard.read().unwrap(), ClipSnapshot::text("x"));
    }
}
