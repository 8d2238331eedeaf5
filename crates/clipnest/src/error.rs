//! Store-level error types.

use thiserror::Error;

use crate::clipboard::ClipboardError;
use crate::ledger::LedgerError;
use crate::model::ClipId;

/// Result type for store operations.
pub type ClipResult<T> = Result<T, ClipError>;

/// Errors surfaced by the history and hybrid stores.
#[derive(Debug, Error)]
pub enum ClipError {
    /// No entry with this id in memory or in the ledger.
    #[error("clip {0} not found")]
    NotFound(ClipId),

    /// The pinned ledger failed. The enclosing mutation was not applied.
    #[error("storage error: {0}")]
    Storage(#[from] LedgerError),

    /// The system clipboard rejected a read or write.
    #[error("clipboard error: {0}")]
    Clipboard(#[from] ClipboardError),
}

impl ClipError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClipError::NotFound(_))
    }
}
