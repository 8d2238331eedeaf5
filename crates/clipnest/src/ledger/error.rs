//! Ledger error types.

use thiserror::Error;

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur while reading or writing the pinned ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Query or connection failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed at startup.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// IO error, e.g. creating the database directory.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored row could not be mapped back to a clip.
    #[error("corrupt ledger row: {0}")]
    Corrupt(String),
}
