//! Durable storage for pinned clips.
//!
//! Only pinned entries are written here. On startup the ledger is the sole
//! source of pinned clips; the in-memory history starts empty.

mod error;
mod sqlite;

pub use error::{LedgerError, LedgerResult};
pub use sqlite::{Database, SqliteLedger};

use async_trait::async_trait;

use crate::model::{ClipEntry, ClipId, ClipKind};

/// Persistence backend for pinned clips.
///
/// Entries returned by a ledger always have `pinned == true`.
#[async_trait]
pub trait PinLedger: Send + Sync {
    /// Insert or replace the row for `entry.id`.
    async fn put(&self, entry: &ClipEntry) -> LedgerResult<()>;

    async fn get(&self, id: ClipId) -> LedgerResult<Option<ClipEntry>>;

    /// All pinned clips, most recently captured first.
    async fn list(&self) -> LedgerResult<Vec<ClipEntry>>;

    /// Delete one row. Returns whether it existed.
    async fn delete(&self, id: ClipId) -> LedgerResult<bool>;

    /// Delete every row. Returns how many were removed.
    async fn delete_all(&self) -> LedgerResult<u64>;

    async fn count(&self) -> LedgerResult<u64>;

    /// Pinned clip holding exactly this payload, if any.
    async fn find_by_content(&self, content: &[u8], kind: ClipKind)
    -> LedgerResult<Option<ClipEntry>>;

    /// Highest id ever persisted, used to seed the id counter.
    async fn max_id(&self) -> LedgerResult<Option<ClipId>>;

    /// Release the backing resources. Further calls fail.
    async fn close(&self);
}
