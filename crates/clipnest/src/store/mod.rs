//! Two-tier clip store.
//!
//! [`HybridStore`] puts a bounded in-memory [`HistoryStore`] in front of a
//! durable [`PinLedger`] and presents them as one store with one identity per
//! clip. New clips always land in memory; pinning writes through to the
//! ledger. Reads merge both tiers by id, preferring the in-memory copy.
//!
//! Mutations take the history write lock and keep it across the ledger call,
//! so a concurrent reader never sees a pin that exists in one tier only.

use bytes::Bytes;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::error::{ClipError, ClipResult};
use crate::history::{CapacityPolicy, HistoryStore};
use crate::ledger::PinLedger;
use crate::model::{ClipEntry, ClipId, ClipKind};

/// Result of [`HybridStore::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stored {
    pub entry: ClipEntry,
    /// The content was already known and only moved to the front.
    pub deduplicated: bool,
}

pub struct HybridStore {
    history: RwLock<HistoryStore>,
    ledger: Arc<dyn PinLedger>,
}

impl HybridStore {
    /// Build a store over `ledger`, seeding the id counter past every
    /// persisted id.
    pub async fn open(
        ledger: Arc<dyn PinLedger>,
        capacity: usize,
        policy: CapacityPolicy,
    ) -> ClipResult<Self> {
        let mut history = HistoryStore::with_policy(capacity, policy);
        if let Some(max_id) = ledger.max_id().await? {
            history.seed_next_id(max_id + 1);
        }

        info!(
            "Clip store ready: capacity {}, {} pinned in ledger, next id {}",
            capacity,
            ledger.count().await?,
            history.next_id()
        );

        Ok(Self {
            history: RwLock::new(history),
            ledger,
        })
    }

    /// Record a captured clip.
    ///
    /// Content already resident is promoted. Content held only by the ledger
    /// comes back into memory under its pinned id.
    #[instrument(skip(self, content), fields(kind = %kind))]
    pub async fn add(&self, content: impl Into<Bytes>, kind: ClipKind) -> ClipResult<Stored> {
        let content = content.into();
        let mut history = self.history.write().await;

        let outcome = if history.find_payload(&content, kind).is_some() {
            history.add(content, kind)
        } else {
            match self.ledger.find_by_content(&content, kind).await? {
                Some(pinned) => {
                    debug!("Re-admitting pinned clip {} from ledger", pinned.id);
                    history.admit(pinned)
                }
                None => history.add(content, kind),
            }
        };

        if !outcome.evicted.is_empty() {
            debug!("Evicted {} clips", outcome.evicted.len());
        }

        Ok(Stored {
            entry: outcome.entry,
            deduplicated: outcome.deduplicated,
        })
    }

    /// Look up a clip in memory, then in the ledger.
    pub async fn get(&self, id: ClipId) -> ClipResult<ClipEntry> {
        let history = self.history.read().await;
        if let Ok(entry) = history.get(id) {
            return Ok(entry.clone());
        }
        self.ledger.get(id).await?.ok_or(ClipError::NotFound(id))
    }

    /// Move a clip to the front. A ledger-only clip is brought back into
    /// memory.
    pub async fn touch(&self, id: ClipId) -> ClipResult<ClipEntry> {
        let mut history = self.history.write().await;
        if history.touch(id).is_err() {
            let pinned = self.ledger.get(id).await?.ok_or(ClipError::NotFound(id))?;
            history.admit(pinned);
        }
        Ok(history.get(id)?.clone())
    }

    /// Most recent clips across both tiers.
    pub async fn list(&self, limit: usize) -> ClipResult<Vec<ClipEntry>> {
        let history = self.history.read().await;
        let resident = history.list(limit);
        if resident.len() >= limit {
            return Ok(resident);
        }
        let persisted = self.ledger.list().await?;
        Ok(merge(resident, persisted, limit, |_| true))
    }

    /// Clips containing `needle`, in merged order.
    pub async fn search(&self, needle: &[u8], limit: usize) -> ClipResult<Vec<ClipEntry>> {
        let history = self.history.read().await;
        let resident = history.search(needle, limit);
        if resident.len() >= limit {
            return Ok(resident);
        }
        let persisted = self.ledger.list().await?;
        Ok(merge(resident, persisted, limit, |e| e.contains(needle)))
    }

    /// Every pinned clip, resident ones first.
    pub async fn pinned(&self) -> ClipResult<Vec<ClipEntry>> {
        let history = self.history.read().await;
        let resident = history.pinned();
        let persisted = self.ledger.list().await?;
        Ok(merge(resident, persisted, usize::MAX, |_| true))
    }

    /// Pin a clip and persist it. Either both tiers change or neither does.
    #[instrument(skip(self))]
    pub async fn pin(&self, id: ClipId) -> ClipResult<()> {
        let mut history = self.history.write().await;

        let entry = match history.get(id) {
            Ok(entry) => entry.clone(),
            Err(_) => {
                // Ledger-only clips are already pinned.
                return match self.ledger.get(id).await? {
                    Some(_) => Ok(()),
                    None => Err(ClipError::NotFound(id)),
                };
            }
        };

        let was_pinned = history.set_pinned(id, true)?;
        let persisted = ClipEntry {
            pinned: true,
            ..entry
        };

        if let Err(err) = self.ledger.put(&persisted).await {
            if !was_pinned {
                history.set_pinned(id, false)?;
            }
            warn!("Pin of clip {} rolled back: {}", id, err);
            return Err(err.into());
        }

        debug!("Pinned clip {}", id);
        Ok(())
    }

    /// Drop durability for a clip. A resident copy stays but may be evicted.
    #[instrument(skip(self))]
    pub async fn unpin(&self, id: ClipId) -> ClipResult<()> {
        let mut history = self.history.write().await;
        let resident = history.contains(id);

        let deleted = self.ledger.delete(id).await?;
        if resident {
            history.unpin(id)?;
        } else if !deleted {
            return Err(ClipError::NotFound(id));
        }

        debug!("Unpinned clip {}", id);
        Ok(())
    }

    /// Delete a clip from both tiers.
    #[instrument(skip(self))]
    pub async fn remove(&self, id: ClipId) -> ClipResult<()> {
        let mut history = self.history.write().await;
        let resident = history.contains(id);
        if !resident && self.ledger.get(id).await?.is_none() {
            return Err(ClipError::NotFound(id));
        }

        self.ledger.delete(id).await?;
        history.remove(id);
        Ok(())
    }

    /// Drop history. With `keep_pinned`, only unpinned resident clips go;
    /// otherwise the ledger is emptied too.
    #[instrument(skip(self))]
    pub async fn clear(&self, keep_pinned: bool) -> ClipResult<()> {
        let mut history = self.history.write().await;
        if keep_pinned {
            let dropped = history.clear_unpinned();
            info!("Cleared {} unpinned clips", dropped);
            return Ok(());
        }

        let deleted = self.ledger.delete_all().await?;
        let resident = history.len();
        history.clear();
        info!("Cleared {} resident clips and {} pinned clips", resident, deleted);
        Ok(())
    }

    /// Number of clips held in memory.
    pub async fn len(&self) -> usize {
        self.history.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.history.read().await.is_empty()
    }

    /// Number of durable (pinned) clips.
    pub async fn pinned_count(&self) -> ClipResult<u64> {
        Ok(self.ledger.count().await?)
    }

    pub async fn close(&self) {
        self.ledger.close().await;
    }
}

/// Resident entries in recency order, then ledger-only entries in the
/// ledger's capture-time order, truncated to `limit`.
fn merge(
    resident: Vec<ClipEntry>,
    persisted: Vec<ClipEntry>,
    limit: usize,
    keep: impl Fn(&ClipEntry) -> bool,
) -> Vec<ClipEntry> {
    let seen: HashSet<ClipId> = resident.iter().map(|e| e.id).collect();
    let mut merged = resident;
    merged.extend(
        persisted
            .into_iter()
            .filter(|e| !seen.contains(&e.id))
            .filter(|e| keep(e)),
    );
    merged.truncate(limit);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerError, LedgerResult, SqliteLedger};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    /// Ledger whose writes can be made to fail.
    struct FlakyLedger {
        inner: SqliteLedger,
        fail_writes: AtomicBool,
    }

    impl FlakyLedger {
        async fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: SqliteLedger::in_memory().await.unwrap(),
                fail_writes: AtomicBool::new(false),
            })
        }

        fn check(&self) -> LedgerResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(LedgerError::Io(std::io::Error::other("disk full")));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PinLedger for FlakyLedger {
        async fn put(&self, entry: &ClipEntry) -> LedgerResult<()> {
            self.check()?;
            self.inner.put(entry).await
        }
        async fn get(&self, id: ClipId) -> LedgerResult<Option<ClipEntry>> {
            self.inner.get(id).await
        }
        async fn list(&self) -> LedgerResult<Vec<ClipEntry>> {
            self.inner.list().await
        }
        async fn delete(&self, id: ClipId) -> LedgerResult<bool> {
            self.check()?;
            self.inner.delete(id).await
        }
        async fn delete_all(&self) -> LedgerResult<u64> {
            self.check()?;
            self.inner.delete_all().await
        }
        async fn count(&self) -> LedgerResult<u64> {
            self.inner.count().await
        }
        async fn find_by_content(
            &self,
            content: &[u8],
            kind: ClipKind,
        ) -> LedgerResult<Option<ClipEntry>> {
            self.inner.find_by_content(content, kind).await
        }
        async fn max_id(&self) -> LedgerResult<Option<ClipId>> {
            self.inner.max_id().await
        }
        async fn close(&self) {
            self.inner.close().await
        }
    }

    async fn memory_store(capacity: usize) -> HybridStore {
        let ledger = Arc::new(SqliteLedger::in_memory().await.unwrap());
        HybridStore::open(ledger, capacity, CapacityPolicy::CountAll)
            .await
            .unwrap()
    }

    async fn add_text(store: &HybridStore, text: &str) -> ClipId {
        store
            .add(text.as_bytes().to_vec(), ClipKind::Text)
            .await
            .unwrap()
            .entry
            .id
    }

    fn texts(entries: &[ClipEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| String::from_utf8_lossy(&e.content).into_owned())
            .collect()
    }

    #[tokio::test]
    async fn test_add_and_dedup() {
        let store = memory_store(10).await;
        let a = add_text(&store, "a").await;
        add_text(&store, "b").await;

        let again = store.add(b"a".to_vec(), ClipKind::Text).await.unwrap();
        assert_eq!(again.entry.id, a);
        assert!(again.deduplicated);
        assert_eq!(store.len().await, 2);
        assert_eq!(texts(&store.list(10).await.unwrap()), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_pin_persists_and_unpin_removes() {
        let store = memory_store(10).await;
        let a = add_text(&store, "a").await;

        store.pin(a).await.unwrap();
        assert!(store.get(a).await.unwrap().pinned);
        assert_eq!(store.pinned_count().await.unwrap(), 1);

        store.unpin(a).await.unwrap();
        assert!(!store.get(a).await.unwrap().pinned);
        assert_eq!(store.pinned_count().await.unwrap(), 0);
        assert!(store.pinned().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let store = memory_store(10).await;
        assert!(store.pin(7).await.unwrap_err().is_not_found());
        assert!(store.unpin(7).await.unwrap_err().is_not_found());
        assert!(store.remove(7).await.unwrap_err().is_not_found());
        assert!(store.get(7).await.unwrap_err().is_not_found());
        assert!(store.touch(7).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_pin_rolls_back_when_ledger_fails() {
        let ledger = FlakyLedger::new().await;
        let store = HybridStore::open(ledger.clone(), 10, CapacityPolicy::CountAll)
            .await
            .unwrap();
        let a = add_text(&store, "a").await;

        ledger.fail_writes.store(true, Ordering::SeqCst);
        let err = store.pin(a).await.unwrap_err();
        assert!(matches!(err, ClipError::Storage(_)));
        assert!(!store.get(a).await.unwrap().pinned);
        assert_eq!(store.pinned_count().await.unwrap(), 0);

        ledger.fail_writes.store(false, Ordering::SeqCst);
        store.pin(a).await.unwrap();
        assert!(store.get(a).await.unwrap().pinned);
    }

    #[tokio::test]
    async fn test_unpin_keeps_pin_when_ledger_fails() {
        let ledger = FlakyLedger::new().await;
        let store = HybridStore::open(ledger.clone(), 10, CapacityPolicy::CountAll)
            .await
            .unwrap();
        let a = add_text(&store, "a").await;
        store.pin(a).await.unwrap();

        ledger.fail_writes.store(true, Ordering::SeqCst);
        assert!(store.unpin(a).await.is_err());
        assert!(store.get(a).await.unwrap().pinned);
        assert_eq!(store.pinned_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_restart_keeps_only_pinned() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clipnest.db");

        let (kept, dropped) = {
            let ledger = Arc::new(SqliteLedger::open(&path).await.unwrap());
            let store = HybridStore::open(ledger, 10, CapacityPolicy::CountAll)
                .await
                .unwrap();
            let kept = add_text(&store, "keep me").await;
            let dropped = add_text(&store, "unpin me").await;
            add_text(&store, "plain").await;
            store.pin(kept).await.unwrap();
            store.pin(dropped).await.unwrap();
            store.unpin(dropped).await.unwrap();
            store.close().await;
            (kept, dropped)
        };

        let ledger = Arc::new(SqliteLedger::open(&path).await.unwrap());
        let store = HybridStore::open(ledger, 10, CapacityPolicy::CountAll)
            .await
            .unwrap();

        assert_eq!(store.len().await, 0);
        let pins = store.pinned().await.unwrap();
        assert_eq!(pins.len(), 1);
        assert_eq!(pins[0].id, kept);
        assert!(pins[0].pinned);

        let listed = store.list(20).await.unwrap();
        assert_eq!(texts(&listed), vec!["keep me"]);
        assert!(store.get(dropped).await.unwrap_err().is_not_found());

        // Fresh ids never collide with persisted ones.
        let fresh = add_text(&store, "new").await;
        assert!(fresh > kept);

        // Copying the pinned content again brings back the same identity.
        let again = store.add(b"keep me".to_vec(), ClipKind::Text).await.unwrap();
        assert_eq!(again.entry.id, kept);
        assert!(again.deduplicated || again.entry.pinned);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_merge_order_residents_then_ledger() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clipnest.db");

        {
            let ledger = Arc::new(SqliteLedger::open(&path).await.unwrap());
            let store = HybridStore::open(ledger, 10, CapacityPolicy::CountAll)
                .await
                .unwrap();
            let old = add_text(&store, "old pin").await;
            store.pin(old).await.unwrap();
            let api = add_text(&store, "api pin").await;
            store.pin(api).await.unwrap();
            store.close().await;
        }

        let ledger = Arc::new(SqliteLedger::open(&path).await.unwrap());
        let store = HybridStore::open(ledger, 10, CapacityPolicy::CountAll)
            .await
            .unwrap();
        add_text(&store, "fresh api").await;
        add_text(&store, "fresh").await;

        let listed = texts(&store.list(10).await.unwrap());
        assert_eq!(&listed[..2], &["fresh", "fresh api"]);
        assert_eq!(listed.len(), 4);

        assert_eq!(store.list(3).await.unwrap().len(), 3);

        let hits = texts(&store.search(b"api", 10).await.unwrap());
        assert_eq!(hits, vec!["fresh api", "api pin"]);
    }

    #[tokio::test]
    async fn test_touch_readmits_ledger_only_clip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("clipnest.db");
        let id = {
            let ledger = Arc::new(SqliteLedger::open(&path).await.unwrap());
            let store = HybridStore::open(ledger, 10, CapacityPolicy::CountAll)
                .await
                .unwrap();
            let id = add_text(&store, "pinned").await;
            store.pin(id).await.unwrap();
            store.close().await;
            id
        };

        let ledger = Arc::new(SqliteLedger::open(&path).await.unwrap());
        let store = HybridStore::open(ledger, 10, CapacityPolicy::CountAll)
            .await
            .unwrap();
        add_text(&store, "other").await;

        let touched = store.touch(id).await.unwrap();
        assert!(touched.pinned);
        assert_eq!(store.list(1).await.unwrap()[0].id, id);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove_deletes_from_both_tiers() {
        let store = memory_store(10).await;
        let a = add_text(&store, "a").await;
        store.pin(a).await.unwrap();

        store.remove(a).await.unwrap();
        assert!(store.get(a).await.unwrap_err().is_not_found());
        assert_eq!(store.pinned_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_clear_variants() {
        let store = memory_store(10).await;
        let a = add_text(&store, "a").await;
        add_text(&store, "b").await;
        store.pin(a).await.unwrap();

        store.clear(true).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.pinned_count().await.unwrap(), 1);

        store.clear(false).await.unwrap();
        assert!(store.is_empty().await);
        assert_eq!(store.pinned_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_adds_get_distinct_ids() {
        let store = Arc::new(memory_store(16).await);
        let mut handles = Vec::new();
        for i in 0..40 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .add(format!("clip-{i}").into_bytes(), ClipKind::Text)
                    .await
                    .unwrap()
                    .entry
                    .id
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            ids.insert(handle.await.unwrap());
        }
        assert_eq!(ids.len(), 40);
        assert_eq!(store.len().await, 16);
    }

    #[tokio::test]
    async fn test_pinned_survive_capacity_pressure() {
        let store = memory_store(3).await;
        let a = add_text(&store, "a").await;
        store.pin(a).await.unwrap();
        for s in ["b", "c", "d", "e"] {
            add_text(&store, s).await;
        }
        assert_eq!(store.len().await, 3);
        assert!(store.get(a).await.unwrap().pinned);
        assert_eq!(texts(&store.list(10).await.unwrap()), vec!["e", "d", "a"]);
    }

    #[tokio::test]
    async fn test_add_succeeds_when_every_resident_is_pinned() {
        let store = memory_store(2).await;
        for s in ["a", "b"] {
            let id = add_text(&store, s).await;
            store.pin(id).await.unwrap();
        }

        let stored = store
            .add(b"c".to_vec(), ClipKind::Text)
            .await
            .unwrap();
        assert!(!stored.deduplicated);
        assert!(!stored.entry.pinned);
        assert_eq!(stored.entry.content.as_ref(), b"c");

        assert_eq!(store.get(stored.entry.id).await.unwrap(), stored.entry);
        assert_eq!(texts(&store.list(10).await.unwrap()), vec!["c", "b", "a"]);

        // The overflow entry is the first to go once something newer arrives.
        add_text(&store, "d").await;
        assert_eq!(texts(&store.list(10).await.unwrap()), vec!["d", "b", "a"]);
        assert_eq!(store.pinned_count().await.unwrap(), 2);
    }
}
