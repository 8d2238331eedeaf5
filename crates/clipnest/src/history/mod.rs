//! In-memory recency store.
//!
//! Holds the most recent clips in most-recent-first order with three
//! guarantees:
//! - no two resident entries share the same `(content, kind)`
//! - any touch (insert, dedup hit, refresh) moves an entry to the front
//! - after an insertion, least-recently-used unpinned entries are evicted
//!   until the store is back within capacity or only pinned entries remain
//!   besides the one just inserted, which is never evicted by its own insert
//!
//! The store itself is not synchronized. Mutations take `&mut self` and reads
//! take `&self`; the owner decides how to share it (see [`crate::store`]).

mod order;

use bytes::Bytes;
use std::collections::HashMap;

use crate::error::{ClipError, ClipResult};
use crate::model::{ClipEntry, ClipId, ClipKind};
use order::{OrderList, Slot};

/// How pinned entries relate to the capacity bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapacityPolicy {
    /// Every resident counts toward capacity. The store exceeds it only when
    /// all residents other than the newest are pinned.
    #[default]
    CountAll,
    /// Only unpinned residents count. Pinned entries sit above the cap.
    UnpinnedOnly,
}

/// Result of [`HistoryStore::add`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub id: ClipId,
    /// The resident entry after the insert or promotion.
    pub entry: ClipEntry,
    /// True when the content was already resident and was only promoted.
    pub deduplicated: bool,
    /// Entries evicted to restore capacity, least recent first.
    pub evicted: Vec<ClipEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct PayloadKey {
    kind: ClipKind,
    content: Bytes,
}

impl PayloadKey {
    fn of(entry: &ClipEntry) -> Self {
        Self {
            kind: entry.kind,
            content: entry.content.clone(),
        }
    }
}

/// Bounded, deduplicating, recency-ordered clip store.
#[derive(Debug)]
pub struct HistoryStore {
    order: OrderList<ClipEntry>,
    by_id: HashMap<ClipId, Slot>,
    by_payload: HashMap<PayloadKey, Slot>,
    capacity: usize,
    policy: CapacityPolicy,
    pinned: usize,
    next_id: ClipId,
}

impl HistoryStore {
    /// Create an empty store holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, CapacityPolicy::default())
    }

    pub fn with_policy(capacity: usize, policy: CapacityPolicy) -> Self {
        Self {
            order: OrderList::new(),
            by_id: HashMap::new(),
            by_payload: HashMap::new(),
            capacity,
            policy,
            pinned: 0,
            next_id: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of resident entries.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.len() == 0
    }

    /// Number of resident entries that are pinned.
    pub fn pinned_len(&self) -> usize {
        self.pinned
    }

    /// The id the next new entry will receive.
    pub fn next_id(&self) -> ClipId {
        self.next_id
    }

    /// Make sure future ids start at or above `next`.
    pub fn seed_next_id(&mut self, next: ClipId) {
        self.next_id = self.next_id.max(next);
    }

    /// Insert content, or promote the resident entry with the same payload.
    pub fn add(&mut self, content: impl Into<Bytes>, kind: ClipKind) -> AddOutcome {
        let content = content.into();
        let key = PayloadKey {
            kind,
            content: content.clone(),
        };

        let resident = self.by_payload.get(&key).copied();
        if let Some(outcome) = resident.and_then(|slot| self.promote(slot)) {
            return outcome;
        }

        let id = self.next_id;
        self.next_id += 1;
        let entry = ClipEntry::new(id, content, kind);
        let slot = self.insert_front(entry.clone());

        AddOutcome {
            id,
            entry,
            deduplicated: false,
            evicted: self.enforce_capacity(slot),
        }
    }

    /// Bring back an entry under its existing id, e.g. a pinned clip that
    /// lives only in the ledger. Behaves like a dedup hit if the id or the
    /// payload is already resident.
    pub fn admit(&mut self, entry: ClipEntry) -> AddOutcome {
        let existing = self
            .by_id
            .get(&entry.id)
            .or_else(|| self.by_payload.get(&PayloadKey::of(&entry)))
            .copied();

        if let Some(outcome) = existing.and_then(|slot| self.promote(slot)) {
            return outcome;
        }

        let id = entry.id;
        self.seed_next_id(id + 1);
        let slot = self.insert_front(entry.clone());

        AddOutcome {
            id,
            entry,
            deduplicated: false,
            evicted: self.enforce_capacity(slot),
        }
    }

    pub fn get(&self, id: ClipId) -> ClipResult<&ClipEntry> {
        self.by_id
            .get(&id)
            .and_then(|&slot| self.order.get(slot))
            .ok_or(ClipError::NotFound(id))
    }

    pub fn contains(&self, id: ClipId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Id of the resident entry holding exactly this payload.
    pub fn find_payload(&self, content: &Bytes, kind: ClipKind) -> Option<ClipId> {
        let key = PayloadKey {
            kind,
            content: content.clone(),
        };
        self.by_payload
            .get(&key)
            .and_then(|&slot| self.order.get(slot))
            .map(|e| e.id)
    }

    /// Entries from most to least recent.
    pub fn iter(&self) -> impl Iterator<Item = &ClipEntry> {
        self.order.iter()
    }

    /// Up to `limit` entries, most recent first.
    pub fn list(&self, limit: usize) -> Vec<ClipEntry> {
        self.iter().take(limit).cloned().collect()
    }

    /// Up to `limit` entries whose content contains `needle`, in recency order.
    pub fn search(&self, needle: &[u8], limit: usize) -> Vec<ClipEntry> {
        self.iter()
            .filter(|e| e.contains(needle))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Resident pinned entries in recency order.
    pub fn pinned(&self) -> Vec<ClipEntry> {
        self.iter().filter(|e| e.pinned).cloned().collect()
    }

    /// Move an entry to the front without changing anything else.
    pub fn touch(&mut self, id: ClipId) -> ClipResult<()> {
        let slot = self.slot(id)?;
        self.order.move_to_front(slot);
        Ok(())
    }

    /// Set the pinned flag in place. Returns the previous value.
    pub fn set_pinned(&mut self, id: ClipId, pinned: bool) -> ClipResult<bool> {
        let slot = self.slot(id)?;
        let entry = self.order.get_mut(slot).ok_or(ClipError::NotFound(id))?;
        let previous = entry.pinned;
        entry.pinned = pinned;

        match (previous, pinned) {
            (false, true) => self.pinned += 1,
            (true, false) => self.pinned -= 1,
            _ => {}
        }
        Ok(previous)
    }

    pub fn pin(&mut self, id: ClipId) -> ClipResult<()> {
        self.set_pinned(id, true).map(|_| ())
    }

    pub fn unpin(&mut self, id: ClipId) -> ClipResult<()> {
        self.set_pinned(id, false).map(|_| ())
    }

    /// Remove an entry. Returns whether it was resident.
    pub fn remove(&mut self, id: ClipId) -> bool {
        self.take(id).is_some()
    }

    /// Remove and return an entry.
    pub fn take(&mut self, id: ClipId) -> Option<ClipEntry> {
        let slot = self.by_id.get(&id).copied()?;
        self.remove_slot(slot)
    }

    pub fn clear(&mut self) {
        self.order.clear();
        self.by_id.clear();
        self.by_payload.clear();
        self.pinned = 0;
    }

    /// Drop every unpinned entry. Returns how many were removed.
    pub fn clear_unpinned(&mut self) -> usize {
        let unpinned: Vec<ClipId> = self.iter().filter(|e| !e.pinned).map(|e| e.id).collect();
        for id in &unpinned {
            self.take(*id);
        }
        unpinned.len()
    }

    /// Dedup hit: move the resident entry at `slot` to the front.
    fn promote(&mut self, slot: Slot) -> Option<AddOutcome> {
        let entry = self.order.get(slot).cloned()?;
        self.order.move_to_front(slot);
        Some(AddOutcome {
            id: entry.id,
            entry,
            deduplicated: true,
            evicted: Vec::new(),
        })
    }

    fn slot(&self, id: ClipId) -> ClipResult<Slot> {
        self.by_id.get(&id).copied().ok_or(ClipError::NotFound(id))
    }

    fn insert_front(&mut self, entry: ClipEntry) -> Slot {
        let id = entry.id;
        let key = PayloadKey::of(&entry);
        if entry.pinned {
            self.pinned += 1;
        }
        let slot = self.order.push_front(entry);
        self.by_id.insert(id, slot);
        self.by_payload.insert(key, slot);
        slot
    }

    fn remove_slot(&mut self, slot: Slot) -> Option<ClipEntry> {
        let entry = self.order.remove(slot)?;
        self.by_id.remove(&entry.id);
        self.by_payload.remove(&PayloadKey::of(&entry));
        if entry.pinned {
            self.pinned -= 1;
        }
        Some(entry)
    }

    fn over_capacity(&self) -> bool {
        let counted = match self.policy {
            CapacityPolicy::CountAll => self.order.len(),
            CapacityPolicy::UnpinnedOnly => self.order.len() - self.pinned,
        };
        counted > self.capacity
    }

    /// Least recently used unpinned entry other than `keep`.
    fn lru_unpinned(&self, keep: Slot) -> Option<Slot> {
        let mut cursor = self.order.back();
        while let Some(slot) = cursor {
            match self.order.get(slot) {
                Some(entry) if !entry.pinned && slot != keep => return Some(slot),
                _ => cursor = self.order.prev(slot),
            }
        }
        None
    }

    /// Evict until within capacity, sparing the entry at `keep`.
    fn enforce_capacity(&mut self, keep: Slot) -> Vec<ClipEntry> {
        let mut evicted = Vec::new();
        while self.over_capacity() {
            let Some(slot) = self.lru_unpinned(keep) else {
                break;
            };
            match self.remove_slot(slot) {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        evicted
    }
}
