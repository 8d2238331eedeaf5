//! Arena-backed doubly linked list used for recency ordering.
//!
//! Nodes live in a `Vec` and link to each other by slot index, so moving an
//! entry to the front is O(1) without shared ownership between neighbours.
//! Freed slots are recycled.

/// Index of a node in the arena.
pub(super) type Slot = usize;

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<Slot>,
    next: Option<Slot>,
}

/// Front is the most recently touched element.
#[derive(Debug)]
pub(super) struct OrderList<T> {
    nodes: Vec<Option<Node<T>>>,
    free: Vec<Slot>,
    head: Option<Slot>,
    tail: Option<Slot>,
    len: usize,
}

impl<T> OrderList<T> {
    pub(super) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub(super) fn len(&self) -> usize {
        self.len
    }

    pub(super) fn back(&self) -> Option<Slot> {
        self.tail
    }

    pub(super) fn prev(&self, slot: Slot) -> Option<Slot> {
        self.node(slot).and_then(|n| n.prev)
    }

    pub(super) fn get(&self, slot: Slot) -> Option<&T> {
        self.node(slot).map(|n| &n.value)
    }

    pub(super) fn get_mut(&mut self, slot: Slot) -> Option<&mut T> {
        self.nodes
            .get_mut(slot)
            .and_then(Option::as_mut)
            .map(|n| &mut n.value)
    }

    /// Insert at the front and return the slot holding the value.
    pub(super) fn push_front(&mut self, value: T) -> Slot {
        let node = Node {
            value,
            prev: None,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.attach_front(slot);
        self.len += 1;
        slot
    }

    /// Unlink and return the value at `slot`.
    pub(super) fn remove(&mut self, slot: Slot) -> Option<T> {
        self.node(slot)?;
        self.detach(slot);
        let node = self.nodes[slot].take()?;
        self.free.push(slot);
        self.len -= 1;
        Some(node.value)
    }

    pub(super) fn move_to_front(&mut self, slot: Slot) {
        if self.head == Some(slot) || self.node(slot).is_none() {
            return;
        }
        self.detach(slot);
        self.attach_front(slot);
    }

    pub(super) fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Values from front (most recent) to back.
    pub(super) fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn node(&self, slot: Slot) -> Option<&Node<T>> {
        self.nodes.get(slot).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, slot: Slot) -> Option<&mut Node<T>> {
        self.nodes.get_mut(slot).and_then(Option::as_mut)
    }

    fn detach(&mut self, slot: Slot) {
        let (prev, next) = match self.node(slot) {
            Some(n) => (n.prev, n.next),
            None => return,
        };

        match prev {
            Some(p) => {
                if let Some(n) = self.node_mut(p) {
                    n.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(nx) => {
                if let Some(n) = self.node_mut(nx) {
                    n.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(n) = self.node_mut(slot) {
            n.prev = None;
            n.next = None;
        }
    }

    fn attach_front(&mut self, slot: Slot) {
        let old_head = self.head;
        if let Some(n) = self.node_mut(slot) {
            n.prev = None;
            n.next = old_head;
        }
        if let Some(n) = old_head.and_then(|h| self.node_mut(h)) {
            n.prev = Some(slot);
        }
        self.head = Some(slot);
        if self.tail.is_none() {
            self.tail = Some(slot);
        }
    }
}

pub(super) struct Iter<'a, T> {
    list: &'a OrderList<T>,
    cursor: Option<Slot>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.list.node(self.cursor?)?;
        self.cursor = node.next;
        Some(&node.value)
    }
}
