//! The active-allocation list.
//!
//! Records live in a slot table and are chained through generation-checked
//! [`Handle`]s, so `prev`/`next` are plain indices rather than raw pointers.
//! Insertion is always at the head, giving most-recent-first order, and
//! unlinking is O(1). A side table from payload address to handle lets the
//! heap confirm a pointer is live before it ever dereferences it.

use std::collections::HashMap;

use crate::location::CallSite;

/// Stable reference to a tracker record.
///
/// The generation changes every time a slot is reused, so a handle to a
/// released record never resolves to its successor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(C)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub(crate) const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub payload: usize,
    pub size: usize,
    pub site: CallSite,
    pub prev: Option<Handle>,
    pub next: Option<Handle>,
}

impl Record {
    /// Whether `addr` falls strictly inside this payload, i.e. past its
    /// first byte but before its end.
    pub fn strictly_contains(&self, addr: usize) -> bool {
        addr > self.payload && addr - self.payload < self.size
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    record: Option<Record>,
}

#[derive(Debug, Default)]
pub struct Tracker {
    slots: Vec<Slot>,
    vacant: Vec<u32>,
    by_payload: HashMap<usize, Handle>,
    head: Option<Handle>,
    tail: Option<Handle>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_payload.is_empty()
    }

    pub fn head(&self) -> Option<Handle> {
        self.head
    }

    pub fn tail(&self) -> Option<Handle> {
        self.tail
    }

    /// Links a new record at the head of the list.
    pub fn push_front(&mut self, payload: usize, size: usize, site: CallSite) -> Handle {
        let handle = self.vacant_slot();
        let record = Record {
            payload,
            size,
            site,
            prev: None,
            next: self.head,
        };

        match self.head {
            Some(old_head) => {
                if let Some(old) = self.get_mut(old_head) {
                    old.prev = Some(handle);
                }
            }
            None => self.tail = Some(handle),
        }
        self.head = Some(handle);

        self.slots[handle.index as usize].record = Some(record);
        self.by_payload.insert(payload, handle);
        handle
    }

    fn vacant_slot(&mut self) -> Handle {
        if let Some(index) = self.vacant.pop() {
            let slot = &mut self.slots[index as usize];
            slot.generation = slot.generation.wrapping_add(1);
            Handle::new(index, slot.generation)
        } else {
            let index = u32::try_from(self.slots.len()).expect("tracker slot table exhausted");
            self.slots.push(Slot {
                generation: 0,
                record: None,
            });
            Handle::new(index, 0)
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&Record> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.record.as_ref()
    }

    fn get_mut(&mut self, handle: Handle) -> Option<&mut Record> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.record.as_mut()
    }

    /// Handle of the live record whose payload starts at `payload`.
    pub fn lookup(&self, payload: usize) -> Option<Handle> {
        self.by_payload.get(&payload).copied()
    }

    /// Checks that `handle` is correctly threaded into the chain: it is the
    /// head or has a live `prev` pointing back at it, and likewise for the
    /// tail and `next`.
    pub fn is_linked(&self, handle: Handle) -> bool {
        let Some(record) = self.get(handle) else {
            return false;
        };

        let prev_ok = match record.prev {
            None => self.head == Some(handle),
            Some(prev) => self.get(prev).is_some_and(|p| p.next == Some(handle)),
        };
        let next_ok = match record.next {
            None => self.tail == Some(handle),
            Some(next) => self.get(next).is_some_and(|n| n.prev == Some(handle)),
        };

        prev_ok && next_ok
    }

    /// Removes the record from the chain and frees its slot.
    pub fn unlink(&mut self, handle: Handle) -> Option<Record> {
        let record = {
            let slot = self.slots.get_mut(handle.index as usize)?;
            if slot.generation != handle.generation {
                return None;
            }
            slot.record.take()?
        };

        match record.prev {
            Some(prev) => {
                if let Some(p) = self.get_mut(prev) {
                    p.next = record.next;
                }
            }
            None => self.head = record.next,
        }
        match record.next {
            Some(next) => {
                if let Some(n) = self.get_mut(next) {
                    n.prev = record.prev;
                }
            }
            None => self.tail = record.prev,
        }

        self.by_payload.remove(&record.payload);
        self.vacant.push(handle.index);
        Some(record)
    }

    /// Live records from head (newest) to tail (oldest).
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            tracker: self,
            cursor: self.head,
        }
    }

    /// The live record whose payload strictly contains `addr`, if any.
    pub fn find_containing(&self, addr: usize) -> Option<&Record> {
        self.iter().find(|record| record.strictly_contains(addr))
    }
}

pub struct Iter<'a> {
    tracker: &'a Tracker,
    cursor: Option<Handle>,
}

impl<'a> Iterator for Iter<'a> {
    type Item = &'a Record;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.tracker.get(self.cursor?)?;
        self.cursor = record.next;
        Some(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SITE: CallSite = CallSite::new("tracker.rs", 1);

    fn payloads(tracker: &Tracker) -> Vec<usize> {
        tracker.iter().map(|r| r.payload).collect()
    }

    #[test]
    fn test_push_front_orders_newest_first() {
        let mut tracker = Tracker::new();
        assert!(tracker.is_empty());

        let a = tracker.push_front(0x1000, 8, SITE);
        assert_eq!(tracker.head(), Some(a));
        assert_eq!(tracker.tail(), Some(a));

        let b = tracker.push_front(0x2000, 8, SITE);
        let c = tracker.push_front(0x3000, 8, SITE);

        assert_eq!(tracker.len(), 3);
        assert_eq!(tracker.head(), Some(c));
        assert_eq!(tracker.tail(), Some(a));
        assert_eq!(payloads(&tracker), vec![0x3000, 0x2000, 0x1000]);
        assert!([a, b, c].iter().all(|h| tracker.is_linked(*h)));
    }

    #[test]
    fn test_unlink_middle_head_and_tail() {
        let mut tracker = Tracker::new();
        let a = tracker.push_front(0x1000, 8, SITE);
        let b = tracker.push_front(0x2000, 8, SITE);
        let c = tracker.push_front(0x3000, 8, SITE);

        let removed = tracker.unlink(b).unwrap();
        assert_eq!(removed.payload, 0x2000);
        assert_eq!(payloads(&tracker), vec![0x3000, 0x1000]);
        assert!(tracker.is_linked(a) && tracker.is_linked(c));

        tracker.unlink(c).unwrap();
        assert_eq!(tracker.head(), Some(a));
        tracker.unlink(a).unwrap();
        assert_eq!(tracker.head(), None);
        assert_eq!(tracker.tail(), None);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_stale_handle_does_not_resolve() {
        let mut tracker = Tracker::new();
        let a = tracker.push_front(0x1000, 8, SITE);
        tracker.unlink(a).unwrap();

        let b = tracker.push_front(0x2000, 8, SITE);
        assert_ne!(a, b);
        assert!(tracker.get(a).is_none());
        assert!(tracker.unlink(a).is_none());
        assert!(!tracker.is_linked(a));
        assert_eq!(tracker.get(b).unwrap().payload, 0x2000);
    }

    #[test]
    fn test_lookup_and_find_containing() {
        let mut tracker = Tracker::new();
        let a = tracker.push_front(0x1000, 0x100, SITE);
        tracker.push_front(0x2000, 0, SITE);

        assert_eq!(tracker.lookup(0x1000), Some(a));
        assert_eq!(tracker.lookup(0x1001), None);

        assert_eq!(tracker.find_containing(0x1010).unwrap().payload, 0x1000);
        assert!(tracker.find_containing(0x1000).is_none());
        assert!(tracker.find_containing(0x1100).is_none());
        assert!(tracker.find_containing(0x2000).is_none());
    }

    #[test]
    fn test_broken_back_link_is_detected() {
        let mut tracker = Tracker::new();
        let a = tracker.push_front(0x1000, 8, SITE);
        let b = tracker.push_front(0x2000, 8, SITE);

        tracker.get_mut(a).unwrap().prev = None;
        assert!(!tracker.is_linked(a));
        assert!(!tracker.is_linked(b));
    }
}
