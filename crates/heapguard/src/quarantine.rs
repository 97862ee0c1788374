//! Freed blocks parked before they go back to the base allocator.
//!
//! While a block sits here nobody else can be handed its address, so a
//! second free of the same pointer is known to be a double free. Once the
//! block is evicted the address is forgotten.

use std::collections::{HashSet, VecDeque};
use std::ptr::NonNull;

pub(crate) const DEFAULT_QUARANTINE: usize = 64;

pub(crate) struct Parked {
    pub payload: usize,
    pub block: NonNull<u8>,
    pub bytes: usize,
}

#[derive(Default)]
pub(crate) struct Quarantine {
    blocks: VecDeque<Parked>,
    payloads: HashSet<usize>,
}

impl Quarantine {
    pub fn push(&mut self, parked: Parked) {
        self.payloads.insert(parked.payload);
        self.blocks.push_back(parked);
    }

    /// Removes the oldest block once more than `capacity` are parked.
    pub fn evict(&mut self, capacity: usize) -> Option<Parked> {
        if self.blocks.len() <= capacity {
            return None;
        }
        let parked = self.blocks.pop_front()?;
        self.payloads.remove(&parked.payload);
        Some(parked)
    }

    pub fn drain(&mut self) -> impl Iterator<Item = Parked> + '_ {
        self.payloads.clear();
        self.blocks.drain(..)
    }

    pub fn contains(&self, payload: usize) -> bool {
        self.payloads.contains(&payload)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }
}
