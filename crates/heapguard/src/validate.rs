//! Checks run on every free, in order. The first failure wins.

use std::ptr::NonNull;

use crate::error::{Containing, FreeError};
use crate::layout::{self, MAGIC};
use crate::quarantine::Quarantine;
use crate::stats::Bounds;
use crate::tracker::{Handle, Tracker};

pub(crate) struct Validator<'a> {
    pub tracker: &'a Tracker,
    pub bounds: &'a Bounds,
    pub quarantine: &'a Quarantine,
}

impl Validator<'_> {
    /// Returns the record handle of `ptr` if it may be freed.
    pub fn check(&self, ptr: NonNull<u8>) -> Result<Handle, FreeError> {
        let addr = ptr.as_ptr() as usize;

        if !self.bounds.contains(addr) {
            return Err(FreeError::NotInHeap);
        }
        let handle = self.check_identity(ptr)?;
        if !self.tracker.is_linked(handle) {
            return Err(FreeError::DoubleFree);
        }
        self.check_canary(ptr, handle)?;

        Ok(handle)
    }

    fn check_identity(&self, ptr: NonNull<u8>) -> Result<Handle, FreeError> {
        let addr = ptr.as_ptr() as usize;

        let Some(handle) = self.tracker.lookup(addr) else {
            // A parked block still belongs to this heap, so the pointer was
            // already freed. Evicted addresses may be anyone's by now.
            if self.quarantine.contains(addr) {
                return Err(FreeError::DoubleFree);
            }
            return Err(self.not_allocated(addr));
        };
        if !layout::is_header_aligned(addr) {
            return Err(self.not_allocated(addr));
        }

        // SAFETY: the tracker only knows payloads whose blocks are still
        // held from the base allocator.
        let header = unsafe { layout::read_header(ptr) };
        let Some(record) = self.tracker.get(handle) else {
            return Err(FreeError::DoubleFree);
        };
        if header.magic != MAGIC
            || header.payload != addr
            || header.handle != handle
            || header.size != record.size
        {
            return Err(self.not_allocated(addr));
        }

        for neighbor in [record.prev, record.next].into_iter().flatten() {
            let Some(neighbor) = self.tracker.get(neighbor) else {
                return Err(FreeError::DoubleFree);
            };
            let Some(payload) = NonNull::new(neighbor.payload as *mut u8) else {
                return Err(self.not_allocated(addr));
            };
            // SAFETY: neighbor is a live tracker record.
            if unsafe { layout::read_header(payload) }.magic != MAGIC {
                return Err(self.not_allocated(addr));
            }
        }

        Ok(handle)
    }

    fn check_canary(&self, ptr: NonNull<u8>, handle: Handle) -> Result<(), FreeError> {
        let Some(record) = self.tracker.get(handle) else {
            return Err(FreeError::DoubleFree);
        };
        // SAFETY: identity check established that `ptr` is this live record's
        // payload, which is followed by its canary byte.
        if unsafe { layout::canary_intact(ptr, record.size) } {
            Ok(())
        } else {
            Err(FreeError::WildWrite)
        }
    }

    fn not_allocated(&self, addr: usize) -> FreeError {
        let containing = self.tracker.find_containing(addr).map(|record| Containing {
            site: record.site,
            payload: record.payload,
            offset: addr - record.payload,
            size: record.size,
        });
        FreeError::NotAllocated { containing }
    }
}
