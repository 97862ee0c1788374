use std::alloc::{GlobalAlloc, Layout, System};
use std::ptr::NonNull;

use crate::layout::BLOCK_ALIGN;

/// The allocator underneath the debugging heap.
///
/// `Heap` never touches raw address space itself; every block it hands out
/// is carved from memory obtained here and given back here.
///
/// # Safety
///
/// `allocate` must return blocks aligned to [`BLOCK_ALIGN`] that are valid for
/// reads and writes of `bytes` bytes until passed to `release`.
pub unsafe trait BaseAllocator {
    fn allocate(&mut self, bytes: usize) -> Option<NonNull<u8>>;

    /// # Safety
    ///
    /// `ptr` must come from `allocate` on this allocator with the same `bytes`
    /// and must not have been released already.
    unsafe fn release(&mut self, ptr: NonNull<u8>, bytes: usize);
}

/// Base allocator backed by [`System`].
#[derive(Debug, Default)]
pub struct SystemBase {
    disabled: bool,
}

impl SystemBase {
    pub const fn new() -> Self {
        Self { disabled: false }
    }

    /// While disabled every request fails as if the system were out of memory.
    pub fn set_disabled(&mut self, disabled: bool) {
        self.disabled = disabled;
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled
    }
}

unsafe impl BaseAllocator for SystemBase {
    fn allocate(&mut self, bytes: usize) -> Option<NonNull<u8>> {
        if self.disabled || bytes == 0 {
            return None;
        }
        let layout = Layout::from_size_align(bytes, BLOCK_ALIGN).ok()?;
        // SAFETY: layout has non-zero size.
        NonNull::new(unsafe { System.alloc(layout) })
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, bytes: usize) {
        // SAFETY: caller guarantees `ptr` came from `allocate(bytes)`, which
        // already validated this layout.
        unsafe {
            let layout = Layout::from_size_align_unchecked(bytes, BLOCK_ALIGN);
            System.dealloc(ptr.as_ptr(), layout);
        }
    }
}
