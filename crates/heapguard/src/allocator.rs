use std::alloc::Layout;
use std::ptr::NonNull;

use allocator_api2::alloc::{AllocError, Allocator};

use crate::layout::BLOCK_ALIGN;
use crate::location::CallSite;
use crate::with_heap;

/// Lets containers allocate from the thread-local heap.
///
/// Allocations show up in statistics, leak reports and heavy hitters under
/// [`CallSite::UNKNOWN`], since the container's call site is not visible
/// here. Layouts aligned beyond [`BLOCK_ALIGN`] are refused.
///
/// Containers must not be grown or dropped from inside a
/// [`with_heap`] closure.
///
/// ```rust
/// use heapguard::HeapAllocator;
///
/// let mut values = allocator_api2::vec::Vec::new_in(HeapAllocator);
/// values.push(1u64);
/// assert_eq!(heapguard::statistics().active_count, 1);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeapAllocator;

unsafe impl Allocator for HeapAllocator {
    fn allocate(&self, layout: Layout) -> Result<NonNull<[u8]>, AllocError> {
        if layout.align() > BLOCK_ALIGN {
            tracing::debug!(align = layout.align(), "refusing over-aligned layout");
            return Err(AllocError);
        }
        let ptr = with_heap(|heap| heap.allocate(layout.size(), CallSite::UNKNOWN))
            .ok_or(AllocError)?;
        Ok(NonNull::slice_from_raw_parts(ptr, layout.size()))
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, _layout: Layout) {
        with_heap(|heap| heap.deallocate(ptr.as_ptr(), CallSite::UNKNOWN))
    }
}
