//! Block layout and the only pointer arithmetic in the crate.
//!
//! Every block obtained from the base allocator looks like this:
//!
//! ```text
//! block                      payload                  payload + size
//! |<------ HEADER_SIZE ----->|<------- size -------->|<- 1 ->|
//! | BlockHeader (+ padding)  | caller's bytes        |CANARY |
//! ```
//!
//! The block start is aligned to [`BLOCK_ALIGN`] and `HEADER_SIZE` is a
//! multiple of it, so payloads are aligned as well.

use std::mem::{align_of, size_of};
use std::ptr::{self, NonNull};

use crate::tracker::Handle;

/// Alignment of every block and every payload.
pub const BLOCK_ALIGN: usize = 16;

/// Marks a header written by this heap.
pub const MAGIC: u64 = 0xDEAD_BEEF_CAFE_F00D;

/// Byte written directly after each payload.
pub const CANARY: u8 = b'@';

/// Bytes of bookkeeping in front of each payload.
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

const _: () = assert!(HEADER_SIZE % BLOCK_ALIGN == 0);
const _: () = assert!(align_of::<BlockHeader>() == BLOCK_ALIGN);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C, align(16))]
pub(crate) struct BlockHeader {
    pub payload: usize,
    pub size: usize,
    pub handle: Handle,
    pub magic: u64,
}

/// Bytes requested from the base allocator for a `size` byte payload, or
/// `None` if that does not fit in `usize`.
pub const fn total_size(size: usize) -> Option<usize> {
    size.checked_add(HEADER_SIZE + 1)
}

/// Address of the header belonging to `payload`. Wraps instead of panicking
/// so foreign pointers can still be diagnosed.
#[inline]
pub(crate) fn header_addr(payload: usize) -> usize {
    payload.wrapping_sub(HEADER_SIZE)
}

#[inline]
pub(crate) fn is_header_aligned(payload: usize) -> bool {
    header_addr(payload) % BLOCK_ALIGN == 0
}

/// Writes the header and canary into a fresh block and returns the payload.
///
/// # Safety
///
/// `block` must be valid for writes of `total_size(size)` bytes and aligned
/// to `BLOCK_ALIGN`.
pub(crate) unsafe fn init_block(block: NonNull<u8>, size: usize, handle: Handle) -> NonNull<u8> {
    unsafe {
        let payload = block.add(HEADER_SIZE);
        let header = BlockHeader {
            payload: payload.as_ptr() as usize,
            size,
            handle,
            magic: MAGIC,
        };
        ptr::write(block.as_ptr().cast::<BlockHeader>(), header);
        ptr::write(payload.as_ptr().add(size), CANARY);
        payload
    }
}

/// Block start for a payload this heap handed out.
///
/// # Safety
///
/// `payload` must have been returned by `init_block`.
#[inline]
pub(crate) unsafe fn block_of(payload: NonNull<u8>) -> NonNull<u8> {
    unsafe { payload.sub(HEADER_SIZE) }
}

/// # Safety
///
/// `payload` must belong to a block that is still allocated from the base.
pub(crate) unsafe fn read_header(payload: NonNull<u8>) -> BlockHeader {
    unsafe { ptr::read(block_of(payload).as_ptr().cast::<BlockHeader>()) }
}

/// # Safety
///
/// `payload` must belong to a live block whose payload is `size` bytes.
pub(crate) unsafe fn canary_intact(payload: NonNull<u8>, size: usize) -> bool {
    unsafe { ptr::read(payload.as_ptr().add(size)) == CANARY }
}
