//! A debugging heap.
//!
//! Every block handed out by [`Heap`] carries a hidden header in front of
//! the payload and a canary byte behind it. Frees are checked for pointers
//! that were never allocated, double frees and writes past the end of a
//! block. Any of those is fatal. On top of that the heap keeps running
//! statistics, lists leaked blocks and ranks the call sites that allocate the
//! most memory.
//!
//! Most programs use the thread-local heap through [`malloc!`], [`calloc!`]
//! and [`free!`], which record the call site of each request:
//!
//! ```rust
//! let ptr = heapguard::malloc!(32);
//! assert!(!ptr.is_null());
//! heapguard::free!(ptr);
//!
//! assert_eq!(heapguard::statistics().active_count, 0);
//! ```
//!
//! Containers can allocate from the same heap through [`HeapAllocator`].
//!
//! With the `heapguard-off` feature the free functions and macros call the
//! C allocator directly and nothing is checked or recorded.

use std::cell::RefCell;
#[cfg(not(feature = "heapguard-off"))]
use std::ptr::{self, NonNull};

pub use heapguard_macros::main;

mod allocator;
mod base;
mod config;
mod error;
mod guard;
mod heap;
mod heavy;
mod layout;
mod leaks;
mod location;
pub mod output;
mod quarantine;
mod stats;
mod tracker;
mod validate;

pub use allocator::HeapAllocator;
pub use base::{BaseAllocator, SystemBase};
pub use config::{HeapConfig, ParseError};
pub use error::{AllocError, Containing, FreeError, InvalidFree};
pub use guard::{GuardBuilder, HeapGuard};
pub use heap::Heap;
pub use heavy::{Basis, HeavyHitter, HeavyHitterPolicy, HeavyHitterReport, Limit};
pub use layout::{BLOCK_ALIGN, CANARY, HEADER_SIZE, MAGIC};
pub use leaks::{LeakEntry, LeakReport};
pub use location::CallSite;
pub use output::{render, Format, Reporter, StatisticsReport, Summary, Tableable};
pub use stats::Statistics;

thread_local! {
    static HEAP: RefCell<Heap<SystemBase>> =
        RefCell::new(Heap::with_config(SystemBase::new(), HeapConfig::from_env()));
}

/// Runs `f` with the calling thread's heap, configured from the
/// `HEAPGUARD_*` environment variables on first use.
///
/// # Panics
///
/// Panics when called from inside another `with_heap` closure.
pub fn with_heap<R>(f: impl FnOnce(&mut Heap<SystemBase>) -> R) -> R {
    HEAP.with(|heap| f(&mut heap.borrow_mut()))
}

/// Allocates `size` bytes from the thread-local heap. Returns null on
/// failure.
#[track_caller]
pub fn malloc(size: usize) -> *mut u8 {
    malloc_at(size, CallSite::caller())
}

#[cfg(not(feature = "heapguard-off"))]
pub fn malloc_at(size: usize, site: CallSite) -> *mut u8 {
    with_heap(|heap| heap.allocate(size, site)).map_or(ptr::null_mut(), NonNull::as_ptr)
}

#[cfg(feature = "heapguard-off")]
pub fn malloc_at(size: usize, _site: CallSite) -> *mut u8 {
    // SAFETY: any size may be requested; failure is a null return.
    unsafe { libc::malloc(size).cast() }
}

/// Allocates zeroed memory for `count` elements of `size` bytes. Returns
/// null on failure, including when `count * size` overflows.
#[track_caller]
pub fn calloc(count: usize, size: usize) -> *mut u8 {
    calloc_at(count, size, CallSite::caller())
}

#[cfg(not(feature = "heapguard-off"))]
pub fn calloc_at(count: usize, size: usize, site: CallSite) -> *mut u8 {
    with_heap(|heap| heap.allocate_zeroed(count, size, site)).map_or(ptr::null_mut(), NonNull::as_ptr)
}

#[cfg(feature = "heapguard-off")]
pub fn calloc_at(count: usize, size: usize, _site: CallSite) -> *mut u8 {
    // SAFETY: calloc checks `count * size` for overflow itself.
    unsafe { libc::calloc(count, size).cast() }
}

/// Frees memory from [`malloc`] or [`calloc`]. Aborts the process on an
/// invalid free.
#[track_caller]
pub fn free(ptr: *mut u8) {
    free_at(ptr, CallSite::caller())
}

#[cfg(not(feature = "heapguard-off"))]
pub fn free_at(ptr: *mut u8, site: CallSite) {
    with_heap(|heap| heap.deallocate(ptr, site))
}

#[cfg(feature = "heapguard-off")]
pub fn free_at(ptr: *mut u8, _site: CallSite) {
    // SAFETY: with the heap off, every pointer handed out came from
    // `malloc_at` or `calloc_at` above.
    unsafe { libc::free(ptr.cast()) }
}

pub fn statistics() -> Statistics {
    with_heap(|heap| heap.statistics())
}

pub fn print_statistics() {
    with_heap(|heap| heap.print_statistics())
}

pub fn print_leak_report() {
    with_heap(|heap| heap.print_leak_report())
}

pub fn print_heavy_hitter_report() {
    with_heap(|heap| heap.print_heavy_hitter_report())
}

/// Allocates from the thread-local heap, recording the macro's call site.
///
/// ```rust
/// let ptr = heapguard::malloc!(16);
/// heapguard::free!(ptr);
/// ```
#[macro_export]
macro_rules! malloc {
    ($size:expr) => {
        $crate::malloc_at($size, $crate::CallSite::new(file!(), line!()))
    };
}

/// Zero-initialized counterpart of [`malloc!`].
#[macro_export]
macro_rules! calloc {
    ($count:expr, $size:expr) => {
        $crate::calloc_at($count, $size, $crate::CallSite::new(file!(), line!()))
    };
}

#[macro_export]
macro_rules! free {
    ($ptr:expr) => {
        $crate::free_at($ptr, $crate::CallSite::new(file!(), line!()))
    };
}
