use std::io::{self, Write};
use std::ptr::{self, NonNull};

use crate::base::{BaseAllocator, SystemBase};
use crate::config::HeapConfig;
use crate::error::{AllocError, FreeError, InvalidFree};
use crate::heavy::{HeavyHitterPolicy, HeavyHitterReport, SiteLedger};
use crate::layout::{self, HEADER_SIZE};
use crate::leaks::LeakReport;
use crate::location::CallSite;
use crate::output::{render, StatisticsReport, Tableable};
use crate::quarantine::{Parked, Quarantine};
use crate::stats::{Bounds, Counters, Statistics};
use crate::tracker::Tracker;
use crate::validate::Validator;

/// A debugging heap layered over a [`BaseAllocator`].
///
/// Every payload is preceded by a hidden header and followed by a canary
/// byte. Frees are validated before anything is touched; a bad free aborts
/// the process from [`Heap::deallocate`] or is returned as an error from
/// [`Heap::try_deallocate`].
///
/// Freed blocks are parked in a quarantine of [`HeapConfig::quarantine`]
/// blocks before they go back to the base allocator, so a repeated free of
/// a recent pointer is caught as a double free.
///
/// Dropping the heap releases every block that is still live or parked.
///
/// # Examples
///
/// ```rust
/// use heapguard::{CallSite, Heap};
///
/// let mut heap = Heap::new();
/// let site = CallSite::new(file!(), line!());
///
/// let ptr = heap.allocate(64, site).expect("allocation failed");
/// assert_eq!(heap.statistics().active_bytes, 64);
///
/// heap.deallocate(ptr.as_ptr(), site);
/// assert_eq!(heap.statistics().active_count, 0);
/// ```
pub struct Heap<B: BaseAllocator = SystemBase> {
    base: B,
    tracker: Tracker,
    bounds: Bounds,
    counters: Counters,
    sites: SiteLedger,
    quarantine: Quarantine,
    config: HeapConfig,
}

impl Heap<SystemBase> {
    pub fn new() -> Self {
        Self::with_base(SystemBase::new())
    }
}

impl Default for Heap<SystemBase> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: BaseAllocator> Heap<B> {
    pub fn with_base(base: B) -> Self {
        Self::with_config(base, HeapConfig::default())
    }

    pub fn with_config(base: B, config: HeapConfig) -> Self {
        Self {
            base,
            tracker: Tracker::new(),
            bounds: Bounds::default(),
            counters: Counters::default(),
            sites: SiteLedger::default(),
            quarantine: Quarantine::default(),
            config,
        }
    }

    pub fn base(&self) -> &B {
        &self.base
    }

    pub fn base_mut(&mut self) -> &mut B {
        &mut self.base
    }

    pub fn config(&self) -> &HeapConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut HeapConfig {
        &mut self.config
    }

    /// Returns `size` bytes of uninitialized memory, or `None` if the size
    /// overflows or the base allocator is exhausted. Zero-size requests get a
    /// unique pointer too.
    pub fn allocate(&mut self, size: usize, site: CallSite) -> Option<NonNull<u8>> {
        self.try_allocate(size, site).ok()
    }

    pub fn try_allocate(&mut self, size: usize, site: CallSite) -> Result<NonNull<u8>, AllocError> {
        let Some(total) = layout::total_size(size) else {
            return Err(self.fail(size, AllocError::SizeOverflow { requested: size }, site));
        };
        let Some(block) = self.base.allocate(total) else {
            return Err(self.fail(size, AllocError::Exhausted { requested: size }, site));
        };

        let addr = block.as_ptr() as usize + HEADER_SIZE;
        let handle = self.tracker.push_front(addr, size, site);
        // SAFETY: the base allocator returned `total` bytes aligned to
        // BLOCK_ALIGN.
        let payload = unsafe { layout::init_block(block, size, handle) };

        self.bounds.extend(addr, size);
        self.counters.record_alloc(size);
        self.sites.record_alloc(site, size);

        tracing::trace!(size, ptr = ?payload, %site, "allocate");
        Ok(payload)
    }

    fn fail(&mut self, size: usize, err: AllocError, site: CallSite) -> AllocError {
        tracing::debug!(size, %site, error = %err, "allocation failed");
        self.counters.record_failure(size);
        err
    }

    /// Returns zeroed memory for `count` elements of `size` bytes each.
    pub fn allocate_zeroed(
        &mut self,
        count: usize,
        size: usize,
        site: CallSite,
    ) -> Option<NonNull<u8>> {
        self.try_allocate_zeroed(count, size, site).ok()
    }

    pub fn try_allocate_zeroed(
        &mut self,
        count: usize,
        size: usize,
        site: CallSite,
    ) -> Result<NonNull<u8>, AllocError> {
        let Some(bytes) = count.checked_mul(size) else {
            let err = AllocError::ArrayOverflow { count, size };
            return Err(self.fail(count.wrapping_mul(size), err, site));
        };

        let payload = self.try_allocate(bytes, site)?;
        // SAFETY: the payload is `bytes` long and exclusively ours until
        // returned.
        unsafe { ptr::write_bytes(payload.as_ptr(), 0, bytes) };
        Ok(payload)
    }

    /// Frees a pointer returned by [`allocate`](Self::allocate). Null is a
    /// no-op.
    ///
    /// Any invalid free prints a diagnostic naming the call site, pointer
    /// and reason to stderr and aborts the process.
    pub fn deallocate(&mut self, ptr: *mut u8, site: CallSite) {
        if let Err(err) = self.try_deallocate(ptr, site) {
            abort_on(&err);
        }
    }

    /// Like [`deallocate`](Self::deallocate) but hands invalid frees back to
    /// the caller. A rejected free leaves the heap untouched.
    pub fn try_deallocate(&mut self, ptr: *mut u8, site: CallSite) -> Result<(), InvalidFree> {
        let Some(payload) = NonNull::new(ptr) else {
            return Ok(());
        };
        let addr = ptr as usize;
        let invalid = |reason| InvalidFree {
            site,
            ptr: addr,
            reason,
        };

        let handle = Validator {
            tracker: &self.tracker,
            bounds: &self.bounds,
            quarantine: &self.quarantine,
        }
        .check(payload)
        .map_err(invalid)?;

        let record = self
            .tracker
            .unlink(handle)
            .ok_or(invalid(FreeError::DoubleFree))?;

        self.counters.record_free(record.size);
        self.sites.record_free(record.site, record.size);

        tracing::trace!(size = record.size, ?ptr, %site, "deallocate");
        // SAFETY: validation proved this payload came from `try_allocate`,
        // whose block spans `size + HEADER_SIZE + 1` bytes.
        let block = unsafe { layout::block_of(payload) };
        self.quarantine.push(Parked {
            payload: addr,
            block,
            bytes: record.size + HEADER_SIZE + 1,
        });
        while let Some(parked) = self.quarantine.evict(self.config.quarantine) {
            // SAFETY: parked blocks are unlinked and were never released.
            unsafe { self.base.release(parked.block, parked.bytes) };
        }
        Ok(())
    }

    /// Number of freed blocks not yet returned to the base allocator.
    pub fn quarantined(&self) -> usize {
        self.quarantine.len()
    }

    pub fn statistics(&self) -> Statistics {
        self.counters.snapshot(&self.bounds)
    }

    /// Number of live allocations.
    pub fn live(&self) -> usize {
        self.tracker.len()
    }

    pub fn leaks(&self) -> LeakReport {
        LeakReport::collect(&self.tracker)
    }

    /// Heavy hitters under the configured policy.
    pub fn heavy_hitters(&self) -> HeavyHitterReport {
        self.heavy_hitters_with(self.config.heavy_hitters)
    }

    pub fn heavy_hitters_with(&self, policy: HeavyHitterPolicy) -> HeavyHitterReport {
        self.sites.rank(policy)
    }

    pub fn write_statistics(&self, out: &mut dyn Write) -> io::Result<()> {
        render(&StatisticsReport(self.statistics()), self.config.format, out)
    }

    pub fn write_leak_report(&self, out: &mut dyn Write) -> io::Result<()> {
        render(&self.leaks(), self.config.format, out)
    }

    pub fn write_heavy_hitter_report(&self, out: &mut dyn Write) -> io::Result<()> {
        render(&self.heavy_hitters(), self.config.format, out)
    }

    pub fn print_statistics(&self) {
        print_report(&StatisticsReport(self.statistics()), self.config);
    }

    pub fn print_leak_report(&self) {
        print_report(&self.leaks(), self.config);
    }

    pub fn print_heavy_hitter_report(&self) {
        print_report(&self.heavy_hitters(), self.config);
    }
}

fn print_report(report: &dyn Tableable, config: HeapConfig) {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    if let Err(err) = render(report, config.format, &mut out) {
        tracing::warn!(error = %err, "failed to write report");
    }
}

impl<B: BaseAllocator> Drop for Heap<B> {
    fn drop(&mut self) {
        while let Some(handle) = self.tracker.head() {
            let Some(record) = self.tracker.unlink(handle) else {
                break;
            };
            // SAFETY: every tracked payload is a live block from `base`.
            unsafe {
                let payload = NonNull::new_unchecked(record.payload as *mut u8);
                self.base
                    .release(layout::block_of(payload), record.size + HEADER_SIZE + 1);
            }
        }
        for parked in self.quarantine.drain() {
            // SAFETY: parked blocks are unlinked and were never released.
            unsafe { self.base.release(parked.block, parked.bytes) };
        }
    }
}

/// Reports an invalid free and terminates. Execution never continues on a
/// heap whose invariants are known to be broken.
pub(crate) fn abort_on(err: &InvalidFree) -> ! {
    tracing::error!(site = %err.site, ptr = err.ptr, reason = %err.reason, "invalid free");
    eprintln!("MEMORY BUG: {err}");
    if let Some(hint) = err.hint() {
        eprintln!("{hint}");
    }
    std::process::abort()
}
