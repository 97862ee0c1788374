use serde::Serialize;

/// Snapshot of the heap counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Statistics {
    /// Allocations not yet freed.
    pub active_count: u64,
    /// Payload bytes in active allocations.
    pub active_bytes: u64,
    /// Successful allocations ever made.
    pub total_count: u64,
    /// Payload bytes ever allocated.
    pub total_bytes: u64,
    /// Failed allocation attempts.
    pub fail_count: u64,
    /// Bytes requested by failed attempts.
    pub fail_bytes: u64,
    /// Lowest payload address ever returned, `usize::MAX` before the first.
    pub heap_min: usize,
    /// Highest payload end address ever returned, `0` before the first.
    pub heap_max: usize,
}

/// Address range covering every payload the heap has returned. It only
/// ever widens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Bounds {
    min: usize,
    max: usize,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: usize::MAX,
            max: 0,
        }
    }
}

impl Bounds {
    pub fn extend(&mut self, payload: usize, size: usize) {
        self.min = self.min.min(payload);
        self.max = self.max.max(payload.saturating_add(size));
    }

    pub fn contains(&self, addr: usize) -> bool {
        self.min <= addr && addr <= self.max
    }

    pub fn min(&self) -> usize {
        self.min
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Counters {
    active_bytes: u64,
    total_count: u64,
    total_bytes: u64,
    freed_count: u64,
    fail_count: u64,
    fail_bytes: u64,
}

impl Counters {
    pub fn record_alloc(&mut self, size: usize) {
        self.total_count += 1;
        self.total_bytes += size as u64;
        self.active_bytes += size as u64;
    }

    pub fn record_free(&mut self, size: usize) {
        self.freed_count += 1;
        self.active_bytes -= size as u64;
    }

    pub fn record_failure(&mut self, size: usize) {
        self.fail_count += 1;
        self.fail_bytes = self.fail_bytes.wrapping_add(size as u64);
    }

    pub fn snapshot(&self, bounds: &Bounds) -> Statistics {
        Statistics {
            active_count: self.total_count - self.freed_count,
            active_bytes: self.active_bytes,
            total_count: self.total_count,
            total_bytes: self.total_bytes,
            fail_count: self.fail_count,
            fail_bytes: self.fail_bytes,
            heap_min: bounds.min(),
            heap_max: bounds.max(),
        }
    }
}
