use heapguard::{
    render, BaseAllocator, Basis, CallSite, Format, FreeError, Heap, HeapConfig,
    HeavyHitterPolicy, Limit, SystemBase, HEADER_SIZE,
};
use std::ptr::NonNull;

/// Hands out memory from the system until a byte budget is used up.
struct BudgetBase {
    inner: SystemBase,
    remaining: usize,
    requests: Vec<usize>,
}

impl BudgetBase {
    fn new(budget: usize) -> Self {
        Self {
            inner: SystemBase::new(),
            remaining: budget,
            requests: Vec::new(),
        }
    }
}

unsafe impl BaseAllocator for BudgetBase {
    fn allocate(&mut self, bytes: usize) -> Option<NonNull<u8>> {
        self.requests.push(bytes);
        if bytes > self.remaining {
            return None;
        }
        let ptr = self.inner.allocate(bytes)?;
        self.remaining -= bytes;
        Some(ptr)
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, bytes: usize) {
        self.remaining += bytes;
        unsafe { self.inner.release(ptr, bytes) }
    }
}

fn site(line: u32) -> CallSite {
    CallSite::new("heap_tests.rs", line)
}

/// A heap that hands freed blocks straight back to its base.
fn unquarantined(budget: usize) -> Heap<BudgetBase> {
    let config = HeapConfig {
        quarantine: 0,
        ..HeapConfig::default()
    };
    Heap::with_config(BudgetBase::new(budget), config)
}

#[test]
fn test_base_sees_header_and_canary() {
    let mut heap = unquarantined(1 << 20);
    let ptr = heap.allocate(100, site(1)).unwrap();
    assert_eq!(heap.base().requests, vec![100 + HEADER_SIZE + 1]);

    heap.deallocate(ptr.as_ptr(), site(2));
    assert_eq!(heap.base().remaining, 1 << 20);
}

#[test]
fn test_budget_exhaustion_is_recoverable() {
    let per_block = 64 + HEADER_SIZE + 1;
    let mut heap = unquarantined(per_block * 2);

    let a = heap.allocate(64, site(1)).unwrap();
    let b = heap.allocate(64, site(1)).unwrap();
    assert!(heap.allocate(64, site(2)).is_none());

    let stats = heap.statistics();
    assert_eq!(stats.fail_count, 1);
    assert_eq!(stats.fail_bytes, 64);
    assert_eq!(stats.active_count, 2);

    heap.deallocate(a.as_ptr(), site(3));
    let c = heap.allocate(64, site(4)).unwrap();
    assert_eq!(heap.statistics().total_count, 3);

    heap.deallocate(b.as_ptr(), site(5));
    heap.deallocate(c.as_ptr(), site(5));
    assert_eq!(heap.base().remaining, per_block * 2);
}

#[test]
fn test_quarantine_holds_budget_until_evicted() {
    let per_block = 64 + HEADER_SIZE + 1;
    let config = HeapConfig {
        quarantine: 2,
        ..HeapConfig::default()
    };
    let mut heap = Heap::with_config(BudgetBase::new(per_block * 4), config);

    for expected_parked in [1, 2, 2, 2] {
        let ptr = heap.allocate(64, site(1)).unwrap();
        heap.deallocate(ptr.as_ptr(), site(2));
        assert_eq!(heap.quarantined(), expected_parked);
        assert_eq!(heap.base().remaining, per_block * (4 - expected_parked));
    }

    drop(heap);
}

#[test]
fn test_rejected_free_leaves_heap_usable() {
    let mut heap = Heap::new();
    let ptr = heap.allocate(32, site(1)).unwrap();
    let inner = unsafe { ptr.as_ptr().add(1) };

    let err = heap.try_deallocate(inner, site(2)).unwrap_err();
    assert!(matches!(err.reason, FreeError::NotAllocated { containing: Some(_) }));
    assert_eq!(heap.statistics().active_count, 1);

    assert_eq!(heap.try_deallocate(ptr.as_ptr(), site(3)), Ok(()));
    assert_eq!(heap.statistics().active_count, 0);
}

#[test]
fn test_every_size_keeps_canary_intact() {
    let mut heap = Heap::new();
    for size in 0..64 {
        let ptr = heap.allocate(size, site(1)).unwrap();
        unsafe { std::ptr::write_bytes(ptr.as_ptr(), 0xFF, size) };
        assert_eq!(heap.try_deallocate(ptr.as_ptr(), site(2)), Ok(()));
    }
}

#[test]
fn test_reports_in_json() {
    let config = HeapConfig {
        format: Format::Json,
        heavy_hitters: HeavyHitterPolicy {
            basis: Basis::AllTime,
            limit: Limit::Top(1),
        },
        ..HeapConfig::default()
    };
    let mut heap = Heap::with_config(SystemBase::new(), config);
    let leaked = heap.allocate(500, site(10)).unwrap();
    for _ in 0..3 {
        let ptr = heap.allocate(10, site(20)).unwrap();
        heap.deallocate(ptr.as_ptr(), site(21));
    }

    let mut out = Vec::new();
    heap.write_heavy_hitter_report(&mut out).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    let sites = value["heavy_hitters"]["sites"].as_array().unwrap();
    assert_eq!(sites.len(), 1);
    assert_eq!(sites[0]["site"]["line"], 10);
    assert_eq!(sites[0]["bytes"], 500);
    assert_eq!(value["heavy_hitters"]["basis"], "all-time");
    assert_eq!(value["heavy_hitters"]["total_bytes"], 530);

    let mut out = Vec::new();
    heap.write_leak_report(&mut out).unwrap();
    let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(value["leaks"][0]["address"], leaked.as_ptr() as usize);
    assert_eq!(value["leaks"][0]["size"], 500);
    assert_eq!(value["leaks"][0]["site"]["file"], "heap_tests.rs");
}

#[test]
fn test_render_statistics_table() {
    let mut heap = Heap::new();
    let ptr = heap.allocate(2048, site(1)).unwrap();

    let mut out = Vec::new();
    render(
        &heapguard::StatisticsReport(heap.statistics()),
        Format::Table,
        &mut out,
    )
    .unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("Allocation statistics"));
    assert!(text.contains("2.0 KB"));

    heap.deallocate(ptr.as_ptr(), site(2));
}
