use clap::{Parser, ValueEnum};
use eyre::{eyre, Result};
use heapguard::{Basis, CallSite, Format, Heap, HeapConfig, Limit};
use std::io::{self, Write};
use std::ptr::NonNull;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Free some blocks, keep the rest and list them
    Leaks,
    /// Allocate from a few sites with very different volumes
    HeavyHitters,
    /// Allocate and free a mix of sizes, then print the counters
    Statistics,
    /// Two zero-byte allocations get distinct pointers
    ZeroSize,
    /// A zeroed allocation whose element count overflows
    CallocOverflow,
    /// The base allocator refuses every request
    Exhausted,
    /// Free the same pointer twice (fatal)
    DoubleFree,
    /// Write one byte past the end of a block, then free it (fatal)
    WildWrite,
    /// Free a pointer to a stack variable (fatal)
    NotInHeap,
    /// Free a pointer into the middle of a block (fatal)
    NotAllocated,
}

#[derive(Debug, Parser)]
pub struct DemoArgs {
    #[arg(value_enum, help = "Scenario to run")]
    pub scenario: Scenario,

    #[arg(long, help = "Report format: text, table, json or json-pretty")]
    pub format: Option<Format>,

    #[arg(long, help = "Show only the N heaviest call sites (0 shows all)")]
    pub top: Option<usize>,

    #[arg(
        long,
        help = "Show call sites holding at least this percentage of bytes (default: 20)"
    )]
    pub share: Option<f64>,

    #[arg(long, help = "Rank heavy hitters by live bytes instead of all-time bytes")]
    pub live: bool,

    #[arg(long, help = "Freed blocks to hold back before releasing them (default: 64)")]
    pub quarantine: Option<usize>,
}

impl DemoArgs {
    pub fn run(&self) -> Result<()> {
        let config = self.config()?;
        let mut heap = Heap::with_config(heapguard::SystemBase::new(), config);
        let stdout = io::stdout();
        let mut out = stdout.lock();

        tracing::debug!(scenario = ?self.scenario, format = %config.format, "running demo");
        let result = match self.scenario {
            Scenario::Leaks => leaks(&mut heap, &mut out),
            Scenario::HeavyHitters => heavy_hitters(&mut heap, &mut out),
            Scenario::Statistics => statistics(&mut heap, &mut out),
            Scenario::ZeroSize => zero_size(&mut heap, &mut out),
            Scenario::CallocOverflow => calloc_overflow(&mut heap, &mut out),
            Scenario::Exhausted => exhausted(&mut heap, &mut out),
            Scenario::DoubleFree => double_free(&mut heap),
            Scenario::WildWrite => wild_write(&mut heap),
            Scenario::NotInHeap => not_in_heap(&mut heap),
            Scenario::NotAllocated => not_allocated(&mut heap),
        };
        result?;

        out.flush()?;
        Ok(())
    }

    fn config(&self) -> Result<HeapConfig> {
        let mut config = HeapConfig::from_env();
        if let Some(format) = self.format {
            config.format = format;
        }
        if self.live {
            config.heavy_hitters.basis = Basis::Live;
        }
        if let Some(share) = self.share {
            if !(0.0..=100.0).contains(&share) {
                return Err(eyre!("--share must be between 0 and 100, got {share}"));
            }
            config.heavy_hitters.limit = Limit::Share(share / 100.0);
        }
        if let Some(top) = self.top {
            config.heavy_hitters.limit = Limit::Top(top);
        }
        if let Some(blocks) = self.quarantine {
            config.quarantine = blocks;
        }
        Ok(config)
    }
}

type DemoHeap = Heap<heapguard::SystemBase>;

#[track_caller]
fn alloc(heap: &mut DemoHeap, size: usize) -> Result<NonNull<u8>> {
    let site = CallSite::caller();
    heap.allocate(size, site)
        .ok_or_else(|| eyre!("{site}: allocation of {size} bytes failed"))
}

fn leaks(heap: &mut DemoHeap, out: &mut dyn Write) -> Result<()> {
    for i in 0..10 {
        let ptr = alloc(heap, 1 + i * 8)?;
        if i % 3 == 0 {
            heap.deallocate(ptr.as_ptr(), CallSite::caller());
        }
    }
    let buffer = alloc(heap, 4096)?;
    let kept = alloc(heap, 100)?;
    heap.deallocate(buffer.as_ptr(), CallSite::caller());
    tracing::debug!(ptr = ?kept, "left live on purpose");

    heap.write_statistics(out)?;
    heap.write_leak_report(out)?;
    Ok(())
}

fn heavy_hitters(heap: &mut DemoHeap, out: &mut dyn Write) -> Result<()> {
    for i in 0..1000 {
        let small = alloc(heap, 16)?;
        heap.deallocate(small.as_ptr(), CallSite::caller());

        if i % 10 == 0 {
            let large = alloc(heap, 1024)?;
            heap.deallocate(large.as_ptr(), CallSite::caller());
        }
        if i % 100 == 0 {
            // Never freed, so it dominates the live ranking.
            alloc(heap, 2048)?;
        }
    }

    heap.write_heavy_hitter_report(out)?;
    Ok(())
}

fn statistics(heap: &mut DemoHeap, out: &mut dyn Write) -> Result<()> {
    let mut live = Vec::new();
    for size in [0, 1, 15, 16, 17, 255, 4096] {
        live.push(alloc(heap, size)?);
    }
    for ptr in live.drain(..).step_by(2) {
        heap.deallocate(ptr.as_ptr(), CallSite::caller());
    }

    heap.write_statistics(out)?;
    Ok(())
}

fn zero_size(heap: &mut DemoHeap, out: &mut dyn Write) -> Result<()> {
    let a = alloc(heap, 0)?;
    let b = alloc(heap, 0)?;
    writeln!(out, "zero-size pointers: {:p} {:p}", a, b)?;
    if a == b {
        return Err(eyre!("zero-size allocations alias"));
    }

    heap.deallocate(a.as_ptr(), CallSite::caller());
    heap.deallocate(b.as_ptr(), CallSite::caller());
    heap.write_statistics(out)?;
    Ok(())
}

fn calloc_overflow(heap: &mut DemoHeap, out: &mut dyn Write) -> Result<()> {
    let count = usize::MAX / 8 + 2;
    if heap.allocate_zeroed(count, 8, CallSite::caller()).is_some() {
        return Err(eyre!("overflowing zeroed allocation succeeded"));
    }
    let ptr = heap
        .allocate_zeroed(16, 8, CallSite::caller())
        .ok_or_else(|| eyre!("zeroed allocation failed"))?;
    heap.deallocate(ptr.as_ptr(), CallSite::caller());

    heap.write_statistics(out)?;
    Ok(())
}

fn exhausted(heap: &mut DemoHeap, out: &mut dyn Write) -> Result<()> {
    let before = alloc(heap, 64)?;
    heap.base_mut().set_disabled(true);
    for size in [1, 100, 10_000] {
        if heap.allocate(size, CallSite::caller()).is_some() {
            return Err(eyre!("disabled base allocator handed out memory"));
        }
    }
    heap.base_mut().set_disabled(false);
    heap.deallocate(before.as_ptr(), CallSite::caller());

    heap.write_statistics(out)?;
    Ok(())
}

fn double_free(heap: &mut DemoHeap) -> Result<()> {
    let ptr = alloc(heap, 32)?;
    heap.deallocate(ptr.as_ptr(), CallSite::caller());
    heap.deallocate(ptr.as_ptr(), CallSite::caller());
    Ok(())
}

fn wild_write(heap: &mut DemoHeap) -> Result<()> {
    let ptr = alloc(heap, 10)?;
    // SAFETY: the canary byte right after the payload is part of the block.
    unsafe { ptr.as_ptr().add(10).write(0) };
    heap.deallocate(ptr.as_ptr(), CallSite::caller());
    Ok(())
}

fn not_in_heap(heap: &mut DemoHeap) -> Result<()> {
    let _live = alloc(heap, 8)?;
    let mut local = 0u8;
    heap.deallocate(&mut local, CallSite::caller());
    Ok(())
}

fn not_allocated(heap: &mut DemoHeap) -> Result<()> {
    let ptr = alloc(heap, 100)?;
    // SAFETY: stays inside the 100 byte payload.
    let inner = unsafe { ptr.as_ptr().add(16) };
    heap.deallocate(inner, CallSite::caller());
    Ok(())
}
