use heapguard::{GuardBuilder, Reporter, Summary};
use std::error::Error;

/// Prints one line per leaked block through `tracing`.
struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, summary: &Summary) -> Result<(), Box<dyn Error>> {
        tracing::info!(
            caller = %summary.caller_name,
            active = summary.statistics.active_count,
            total = summary.statistics.total_count,
            "heap summary"
        );
        for leak in &summary.leaks.entries {
            tracing::warn!(site = %leak.site, address = leak.address, size = leak.size, "leak");
        }
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let _guard = GuardBuilder::new("custom_reporter")
        .reporter(Box::new(TracingReporter))
        .build();

    let a = heapguard::malloc!(128);
    let _b = heapguard::malloc!(256);
    heapguard::free!(a);
}
