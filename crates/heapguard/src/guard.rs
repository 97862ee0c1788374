use crate::heavy::{Basis, HeavyHitterPolicy, Limit};
use crate::output::{Format, FormatReporter, Reporter, Summary};
use crate::with_heap;

/// Builder for a [`HeapGuard`].
///
/// The guard reports the state of the calling thread's heap when it goes
/// out of scope: statistics, leaked blocks and heavy hitters. Anything not
/// set on the builder falls back to the heap's configuration, which is read
/// from the `HEAPGUARD_*` environment variables.
///
/// # Examples
///
/// Basic usage with default settings:
///
/// ```rust
/// use heapguard::GuardBuilder;
///
/// let _guard = GuardBuilder::new("my_program").build();
/// // Summary is printed when _guard goes out of scope
/// ```
///
/// Custom configuration:
///
/// ```rust
/// use heapguard::{Basis, Format, GuardBuilder, Limit};
///
/// let _guard = GuardBuilder::new("benchmark")
///     .format(Format::JsonPretty)
///     .basis(Basis::Live)
///     .limit(Limit::Top(5))
///     .build();
/// ```
///
/// With custom reporter:
///
/// ```rust
/// use heapguard::{GuardBuilder, Reporter, Summary};
///
/// struct LeakGate;
/// impl Reporter for LeakGate {
///     fn report(&self, summary: &Summary) -> Result<(), Box<dyn std::error::Error>> {
///         if !summary.leaks.entries.is_empty() {
///             return Err(format!("{} leaked blocks", summary.leaks.entries.len()).into());
///         }
///         Ok(())
///     }
/// }
///
/// let _guard = GuardBuilder::new("main")
///     .reporter(Box::new(LeakGate))
///     .build();
/// ```
///
/// # See Also
///
/// * [`main`](crate::main) - Attribute macro that wraps a function in a guard
/// * [`Reporter`] - Custom reporter trait
pub struct GuardBuilder {
    caller_name: &'static str,
    format: Option<Format>,
    basis: Option<Basis>,
    limit: Option<Limit>,
    reporter: Option<Box<dyn Reporter>>,
}

impl GuardBuilder {
    /// Creates a new `GuardBuilder`. The caller name identifies the run in
    /// the summary.
    pub fn new(caller_name: &'static str) -> Self {
        Self {
            caller_name,
            format: None,
            basis: None,
            limit: None,
            reporter: None,
        }
    }

    /// Sets the output format of the built-in reporter.
    pub fn format(mut self, format: Format) -> Self {
        self.format = Some(format);
        self
    }

    /// Sets both the heavy-hitter basis and limit.
    pub fn heavy_hitters(mut self, policy: HeavyHitterPolicy) -> Self {
        self.basis = Some(policy.basis);
        self.limit = Some(policy.limit);
        self
    }

    pub fn basis(mut self, basis: Basis) -> Self {
        self.basis = Some(basis);
        self
    }

    pub fn limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets a custom reporter. It overrides any format setting.
    pub fn reporter(mut self, reporter: Box<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn build(self) -> HeapGuard {
        let config = with_heap(|heap| *heap.config());
        let heavy_hitters = HeavyHitterPolicy {
            basis: self.basis.unwrap_or(config.heavy_hitters.basis),
            limit: self.limit.unwrap_or(config.heavy_hitters.limit),
        };
        let reporter = self.reporter.unwrap_or_else(|| {
            Box::new(FormatReporter {
                format: self.format.unwrap_or(config.format),
            })
        });

        tracing::debug!(caller = self.caller_name, "heap guard started");
        HeapGuard {
            caller_name: self.caller_name,
            heavy_hitters,
            reporter,
        }
    }
}

/// Reports the thread-local heap when dropped. Created by [`GuardBuilder`]
/// or the [`main`](crate::main) attribute.
pub struct HeapGuard {
    caller_name: &'static str,
    heavy_hitters: HeavyHitterPolicy,
    reporter: Box<dyn Reporter>,
}

impl HeapGuard {
    pub fn set_reporter(&mut self, reporter: Box<dyn Reporter>) {
        self.reporter = reporter;
    }

    /// The summary this guard would report right now.
    pub fn summary(&self) -> Summary {
        with_heap(|heap| Summary {
            caller_name: self.caller_name.to_string(),
            statistics: heap.statistics(),
            leaks: heap.leaks(),
            heavy_hitters: heap.heavy_hitters_with(self.heavy_hitters),
        })
    }
}

impl Drop for HeapGuard {
    fn drop(&mut self) {
        let summary = self.summary();
        if let Err(err) = self.reporter.report(&summary) {
            tracing::error!(caller = self.caller_name, error = %err, "heap report failed");
        }
    }
}
