use std::str::FromStr;
use thiserror::Error;

use crate::heavy::{Basis, HeavyHitterPolicy, Limit};
use crate::output::Format;
use crate::quarantine::DEFAULT_QUARANTINE;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {what}: {value:?}")]
pub struct ParseError {
    what: &'static str,
    value: String,
}

impl ParseError {
    pub(crate) fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

/// Reporting and quarantine configuration of a heap.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeapConfig {
    pub format: Format,
    pub heavy_hitters: HeavyHitterPolicy,
    /// Freed blocks held back from the base allocator. Double frees are
    /// only told apart from foreign pointers while the block is held.
    pub quarantine: usize,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            format: Format::default(),
            heavy_hitters: HeavyHitterPolicy::default(),
            quarantine: DEFAULT_QUARANTINE,
        }
    }
}

impl HeapConfig {
    /// Reads `HEAPGUARD_FORMAT`, `HEAPGUARD_HEAVY_BASIS`, `HEAPGUARD_HEAVY_TOP`,
    /// `HEAPGUARD_HEAVY_SHARE` and `HEAPGUARD_QUARANTINE`. Unset or malformed
    /// variables keep their defaults.
    ///
    /// `HEAPGUARD_HEAVY_TOP=0` lists every call site, like `--top 0`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(format) = parse_var::<Format>(&lookup, "HEAPGUARD_FORMAT") {
            config.format = format;
        }
        if let Some(basis) = parse_var::<Basis>(&lookup, "HEAPGUARD_HEAVY_BASIS") {
            config.heavy_hitters.basis = basis;
        }
        if let Some(percent) = parse_var::<f64>(&lookup, "HEAPGUARD_HEAVY_SHARE") {
            if (0.0..=100.0).contains(&percent) {
                config.heavy_hitters.limit = Limit::Share(percent / 100.0);
            } else {
                tracing::warn!(percent, "HEAPGUARD_HEAVY_SHARE out of range, ignoring");
            }
        }
        // A top-N limit wins over a share threshold when both are set.
        if let Some(top) = parse_var::<usize>(&lookup, "HEAPGUARD_HEAVY_TOP") {
            config.heavy_hitters.limit = Limit::Top(top);
        }
        if let Some(blocks) = parse_var::<usize>(&lookup, "HEAPGUARD_QUARANTINE") {
            config.quarantine = blocks;
        }

        config
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key, value = %raw, error = %err, "ignoring malformed setting");
            None
        }
    }
}
