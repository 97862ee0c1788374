use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::config::ParseError;
use crate::location::CallSite;
use crate::output::{format_bytes, Tableable};

/// Which bytes count towards a call site's weight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Basis {
    /// Every byte ever allocated from the site, freed or not.
    #[default]
    AllTime,
    /// Only bytes the site still holds.
    Live,
}

impl FromStr for Basis {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all-time" | "all" | "total" => Ok(Basis::AllTime),
            "live" | "active" => Ok(Basis::Live),
            other => Err(ParseError::new("basis", other)),
        }
    }
}

impl fmt::Display for Basis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Basis::AllTime => write!(f, "all-time"),
            Basis::Live => write!(f, "live"),
        }
    }
}

/// How many ranked sites make it into the report.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Limit {
    /// The first `n` sites, `0` meaning all of them.
    Top(usize),
    /// Sites holding at least this fraction (0.0 to 1.0) of all bytes.
    Share(f64),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeavyHitterPolicy {
    pub basis: Basis,
    pub limit: Limit,
}

impl Default for HeavyHitterPolicy {
    fn default() -> Self {
        Self {
            basis: Basis::AllTime,
            limit: Limit::Share(0.20),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct SiteTotals {
    all_time_bytes: u64,
    all_time_count: u64,
    live_bytes: u64,
    live_count: u64,
    first_seen: u64,
}

impl SiteTotals {
    fn bytes(&self, basis: Basis) -> u64 {
        match basis {
            Basis::AllTime => self.all_time_bytes,
            Basis::Live => self.live_bytes,
        }
    }

    fn count(&self, basis: Basis) -> u64 {
        match basis {
            Basis::AllTime => self.all_time_count,
            Basis::Live => self.live_count,
        }
    }
}

/// Per call site byte accounting, kept up to date on every allocate/free.
#[derive(Debug, Default)]
pub(crate) struct SiteLedger {
    sites: HashMap<CallSite, SiteTotals>,
    next_seq: u64,
}

impl SiteLedger {
    pub fn record_alloc(&mut self, site: CallSite, size: usize) {
        let next_seq = &mut self.next_seq;
        let totals = self.sites.entry(site).or_insert_with(|| {
            let first_seen = *next_seq;
            *next_seq += 1;
            SiteTotals {
                first_seen,
                ..SiteTotals::default()
            }
        });
        totals.all_time_bytes += size as u64;
        totals.all_time_count += 1;
        totals.live_bytes += size as u64;
        totals.live_count += 1;
    }

    pub fn record_free(&mut self, site: CallSite, size: usize) {
        if let Some(totals) = self.sites.get_mut(&site) {
            totals.live_bytes -= size as u64;
            totals.live_count -= 1;
        }
    }

    pub fn rank(&self, policy: HeavyHitterPolicy) -> HeavyHitterReport {
        let basis = policy.basis;
        let mut sites: Vec<_> = self
            .sites
            .iter()
            .filter(|(_, totals)| totals.bytes(basis) > 0)
            .collect();

        let grand_total: u64 = sites.iter().map(|(_, totals)| totals.bytes(basis)).sum();

        sites.sort_by(|(_, a), (_, b)| {
            b.bytes(basis)
                .cmp(&a.bytes(basis))
                .then(b.all_time_bytes.cmp(&a.all_time_bytes))
                .then(a.first_seen.cmp(&b.first_seen))
        });

        let ranked = sites.into_iter().map(|(site, totals)| {
            let bytes = totals.bytes(basis);
            HeavyHitter {
                site: *site,
                bytes,
                count: totals.count(basis),
                share: bytes as f64 / grand_total as f64,
            }
        });

        let entries = match policy.limit {
            Limit::Top(0) => ranked.collect(),
            Limit::Top(n) => ranked.take(n).collect(),
            Limit::Share(min) => ranked.take_while(|hitter| hitter.share >= min).collect(),
        };

        HeavyHitterReport {
            basis,
            total_bytes: grand_total,
            entries,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeavyHitter {
    pub site: CallSite,
    pub bytes: u64,
    pub count: u64,
    /// Fraction of all bytes under the chosen basis.
    pub share: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HeavyHitterReport {
    pub basis: Basis,
    pub total_bytes: u64,
    #[serde(rename = "sites")]
    pub entries: Vec<HeavyHitter>,
}

impl Tableable for HeavyHitterReport {
    fn title(&self) -> String {
        format!(
            "Heavy hitters by {} bytes ({} total)",
            self.basis,
            format_bytes(self.total_bytes)
        )
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn headers(&self) -> Vec<String> {
        ["Call site", "Allocs", "Bytes", "% Total"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.entries
            .iter()
            .map(|hitter| {
                vec![
                    hitter.site.to_string(),
                    hitter.count.to_string(),
                    format_bytes(hitter.bytes),
                    format!("{:.2}%", hitter.share * 100.0),
                ]
            })
            .collect()
    }

    fn text_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|hitter| {
                format!(
                    "HEAVY HITTER: {}: {} bytes (~{:.1}%)",
                    hitter.site,
                    hitter.bytes,
                    hitter.share * 100.0
                )
            })
            .collect()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "heavy_hitters": self })
    }
}
