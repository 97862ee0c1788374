use serde::Serialize;

use crate::location::CallSite;
use crate::output::{format_bytes, Tableable};
use crate::tracker::Tracker;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LeakEntry {
    pub site: CallSite,
    pub address: usize,
    pub size: usize,
}

/// Every block still live, newest first.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LeakReport {
    pub entries: Vec<LeakEntry>,
}

impl LeakReport {
    pub(crate) fn collect(tracker: &Tracker) -> Self {
        let entries = tracker
            .iter()
            .map(|record| LeakEntry {
                site: record.site,
                address: record.payload,
                size: record.size,
            })
            .collect();
        Self { entries }
    }

    pub fn total_bytes(&self) -> u64 {
        self.entries.iter().map(|entry| entry.size as u64).sum()
    }
}

impl Tableable for LeakReport {
    fn title(&self) -> String {
        format!(
            "Leak check: {} live allocations ({})",
            self.entries.len(),
            format_bytes(self.total_bytes())
        )
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn headers(&self) -> Vec<String> {
        ["Call site", "Address", "Size"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn rows(&self) -> Vec<Vec<String>> {
        self.entries
            .iter()
            .map(|entry| {
                vec![
                    entry.site.to_string(),
                    format!("{:#x}", entry.address),
                    format_bytes(entry.size as u64),
                ]
            })
            .collect()
    }

    fn text_lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| {
                format!(
                    "LEAK CHECK: {}: allocated object {:#x} with size {}",
                    entry.site, entry.address, entry.size
                )
            })
            .collect()
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "leaks": self })
    }
}
