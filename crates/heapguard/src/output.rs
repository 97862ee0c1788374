use colored::*;
use prettytable::{color, Attr, Cell, Row, Table};
use serde::Serialize;
use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use crate::config::ParseError;
use crate::heavy::HeavyHitterReport;
use crate::leaks::LeakReport;
use crate::stats::Statistics;

/// How reports are written.
///
/// * `Text` - the classic one-line-per-entry diagnostics
/// * `Table` - aligned tables with a `[heapguard]` title
/// * `Json` / `JsonPretty` - machine readable output
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Text,
    Table,
    Json,
    JsonPretty,
}

impl FromStr for Format {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(Format::Text),
            "table" => Ok(Format::Table),
            "json" => Ok(Format::Json),
            "json-pretty" | "json_pretty" => Ok(Format::JsonPretty),
            other => Err(ParseError::new("format", other)),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Text => write!(f, "text"),
            Format::Table => write!(f, "table"),
            Format::Json => write!(f, "json"),
            Format::JsonPretty => write!(f, "json-pretty"),
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", bytes, UNITS[unit_idx])
    } else {
        format!("{:.1} {}", size, UNITS[unit_idx])
    }
}

/// A report that can be drawn in every [`Format`].
pub trait Tableable {
    fn title(&self) -> String;

    /// Empty reports print nothing at all.
    fn is_empty(&self) -> bool {
        false
    }

    fn headers(&self) -> Vec<String>;

    fn rows(&self) -> Vec<Vec<String>>;

    fn text_lines(&self) -> Vec<String>;

    fn to_json(&self) -> serde_json::Value;
}

pub fn render(report: &dyn Tableable, format: Format, out: &mut dyn Write) -> io::Result<()> {
    if report.is_empty() {
        return Ok(());
    }

    match format {
        Format::Text => {
            for line in report.text_lines() {
                writeln!(out, "{line}")?;
            }
        }
        Format::Table => {
            writeln!(out, "{} {}", "[heapguard]".blue().bold(), report.title())?;
            build_table(report).print(out)?;
        }
        Format::Json => {
            serde_json::to_writer(&mut *out, &report.to_json())?;
            writeln!(out)?;
        }
        Format::JsonPretty => {
            serde_json::to_writer_pretty(&mut *out, &report.to_json())?;
            writeln!(out)?;
        }
    }
    Ok(())
}

fn build_table(report: &dyn Tableable) -> Table {
    let use_colors = std::env::var("NO_COLOR").is_err();

    let mut table = Table::new();
    let header_cells: Vec<Cell> = report
        .headers()
        .iter()
        .map(|header| {
            if use_colors {
                Cell::new(header)
                    .with_style(Attr::Bold)
                    .with_style(Attr::ForegroundColor(color::CYAN))
            } else {
                Cell::new(header).with_style(Attr::Bold)
            }
        })
        .collect();
    table.add_row(Row::new(header_cells));

    for row in report.rows() {
        table.add_row(Row::new(row.iter().map(|value| Cell::new(value)).collect()));
    }
    table
}

/// Counter snapshot rendered as the classic two-line summary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StatisticsReport(pub Statistics);

impl Tableable for StatisticsReport {
    fn title(&self) -> String {
        format!(
            "Allocation statistics (heap {:#x}..{:#x})",
            self.0.heap_min, self.0.heap_max
        )
    }

    fn headers(&self) -> Vec<String> {
        ["", "Active", "Total", "Fail"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    fn rows(&self) -> Vec<Vec<String>> {
        let s = &self.0;
        vec![
            vec![
                "count".to_string(),
                s.active_count.to_string(),
                s.total_count.to_string(),
                s.fail_count.to_string(),
            ],
            vec![
                "size".to_string(),
                format_bytes(s.active_bytes),
                format_bytes(s.total_bytes),
                format_bytes(s.fail_bytes),
            ],
        ]
    }

    fn text_lines(&self) -> Vec<String> {
        let s = &self.0;
        vec![
            format!(
                "alloc count: active {:>10}   total {:>10}   fail {:>10}",
                s.active_count, s.total_count, s.fail_count
            ),
            format!(
                "alloc size:  active {:>10}   total {:>10}   fail {:>10}",
                s.active_bytes, s.total_bytes, s.fail_bytes
            ),
        ]
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({ "statistics": self.0 })
    }
}

/// Everything a [`HeapGuard`](crate::HeapGuard) reports when it goes out of
/// scope.
#[derive(Clone, Debug, Serialize)]
pub struct Summary {
    pub caller_name: String,
    pub statistics: Statistics,
    pub leaks: LeakReport,
    pub heavy_hitters: HeavyHitterReport,
}

/// Trait for implementing custom end-of-run output.
///
/// # Examples
///
/// ```rust
/// use heapguard::{Reporter, Summary};
/// use std::error::Error;
///
/// struct LeakCounter;
///
/// impl Reporter for LeakCounter {
///     fn report(&self, summary: &Summary) -> Result<(), Box<dyn Error>> {
///         println!("{}: {} leaks", summary.caller_name, summary.leaks.entries.len());
///         Ok(())
///     }
/// }
/// ```
pub trait Reporter {
    fn report(&self, summary: &Summary) -> Result<(), Box<dyn std::error::Error>>;
}

/// Writes a [`Summary`] to stderr in one of the built-in formats.
pub(crate) struct FormatReporter {
    pub format: Format,
}

impl Reporter for FormatReporter {
    fn report(&self, summary: &Summary) -> Result<(), Box<dyn std::error::Error>> {
        let stderr = io::stderr();
        let mut out = stderr.lock();

        match self.format {
            Format::Json => {
                serde_json::to_writer(&mut out, summary)?;
                writeln!(out)?;
            }
            Format::JsonPretty => {
                serde_json::to_writer_pretty(&mut out, summary)?;
                writeln!(out)?;
            }
            Format::Text | Format::Table => {
                if self.format == Format::Table {
                    writeln!(
                        out,
                        "\n{} Heap summary from {}:",
                        "[heapguard]".blue().bold(),
                        summary.caller_name.yellow().bold()
                    )?;
                }
                render(&StatisticsReport(summary.statistics), self.format, &mut out)?;
                render(&summary.leaks, self.format, &mut out)?;
                render(&summary.heavy_hitters, self.format, &mut out)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> Statistics {
        Statistics {
            active_count: 2,
            active_bytes: 30,
            total_count: 5,
            total_bytes: 4096,
            fail_count: 1,
            fail_bytes: 7,
            heap_min: 0x1000,
            heap_max: 0x2000,
        }
    }

    fn rendered(report: &dyn Tableable, format: Format) -> String {
        let mut out = Vec::new();
        render(report, format, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn test_statistics_text() {
        let text = rendered(&StatisticsReport(stats()), Format::Text);
        assert_eq!(
            text,
            "alloc count: active          2   total          5   fail          1\n\
             alloc size:  active         30   total       4096   fail          7\n"
        );
    }

    #[test]
    fn test_statistics_table() {
        let text = rendered(&StatisticsReport(stats()), Format::Table);
        assert!(text.contains("[heapguard]"));
        assert!(text.contains("Active"));
        assert!(text.contains("4.0 KB"));
    }

    #[test]
    fn test_statistics_json() {
        let text = rendered(&StatisticsReport(stats()), Format::Json);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["statistics"]["total_bytes"], 4096);
        assert_eq!(value["statistics"]["heap_min"], 0x1000);

        let pretty = rendered(&StatisticsReport(stats()), Format::JsonPretty);
        let pretty_value: serde_json::Value = serde_json::from_str(&pretty).unwrap();
        assert_eq!(value, pretty_value);
    }

    #[test]
    fn test_empty_report_prints_nothing() {
        let empty = crate::leaks::LeakReport::default();
        for format in [Format::Text, Format::Table, Format::Json, Format::JsonPretty] {
            assert_eq!(rendered(&empty, format), "");
        }
    }

    #[test]
    fn test_parse_format() {
        assert_eq!("table".parse::<Format>().unwrap(), Format::Table);
        assert_eq!("JSON-PRETTY".parse::<Format>().unwrap(), Format::JsonPretty);
        assert_eq!(
            "yaml".parse::<Format>().unwrap_err().to_string(),
            "invalid format: \"yaml\""
        );
        assert_eq!(Format::JsonPretty.to_string(), "json-pretty");
    }
}
