//! Report formatting and writing
//!
//! A report is comma-space delimited text: one header line, then one line per
//! group with the converted `vm`, `cpu`, `ram` and `disk` totals followed by
//! the group's companions.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tracing::warn;

use crate::services::converter::{convert, Conversion};
use crate::types::{AggregationResult, GroupSummary, GroupingAxis, Result, UNIT_MINUTES};

/// Metric columns in output order, with their header titles
pub const METRIC_COLUMNS: [(&str, &str); 4] = [
    ("vm", "VM (hours)"),
    ("cpu", "CPU (hours)"),
    ("ram", "RAM (GB-hours)"),
    ("disk", "Disk (GB-hours)"),
];

const DELIMITER: &str = ", ";

/// A cell whose accumulated value was not numeric
#[derive(Debug, Clone, PartialEq)]
pub struct UnconvertibleCell {
    pub group: String,
    pub metric: String,
    pub raw: serde_json::Value,
}

/// Rendered report, not yet written anywhere
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub header: String,
    pub rows: Vec<String>,
    pub unconvertible: Vec<UnconvertibleCell>,
}

impl Report {
    /// Full text, every line newline-terminated
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(self.header.len() + 1 + self.rows.len() * 64);
        out.push_str(&self.header);
        out.push('\n');
        for row in &self.rows {
            out.push_str(row);
            out.push('\n');
        }
        out
    }
}

/// What happened to one (cohort, period, axis) report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    Written { path: PathBuf, rows: usize },
    /// No groups: nothing was written
    NoData,
}

/// `metrics--2017-06--CERN--by-user.csv`
pub fn report_file_name(year: i32, month: u32, organization: &str, axis: GroupingAxis) -> String {
    format!(
        "metrics--{}-{:02}--{}--by-{}.csv",
        year,
        month,
        organization,
        axis.name()
    )
}

pub fn header(primary: GroupingAxis, secondary: GroupingAxis) -> String {
    let mut cols: Vec<String> = Vec::with_capacity(METRIC_COLUMNS.len() + 2);
    cols.push(primary.label().to_string());
    cols.extend(METRIC_COLUMNS.iter().map(|(_, title)| title.to_string()));
    cols.push(format!("Included {}s", secondary.label()));
    cols.join(DELIMITER)
}

/// Render a number with at least one decimal: `2.0`, `0.5`, `1.0833333333333333`
pub fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}

fn metric_cell(
    group_key: &str,
    group: &GroupSummary,
    metric: &str,
    unconvertible: &mut Vec<UnconvertibleCell>,
) -> String {
    let Some(measure) = group.measure(metric, UNIT_MINUTES) else {
        return String::new();
    };
    match convert(metric, measure) {
        Conversion::Converted(v) => format_number(v),
        Conversion::Unconvertible(raw) => {
            let text = raw.to_string();
            unconvertible.push(UnconvertibleCell {
                group: group_key.to_string(),
                metric: metric.to_string(),
                raw,
            });
            text
        }
    }
}

/// Format an aggregation. Returns `None` when there are no groups.
pub fn format(
    result: &AggregationResult,
    primary: GroupingAxis,
    secondary: GroupingAxis,
) -> Option<Report> {
    if result.is_empty() {
        return None;
    }

    let mut unconvertible = Vec::new();
    let rows = result
        .iter()
        .map(|(key, group)| {
            let mut cells = Vec::with_capacity(METRIC_COLUMNS.len() + 2);
            cells.push(key.clone());
            for (metric, _) in METRIC_COLUMNS {
                cells.push(metric_cell(key, group, metric, &mut unconvertible));
            }
            cells.push(group.companions_label());
            cells.join(DELIMITER)
        })
        .collect();

    Some(Report {
        header: header(primary, secondary),
        rows,
        unconvertible,
    })
}

/// Write a report, creating parent directories. Holds an exclusive lock on
/// the file while writing.
pub fn write_report(report: &Report, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(path)?;
    file.lock_exclusive()?;

    let written = replace_contents(&mut file, report.to_csv().as_bytes());
    let _ = FileExt::unlock(&file);
    written?;
    Ok(())
}

// Truncate only once the lock is held
fn replace_contents(file: &mut File, data: &[u8]) -> io::Result<()> {
    file.set_len(0)?;
    file.write_all(data)?;
    file.flush()
}

/// Format `result` and write it to `path`, unless it is empty
pub fn emit(
    result: &AggregationResult,
    primary: GroupingAxis,
    secondary: GroupingAxis,
    path: &Path,
) -> Result<ReportOutcome> {
    let Some(report) = format(result, primary, secondary) else {
        return Ok(ReportOutcome::NoData);
    };

    for cell in &report.unconvertible {
        warn!(
            group = %cell.group,
            metric = %cell.metric,
            file = %path.display(),
            "non-numeric usage value {} written as-is",
            cell.raw
        );
    }

    write_report(&report, path)?;
    Ok(ReportOutcome::Written {
        path: path.to_path_buf(),
        rows: report.rows.len(),
    })
}
