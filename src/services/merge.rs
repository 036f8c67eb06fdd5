//! Merging per-month reports of one cohort and axis into a single file

use std::fs;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::info;

use crate::services::cohorts::valid_cohort_name;
use crate::types::{GroupingAxis, ReportError, Result};

/// `metrics--2017--CERN--by-user.csv`
pub fn merged_file_name(year: i32, organization: &str, axis: GroupingAxis) -> String {
    format!("metrics--{}--{}--by-{}.csv", year, organization, axis.name())
}

/// Per-month reports of `organization`/`axis` for `year` found in `dir`,
/// in month order
pub fn find_reports(
    dir: &Path,
    year: i32,
    organization: &str,
    axis: GroupingAxis,
) -> Result<Vec<PathBuf>> {
    let file_pattern = format!(
        "metrics--{}-[0-9][0-9]--{}--by-{}.csv",
        year,
        Pattern::escape(organization),
        axis.name()
    );
    let pattern = Path::new(&Pattern::escape(&dir.to_string_lossy())).join(file_pattern);

    let mut paths: Vec<PathBuf> = glob::glob(&pattern.to_string_lossy())
        .map_err(|e| ReportError::Config(format!("invalid report pattern: {}", e)))?
        .filter_map(|e| e.ok())
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}

/// Concatenate the monthly reports into one file, each section prefixed with
/// a `filename: <name>` line. Returns `None` when there is nothing to merge.
pub fn merge_reports(
    dir: &Path,
    year: i32,
    organization: &str,
    axis: GroupingAxis,
) -> Result<Option<PathBuf>> {
    if !valid_cohort_name(organization) {
        return Err(ReportError::Config(format!(
            "organization name '{}' cannot be used in a file name",
            organization
        )));
    }

    let inputs = find_reports(dir, year, organization, axis)?;
    if inputs.is_empty() {
        return Ok(None);
    }

    let mut merged = String::new();
    for input in &inputs {
        let name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        merged.push_str(&format!("filename: {}\n", name));
        merged.push_str(&fs::read_to_string(input)?);
    }

    let output = dir.join(merged_file_name(year, organization, axis));
    fs::write(&output, merged)?;
    info!(
        inputs = inputs.len(),
        output = %output.display(),
        "merged monthly reports"
    );
    Ok(Some(output))
}
