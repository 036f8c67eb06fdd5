//! `usage-report merge` subcommand

use clap::Args;

use crate::config::Settings;
use crate::services::cohorts::ALL_COHORT;
use crate::services::merge::merge_reports;
use crate::types::{GroupingAxis, ReportError, Result};

/// Merge monthly reports
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Cohort whose reports are merged (an organization, or "all")
    #[arg(long, default_value = ALL_COHORT)]
    pub organization: String,

    /// Only merge reports of this axis (default: both)
    #[arg(long)]
    pub by: Option<GroupingAxis>,
}

impl MergeArgs {
    pub fn run(self, settings: &Settings) -> Result<()> {
        let axes: Vec<GroupingAxis> = match self.by {
            Some(axis) => vec![axis],
            None => GroupingAxis::ALL.to_vec(),
        };

        let mut merged_any = false;
        for axis in axes {
            match merge_reports(&settings.output_dir, settings.year, &self.organization, axis)? {
                Some(path) => {
                    println!("{}", path.display());
                    merged_any = true;
                }
                None => {
                    tracing::warn!(
                        organization = %self.organization,
                        by = %axis,
                        "no monthly reports to merge"
                    );
                }
            }
        }

        if !merged_any {
            return Err(ReportError::Config(format!(
                "no monthly reports for {} in {} for {}",
                self.organization,
                settings.output_dir.display(),
                settings.year
            )));
        }
        Ok(())
    }
}
