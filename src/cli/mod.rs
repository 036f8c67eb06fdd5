mod merge;

use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::config::{Config, Overrides, Settings};
use crate::services::metering::Credentials;
use crate::services::{build_cohorts, planner, DirectorySource, MeteringClient, Orchestrator};
use crate::types::PartialFrequency;

pub use merge::MergeArgs;

/// Monthly usage reports per user and per cloud
#[derive(Parser, Debug)]
#[command(name = "usage-report")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (default: <config dir>/usage-report/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Year to report on (default: current year)
    #[arg(long, global = true)]
    year: Option<i32>,

    /// First month of the range (1-12)
    #[arg(long = "from", global = true, value_parser = clap::value_parser!(u32).range(1..=12))]
    first_month: Option<u32>,

    /// Last month of the range, inclusive (1-12)
    #[arg(long = "to", global = true, value_parser = clap::value_parser!(u32).range(1..=12))]
    last_month: Option<u32>,

    /// Summary frequency for a month still in progress
    #[arg(long, global = true)]
    partial: Option<PartialFrequency>,

    /// Directory reports are written to
    #[arg(long, global = true, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Metering service base URL
    #[arg(long, global = true)]
    endpoint: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fetch usage and write reports (default)
    Run,

    /// Show which months will be requested and at which frequency
    Plan,

    /// Concatenate the monthly reports of one cohort into a single file
    Merge(MergeArgs),
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            endpoint: self.endpoint.clone(),
            year: self.year,
            first_month: self.first_month,
            last_month: self.last_month,
            partial_frequency: self.partial,
            output_dir: self.output_dir.clone(),
        }
    }

    /// Load the config file and apply command-line overrides
    pub fn settings(&self, today: NaiveDate) -> anyhow::Result<Settings> {
        let config = Config::load(self.config.as_deref())?;
        Ok(config.resolve(&self.overrides(), today)?)
    }

    pub fn run(self) -> anyhow::Result<()> {
        let today = Local::now().date_naive();
        let settings = self.settings(today)?;

        match self.command {
            None | Some(Commands::Run) => run_reports(&settings, today),
            Some(Commands::Plan) => {
                print_plan(&settings, today)?;
                Ok(())
            }
            Some(Commands::Merge(args)) => {
                args.run(&settings)?;
                Ok(())
            }
        }
    }
}

fn print_plan(settings: &Settings, today: NaiveDate) -> anyhow::Result<()> {
    let plan = planner::plan_for_today(
        settings.year,
        settings.months.clone(),
        today,
        settings.partial_frequency,
    )?;
    for period in plan.periods() {
        let note = if period.is_partial() {
            " (in progress)"
        } else {
            ""
        };
        println!("{}{}", period, note);
    }
    Ok(())
}

fn run_reports(settings: &Settings, today: NaiveDate) -> anyhow::Result<()> {
    settings.require_clouds()?;

    let plan = planner::plan_for_today(
        settings.year,
        settings.months.clone(),
        today,
        settings.partial_frequency,
    )?;

    let credentials = Credentials::from_env()?;
    let client = MeteringClient::new(&settings.endpoint, settings.timeout)?;
    let session = client.login(&credentials)?;
    info!(endpoint = %client.endpoint(), user = %credentials.username, "logged in");

    let source = client.with_session(session);
    let identities = source.list_identities()?;
    let cohort_plan = build_cohorts(&identities, &settings.organizations, &settings.blacklist);

    let orchestrator = Orchestrator::new(&source, settings.clouds.clone(), &settings.output_dir);
    let summary = orchestrator.run(&cohort_plan.cohorts, &plan);

    info!(
        written = summary.written.len(),
        empty = summary.empty,
        failed = summary.failures.len(),
        faults = summary.faults,
        "run finished"
    );
    for failure in &summary.failures {
        warn!("not reported: {}", failure);
    }

    Ok(())
}
