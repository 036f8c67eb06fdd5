//! Services for fetching, aggregating and reporting usage

pub mod aggregator;
pub mod cohorts;
pub mod converter;
pub mod merge;
pub mod metering;
pub mod orchestrator;
pub mod planner;
pub mod report;

pub use aggregator::{AggregationOutcome, Aggregator, BatchAggregation};
pub use cohorts::{build_cohorts, valid_cohort_name, CohortPlan, CohortWarning};
pub use converter::{convert, Conversion};
pub use metering::{DirectorySource, MeteringClient, Session, UsageQuery, UsageSource};
pub use orchestrator::{Orchestrator, PeriodFailure, RunSummary};
pub use report::ReportOutcome;
