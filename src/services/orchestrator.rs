//! Run orchestration: every cohort × every planned period → two reports

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::services::cohorts::valid_cohort_name;
use crate::services::metering::{UsageQuery, UsageSource};
use crate::services::report::{self, ReportOutcome};
use crate::services::Aggregator;
use crate::types::{Cohort, GroupingAxis, PeriodPlan, PlannedPeriod, ReportError, Result};

/// A (cohort, period) that could not be processed, or one of its reports
/// that could not be written
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodFailure {
    pub cohort: String,
    pub period: PlannedPeriod,
    /// `None` when the whole period failed (e.g. the fetch)
    pub axis: Option<GroupingAxis>,
    pub error: String,
}

impl fmt::Display for PeriodFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.cohort, self.period)?;
        if let Some(axis) = self.axis {
            write!(f, " by {}", axis)?;
        }
        write!(f, ": {}", self.error)
    }
}

/// Outcome of the two reports for one (cohort, period)
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodReport {
    pub outcomes: Vec<(GroupingAxis, ReportOutcome)>,
    /// Reports that failed to write; the other axis is unaffected
    pub errors: Vec<(GroupingAxis, String)>,
    pub faults: usize,
}

/// Everything a run produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub written: Vec<PathBuf>,
    pub empty: usize,
    pub failures: Vec<PeriodFailure>,
    pub faults: usize,
    pub skipped_cohorts: Vec<String>,
}

impl RunSummary {
    fn record(&mut self, cohort: &Cohort, period: &PlannedPeriod, report: PeriodReport) {
        self.faults += report.faults;
        for (_, outcome) in report.outcomes {
            match outcome {
                ReportOutcome::Written { path, .. } => self.written.push(path),
                ReportOutcome::NoData => self.empty += 1,
            }
        }
        for (axis, error) in report.errors {
            self.failures.push(PeriodFailure {
                cohort: cohort.name.clone(),
                period: period.clone(),
                axis: Some(axis),
                error,
            });
        }
    }
}

/// Drives fetch → aggregate → format for each cohort and period, in order.
///
/// Periods are processed one at a time and share no state; a failing period
/// is recorded and the run moves on.
pub struct Orchestrator<'a, S: UsageSource + ?Sized> {
    source: &'a S,
    clouds: Vec<String>,
    output_dir: PathBuf,
}

impl<'a, S: UsageSource + ?Sized> Orchestrator<'a, S> {
    pub fn new(source: &'a S, clouds: Vec<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source,
            clouds,
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn run(&self, cohorts: &[Cohort], plan: &PeriodPlan) -> RunSummary {
        let mut summary = RunSummary::default();

        info!("processing usage for clouds: {}", self.clouds.join(", "));

        for cohort in cohorts {
            if cohort.members.is_empty() {
                warn!(cohort = %cohort.name, "cohort has no members, skipping");
                summary.skipped_cohorts.push(cohort.name.clone());
                continue;
            }

            info!(
                cohort = %cohort.name,
                members = cohort.members.len(),
                "processing usage for cohort"
            );
            for member in &cohort.members {
                info!(cohort = %cohort.name, member = %member.display_name(), "cohort member");
            }

            for period in plan.periods() {
                if period.is_partial() {
                    info!(
                        cohort = %cohort.name,
                        "processing current month using {} summary: {}",
                        period.frequency,
                        period.month_name()
                    );
                } else {
                    info!(cohort = %cohort.name, "processing month: {}", period.month_name());
                }

                match self.process_period(cohort, period) {
                    Ok(report) => summary.record(cohort, period, report),
                    Err(e) => {
                        warn!(
                            cohort = %cohort.name,
                            period = %period,
                            "period failed: {}",
                            e
                        );
                        summary.failures.push(PeriodFailure {
                            cohort: cohort.name.clone(),
                            period: period.clone(),
                            axis: None,
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        summary
    }

    /// Fetch one period for one cohort and write its by-user and by-cloud
    /// reports. A report that fails to write is recorded in the returned
    /// `PeriodReport` without affecting the other one.
    pub fn process_period(&self, cohort: &Cohort, period: &PlannedPeriod) -> Result<PeriodReport> {
        if !valid_cohort_name(&cohort.name) {
            return Err(ReportError::Config(format!(
                "cohort name '{}' cannot be used in a file name",
                cohort.name
            )));
        }

        let query = UsageQuery {
            frequency: period.frequency,
            start: period.start,
            end: period.end,
            users: cohort.usernames().map(String::from).collect(),
            clouds: self.clouds.clone(),
        };
        let records = self.source.fetch_usage(&query)?;

        let batch = Aggregator::both_axes(&records);
        let mut period_report = PeriodReport {
            outcomes: Vec::with_capacity(GroupingAxis::ALL.len()),
            errors: Vec::new(),
            faults: batch.faults.len(),
        };

        for (axis, result) in batch.views {
            let path = self.output_dir.join(report::report_file_name(
                period.year,
                period.month,
                &cohort.name,
                axis,
            ));
            match report::emit(&result, axis, axis.counterpart(), &path) {
                Ok(written) => {
                    if written == ReportOutcome::NoData {
                        warn!(
                            cohort = %cohort.name,
                            period = %period,
                            by = %axis,
                            "no metrics found"
                        );
                    }
                    period_report.outcomes.push((axis, written));
                }
                Err(e) => {
                    warn!(
                        cohort = %cohort.name,
                        period = %period,
                        by = %axis,
                        file = %path.display(),
                        "report not written: {}",
                        e
                    );
                    period_report.errors.push((axis, e.to_string()));
                }
            }
        }

        Ok(period_report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::planner;
    use crate::types::{
        Frequency, Identity, Measure, MetricMap, PartialFrequency, ReportError, UsageRecord,
        UNIT_MINUTES,
    };
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::fs;
    use tempfile::TempDir;

    /// Answers every query from a fixed batch, optionally failing one month
    struct FakeSource {
        records: Vec<UsageRecord>,
        fail_month: Option<u32>,
        queries: RefCell<Vec<UsageQuery>>,
    }

    impl FakeSource {
        fn new(records: Vec<UsageRecord>) -> Self {
            Self {
                records,
                fail_month: None,
                queries: RefCell::new(Vec::new()),
            }
        }
    }

    impl UsageSource for FakeSource {
        fn fetch_usage(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>> {
            self.queries.borrow_mut().push(query.clone());
            if self.fail_month == Some(chrono::Datelike::month(&query.start)) {
                return Err(ReportError::Fetch {
                    status: 500,
                    message: "boom".into(),
                });
            }
            Ok(self.records.clone())
        }
    }

    fn record(user: Option<&str>, cloud: Option<&str>, vm: f64) -> UsageRecord {
        UsageRecord {
            user: user.map(String::from),
            cloud: cloud.map(String::from),
            usage: MetricMap::from([(
                "vm".to_string(),
                BTreeMap::from([(UNIT_MINUTES.to_string(), Measure::Number(vm))]),
            )]),
        }
    }

    fn cohort(name: &str, users: &[&str]) -> Cohort {
        Cohort {
            name: name.to_string(),
            members: users
                .iter()
                .map(|u| Identity {
                    username: u.to_string(),
                    first_name: None,
                    last_name: None,
                    organization: Some(name.to_string()),
                })
                .collect(),
        }
    }

    fn plan(months: std::ops::RangeInclusive<u32>, current: Option<u32>) -> PeriodPlan {
        planner::plan(2017, months, current, PartialFrequency::Weekly).unwrap()
    }

    #[test]
    fn test_run_writes_two_reports_per_period() {
        let temp = TempDir::new().unwrap();
        let source = FakeSource::new(vec![
            record(Some("a"), Some("x"), 60.0),
            record(Some("a"), Some("y"), 60.0),
        ]);
        let orch = Orchestrator::new(&source, vec!["x".into(), "y".into()], temp.path());

        let summary = orch.run(&[cohort("CERN", &["a"])], &plan(6..=7, None));

        assert_eq!(summary.written.len(), 4);
        assert!(summary.failures.is_empty());
        let by_user = temp.path().join("metrics--2017-06--CERN--by-user.csv");
        let content = fs::read_to_string(by_user).unwrap();
        assert!(content.contains("a, 2.0, , , , x, y\n"));
        let by_cloud = temp.path().join("metrics--2017-07--CERN--by-cloud.csv");
        assert!(fs::read_to_string(by_cloud).unwrap().contains("x, 1.0, , , , a\n"));
    }

    #[test]
    fn test_run_queries_with_planned_frequency() {
        let temp = TempDir::new().unwrap();
        let source = FakeSource::new(vec![record(Some("a"), Some("x"), 60.0)]);
        let orch = Orchestrator::new(&source, vec!["x".into()], temp.path());

        orch.run(&[cohort("CERN", &["a", "b"])], &plan(6..=8, Some(8)));

        let queries = source.queries.borrow();
        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0].frequency, Frequency::Monthly);
        assert_eq!(queries[2].frequency, Frequency::Weekly);
        assert_eq!(queries[0].users, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(queries[0].clouds, vec!["x".to_string()]);
    }

    #[test]
    fn test_run_failed_period_does_not_stop_others() {
        let temp = TempDir::new().unwrap();
        let mut source = FakeSource::new(vec![record(Some("a"), Some("x"), 60.0)]);
        source.fail_month = Some(6);
        let orch = Orchestrator::new(&source, vec!["x".into()], temp.path());

        let summary = orch.run(&[cohort("CERN", &["a"])], &plan(6..=7, None));

        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].period.month, 6);
        assert_eq!(summary.failures[0].cohort, "CERN");
        assert_eq!(summary.written.len(), 2);
        assert!(!temp.path().join("metrics--2017-06--CERN--by-user.csv").exists());
        assert!(temp.path().join("metrics--2017-07--CERN--by-user.csv").exists());
    }

    #[test]
    fn test_run_empty_period_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let source = FakeSource::new(Vec::new());
        let orch = Orchestrator::new(&source, vec!["x".into()], temp.path());

        let summary = orch.run(&[cohort("CERN", &["a"])], &plan(6..=6, None));

        assert!(summary.written.is_empty());
        assert_eq!(summary.empty, 2);
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_run_skips_empty_cohort() {
        let temp = TempDir::new().unwrap();
        let source = FakeSource::new(vec![record(Some("a"), Some("x"), 60.0)]);
        let orch = Orchestrator::new(&source, vec!["x".into()], temp.path());

        let summary = orch.run(
            &[cohort("KIT", &[]), cohort("CERN", &["a"])],
            &plan(6..=6, None),
        );

        assert_eq!(summary.skipped_cohorts, vec!["KIT".to_string()]);
        assert_eq!(source.queries.borrow().len(), 1);
        assert_eq!(summary.written.len(), 2);
    }

    #[test]
    fn test_process_period_counts_one_fault_per_record() {
        let temp = TempDir::new().unwrap();
        let source = FakeSource::new(vec![
            record(Some("a"), Some("x"), 60.0),
            record(Some("a"), None, 60.0),
        ]);
        let orch = Orchestrator::new(&source, vec!["x".into()], temp.path());
        let plan = plan(6..=6, None);

        let report = orch
            .process_period(&cohort("CERN", &["a"]), &plan.periods()[0])
            .unwrap();

        // One bad record, one fault for the batch
        assert_eq!(report.faults, 1);
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.errors.is_empty());
        let content =
            fs::read_to_string(temp.path().join("metrics--2017-06--CERN--by-user.csv")).unwrap();
        assert!(content.contains("a, 1.0, , , , x\n"));
    }

    #[test]
    fn test_run_counts_one_fault_per_bad_record() {
        let temp = TempDir::new().unwrap();
        let source = FakeSource::new(vec![
            record(Some("a"), Some("x"), 60.0),
            record(Some("a"), None, 60.0),
        ]);
        let orch = Orchestrator::new(&source, vec!["x".into()], temp.path());

        let summary = orch.run(&[cohort("CERN", &["a"])], &plan(6..=6, None));

        assert_eq!(summary.faults, 1);
        assert_eq!(summary.written.len(), 2);
    }

    #[test]
    fn test_run_failed_report_keeps_the_other_axis() {
        let temp = TempDir::new().unwrap();
        // A directory where the by-cloud file should go makes that write fail
        fs::create_dir(temp.path().join("metrics--2017-06--CERN--by-cloud.csv")).unwrap();
        let source = FakeSource::new(vec![record(Some("a"), Some("x"), 60.0)]);
        let orch = Orchestrator::new(&source, vec!["x".into()], temp.path());

        let summary = orch.run(&[cohort("CERN", &["a"])], &plan(6..=6, None));

        let by_user = temp.path().join("metrics--2017-06--CERN--by-user.csv");
        assert!(by_user.is_file());
        assert_eq!(summary.written, vec![by_user]);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].axis, Some(GroupingAxis::Cloud));
        assert_eq!(summary.failures[0].period.month, 6);
    }

    #[test]
    fn test_run_rejects_cohort_name_with_separator() {
        let temp = TempDir::new().unwrap();
        let source = FakeSource::new(vec![record(Some("a"), Some("x"), 60.0)]);
        let orch = Orchestrator::new(&source, vec!["x".into()], temp.path());

        let summary = orch.run(&[cohort("CERN/IT", &["a"])], &plan(6..=6, None));

        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].axis, None);
        assert!(source.queries.borrow().is_empty());
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_period_failure_display() {
        let period = plan(6..=6, None).periods()[0].clone();
        let failure = PeriodFailure {
            cohort: "CERN".into(),
            period,
            axis: Some(GroupingAxis::Cloud),
            error: "disk full".into(),
        };
        assert_eq!(failure.to_string(), "CERN 2017-06 monthly by cloud: disk full");
    }
}
