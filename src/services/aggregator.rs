//! Aggregator service for grouping usage records

use crate::types::{AggregationResult, DataIntegrityFault, GroupingAxis, UsageRecord};
use tracing::warn;

/// Groups plus the records that had to be rejected while building them
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationOutcome {
    pub result: AggregationResult,
    pub faults: Vec<DataIntegrityFault>,
}

/// Both report views of one batch, plus the records rejected from both
#[derive(Debug, Clone, PartialEq)]
pub struct BatchAggregation {
    pub views: [(GroupingAxis, AggregationResult); 2],
    pub faults: Vec<DataIntegrityFault>,
}

/// Aggregator for grouping usage records along one axis
pub struct Aggregator;

impl Aggregator {
    /// Group `records` by `primary`, collecting the distinct `secondary`
    /// values of each group and summing every (metric, unit) pair.
    ///
    /// A record missing either grouping field is rejected as a whole and
    /// reported as a fault; the rest of the batch is still aggregated.
    pub fn aggregate(
        records: &[UsageRecord],
        primary: GroupingAxis,
        secondary: GroupingAxis,
    ) -> AggregationOutcome {
        let outcome = Self::collect(records.iter().enumerate(), primary, secondary);
        for fault in &outcome.faults {
            warn!(by = %primary, "skipping usage record: {}", fault);
        }
        outcome
    }

    /// Both report views of one batch: by user (with clouds) and by cloud
    /// (with users). The two results share nothing.
    ///
    /// Records are checked once for the whole batch, so a record missing a
    /// grouping field yields a single fault and is left out of both views.
    pub fn both_axes(records: &[UsageRecord]) -> BatchAggregation {
        let mut faults = Vec::new();
        let mut valid = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            match Self::check(index, record, GroupingAxis::User, GroupingAxis::Cloud) {
                Some(fault) => faults.push(fault),
                None => valid.push((index, record)),
            }
        }

        for fault in &faults {
            warn!("skipping usage record: {}", fault);
        }

        let views = GroupingAxis::ALL.map(|axis| {
            let outcome = Self::collect(valid.iter().copied(), axis, axis.counterpart());
            (axis, outcome.result)
        });

        BatchAggregation { views, faults }
    }

    /// The fault for `record`, if it lacks `primary` or `secondary`
    fn check(
        index: usize,
        record: &UsageRecord,
        primary: GroupingAxis,
        secondary: GroupingAxis,
    ) -> Option<DataIntegrityFault> {
        match (primary.select(record), secondary.select(record)) {
            (Some(_), Some(_)) => None,
            (None, _) => Some(DataIntegrityFault {
                index,
                missing: primary,
                group: None,
            }),
            (Some(group), None) => Some(DataIntegrityFault {
                index,
                missing: secondary,
                group: Some(group.to_string()),
            }),
        }
    }

    fn collect<'r>(
        records: impl IntoIterator<Item = (usize, &'r UsageRecord)>,
        primary: GroupingAxis,
        secondary: GroupingAxis,
    ) -> AggregationOutcome {
        let mut outcome = AggregationOutcome::default();

        for (index, record) in records {
            let (group, companion) = match (primary.select(record), secondary.select(record)) {
                (Some(g), Some(c)) => (g, c),
                _ => {
                    outcome
                        .faults
                        .extend(Self::check(index, record, primary, secondary));
                    continue;
                }
            };

            outcome
                .result
                .groups
                .entry(group.to_string())
                .or_default()
                .add(companion, &record.usage);
        }

        outcome
    }
}
