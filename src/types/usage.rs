//! Usage types for metering records and their aggregates

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Metric name → unit name → measured value, as returned by the metering service.
/// e.g. `{"vm": {"unit-minutes": 60.0}, "ram": {"unit-minutes": 61440.0}}`
pub type MetricMap = BTreeMap<String, BTreeMap<String, Measure>>;

/// Unit every report column is read from
pub const UNIT_MINUTES: &str = "unit-minutes";

/// A single measured value.
///
/// The metering service is expected to send numbers, but `null` and other
/// non-numeric values do show up. They are kept verbatim instead of being
/// coerced to zero so the report can surface them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Measure {
    Number(f64),
    Raw(serde_json::Value),
}

impl Measure {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Measure::Number(n) => Some(*n),
            Measure::Raw(_) => None,
        }
    }

    /// Sum two measures. A non-numeric side poisons the result and the
    /// first non-numeric value seen is kept.
    pub fn combine(&self, other: &Measure) -> Measure {
        match (self, other) {
            (Measure::Number(a), Measure::Number(b)) => Measure::Number(a + b),
            (Measure::Raw(v), _) | (_, Measure::Raw(v)) => Measure::Raw(v.clone()),
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Number(n) => write!(f, "{}", n),
            Measure::Raw(v) => write!(f, "{}", v),
        }
    }
}

/// One observation returned by the metering service for a period.
///
/// `user` and `cloud` are optional on the wire; a record missing either one
/// is rejected by the aggregator rather than guessed at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub cloud: Option<String>,
    #[serde(default)]
    pub usage: MetricMap,
}

/// Field a batch of records is grouped by.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum GroupingAxis {
    User,
    Cloud,
}

impl GroupingAxis {
    /// Both axes, in the order reports are produced
    pub const ALL: [GroupingAxis; 2] = [GroupingAxis::User, GroupingAxis::Cloud];

    /// Field name, used in file names (`by-user`)
    pub fn name(self) -> &'static str {
        match self {
            GroupingAxis::User => "user",
            GroupingAxis::Cloud => "cloud",
        }
    }

    /// Title-cased name, used in report headers
    pub fn label(self) -> &'static str {
        match self {
            GroupingAxis::User => "User",
            GroupingAxis::Cloud => "Cloud",
        }
    }

    /// The other axis
    pub fn counterpart(self) -> GroupingAxis {
        match self {
            GroupingAxis::User => GroupingAxis::Cloud,
            GroupingAxis::Cloud => GroupingAxis::User,
        }
    }

    /// Read this axis' field from a record
    pub fn select(self, record: &UsageRecord) -> Option<&str> {
        match self {
            GroupingAxis::User => record.user.as_deref(),
            GroupingAxis::Cloud => record.cloud.as_deref(),
        }
    }
}

impl fmt::Display for GroupingAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accumulated usage for one group of an aggregation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupSummary {
    /// Distinct values of the secondary axis seen in this group
    pub companions: BTreeSet<String>,
    /// Running sums per (metric, unit)
    pub metrics: MetricMap,
    /// Number of records folded into this group
    pub record_count: u64,
}

impl GroupSummary {
    /// Fold one record's companion value and metrics into the group
    pub fn add(&mut self, companion: &str, usage: &MetricMap) {
        self.companions.insert(companion.to_string());
        for (metric, units) in usage {
            let acc = self.metrics.entry(metric.clone()).or_default();
            for (unit, value) in units {
                match acc.get_mut(unit) {
                    Some(total) => *total = total.combine(value),
                    None => {
                        acc.insert(unit.clone(), value.clone());
                    }
                }
            }
        }
        self.record_count = self.record_count.saturating_add(1);
    }

    pub fn measure(&self, metric: &str, unit: &str) -> Option<&Measure> {
        self.metrics.get(metric).and_then(|units| units.get(unit))
    }

    /// Companions joined in sorted order, e.g. "cloud-a, cloud-b"
    pub fn companions_label(&self) -> String {
        self.companions
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Group key → summary. Iteration is ordered by group key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregationResult {
    pub groups: BTreeMap<String, GroupSummary>,
}

impl AggregationResult {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn get(&self, group: &str) -> Option<&GroupSummary> {
        self.groups.get(group)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &GroupSummary)> {
        self.groups.iter()
    }
}

/// A record that could not be grouped because a grouping field was missing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataIntegrityFault {
    /// Position of the record in the fetched batch
    pub index: usize,
    /// The field that was absent
    pub missing: GroupingAxis,
    /// Primary group value, when the primary field itself was present
    pub group: Option<String>,
}

impl fmt::Display for DataIntegrityFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.group {
            Some(group) => write!(
                f,
                "record #{} in group '{}' has no '{}' field",
                self.index, group, self.missing
            ),
            None => write!(f, "record #{} has no '{}' field", self.index, self.missing),
        }
    }
}
