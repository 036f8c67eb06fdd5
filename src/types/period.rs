//! Reporting period types

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Summary frequency understood by the metering service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
    Weekly,
    Daily,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Monthly => "monthly",
            Frequency::Weekly => "weekly",
            Frequency::Daily => "daily",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frequency used for a month that is still in progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PartialFrequency {
    #[default]
    Weekly,
    Daily,
}

impl From<PartialFrequency> for Frequency {
    fn from(p: PartialFrequency) -> Self {
        match p {
            PartialFrequency::Weekly => Frequency::Weekly,
            PartialFrequency::Daily => Frequency::Daily,
        }
    }
}

/// One month to request, with its end-exclusive window `[start, end)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPeriod {
    pub frequency: Frequency,
    pub year: i32,
    pub month: u32,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PlannedPeriod {
    /// True when the month was not yet complete at planning time
    pub fn is_partial(&self) -> bool {
        self.frequency != Frequency::Monthly
    }

    /// English month name, e.g. "June"
    pub fn month_name(&self) -> &'static str {
        u8::try_from(self.month)
            .ok()
            .and_then(|m| chrono::Month::try_from(m).ok())
            .map(|m| m.name())
            .unwrap_or("?")
    }
}

impl fmt::Display for PlannedPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02} {}", self.year, self.month, self.frequency)
    }
}

/// Ordered periods for one run. Built once, never mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodPlan {
    periods: Vec<PlannedPeriod>,
}

impl PeriodPlan {
    pub fn new(periods: Vec<PlannedPeriod>) -> Self {
        Self { periods }
    }

    pub fn periods(&self) -> &[PlannedPeriod] {
        &self.periods
    }

    pub fn len(&self) -> usize {
        self.periods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }

    /// (frequency, month) pairs in plan order
    pub fn pairs(&self) -> Vec<(Frequency, u32)> {
        self.periods.iter().map(|p| (p.frequency, p.month)).collect()
    }
}
