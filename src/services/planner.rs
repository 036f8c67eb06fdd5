//! Period planning: which months get a complete monthly summary and which
//! trailing month is still in progress.

use std::ops::RangeInclusive;

use chrono::{Datelike, NaiveDate};

use crate::types::{
    Frequency, PartialFrequency, PeriodPlan, PlannedPeriod, ReportError, Result,
};

/// Month after `month`, with December wrapping to January
pub fn month_end(month: u32) -> u32 {
    if month >= 12 {
        1
    } else {
        month + 1
    }
}

/// End-exclusive window `[first of month, first of next month)`.
/// December rolls over into January of the following year.
pub fn month_window(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)
        .ok_or_else(|| ReportError::Period(format!("{}-{} is not a valid month", year, month)))?;
    let end_year = if month >= 12 { year + 1 } else { year };
    let end = NaiveDate::from_ymd_opt(end_year, month_end(month), 1).ok_or_else(|| {
        ReportError::Period(format!("{}-{} has no following month", year, month))
    })?;
    Ok((start, end))
}

/// The month of `year` that is in progress on `today`, if any
pub fn current_month_of(year: i32, today: NaiveDate) -> Option<u32> {
    (today.year() == year).then_some(today.month())
}

/// Plan the periods for `months` of `year`.
///
/// Every month is a complete `monthly` period, except the last month of the
/// range when it is `current_month`: that one is requested at `partial`
/// frequency so an unfinished month is not reported as a low monthly total.
pub fn plan(
    year: i32,
    months: RangeInclusive<u32>,
    current_month: Option<u32>,
    partial: PartialFrequency,
) -> Result<PeriodPlan> {
    let (first, last) = (*months.start(), *months.end());
    if !(1..=12).contains(&first) || !(1..=12).contains(&last) {
        return Err(ReportError::Period(format!(
            "months must be within 1..=12, got {}..={}",
            first, last
        )));
    }
    if first > last {
        return Err(ReportError::Period(format!(
            "first month {} is after last month {}",
            first, last
        )));
    }

    let trailing_partial = current_month == Some(last);

    let mut periods = Vec::with_capacity((last - first + 1) as usize);
    for month in months {
        let frequency = if trailing_partial && month == last {
            Frequency::from(partial)
        } else {
            Frequency::Monthly
        };
        let (start, end) = month_window(year, month)?;
        periods.push(PlannedPeriod {
            frequency,
            year,
            month,
            start,
            end,
        });
    }

    Ok(PeriodPlan::new(periods))
}

/// Plan relative to `today`: only a range ending in today's month of the
/// same year gets a partial trailing period.
pub fn plan_for_today(
    year: i32,
    months: RangeInclusive<u32>,
    today: NaiveDate,
    partial: PartialFrequency,
) -> Result<PeriodPlan> {
    plan(year, months, current_month_of(year, today), partial)
}
