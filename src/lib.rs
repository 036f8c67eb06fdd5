//! Usage aggregation and reporting for a metering service.
//!
//! Usage records are fetched per cohort and per month, grouped twice (by user
//! with the clouds they used, and by cloud with its users), converted from
//! unit-minutes to billing hours, and written as one delimited report per
//! grouping axis.

pub mod cli;
pub mod config;
pub mod services;
pub mod types;
