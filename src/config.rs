//! Configuration file and command-line overrides

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Datelike, NaiveDate};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::types::{PartialFrequency, ReportError, Result};

pub const DEFAULT_ENDPOINT: &str = "https://nuv.la";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Contents of `config.toml`. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub endpoint: Option<String>,
    pub year: Option<i32>,
    pub first_month: Option<u32>,
    pub last_month: Option<u32>,
    pub clouds: BTreeSet<String>,
    pub organizations: BTreeSet<String>,
    pub blacklist: BTreeSet<String>,
    pub partial_frequency: Option<PartialFrequency>,
    pub output_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

/// Values given on the command line; they win over the file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub year: Option<i32>,
    pub first_month: Option<u32>,
    pub last_month: Option<u32>,
    pub partial_frequency: Option<PartialFrequency>,
    pub output_dir: Option<PathBuf>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub endpoint: String,
    pub year: i32,
    pub months: RangeInclusive<u32>,
    pub clouds: Vec<String>,
    pub organizations: BTreeSet<String>,
    pub blacklist: BTreeSet<String>,
    pub partial_frequency: PartialFrequency,
    pub output_dir: PathBuf,
    pub timeout: Duration,
}

impl Config {
    /// `<config dir>/usage-report/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "usage-report").map(|d| d.config_dir().join("config.toml"))
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        toml::from_str(data).map_err(|e| ReportError::Config(e.to_string()))
    }

    /// Load `path` if given (it must exist), otherwise the default path if
    /// present, otherwise an empty config
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            let data = fs::read_to_string(path).map_err(|e| {
                ReportError::Config(format!("cannot read {}: {}", path.display(), e))
            })?;
            return toml::from_str(&data)
                .map_err(|e| ReportError::Config(format!("{}: {}", path.display(), e)));
        }

        match Self::default_path() {
            Some(path) => Self::load_if_present(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load `path`, or an empty config when it does not exist. Any other
    /// read failure is an error.
    pub fn load_if_present(path: &Path) -> Result<Self> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ReportError::Config(format!(
                    "cannot read {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        toml::from_str(&data)
            .map_err(|e| ReportError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Merge with `overrides` and fill defaults relative to `today`.
    ///
    /// The year defaults to today's. The month range defaults to January up
    /// to the current month for the current year, or the whole year otherwise.
    pub fn resolve(self, overrides: &Overrides, today: NaiveDate) -> Result<Settings> {
        let year = overrides.year.or(self.year).unwrap_or_else(|| today.year());
        let default_last = if year == today.year() {
            today.month()
        } else {
            12
        };
        let first = overrides.first_month.or(self.first_month).unwrap_or(1);
        let last = overrides
            .last_month
            .or(self.last_month)
            .unwrap_or(default_last);

        if !(1..=12).contains(&first) || !(1..=12).contains(&last) {
            return Err(ReportError::Config(format!(
                "months must be within 1..=12, got {}..={}",
                first, last
            )));
        }
        if first > last {
            return Err(ReportError::Config(format!(
                "first_month {} is after last_month {}",
                first, last
            )));
        }

        Ok(Settings {
            endpoint: overrides
                .endpoint
                .clone()
                .or(self.endpoint)
                .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            year,
            months: first..=last,
            clouds: self.clouds.into_iter().collect(),
            organizations: self.organizations,
            blacklist: self.blacklist,
            partial_frequency: overrides
                .partial_frequency
                .or(self.partial_frequency)
                .unwrap_or_default(),
            output_dir: overrides
                .output_dir
                .clone()
                .or(self.output_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            timeout: Duration::from_secs(self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)),
        })
    }
}

impl Settings {
    /// A usage run needs at least one cloud to filter on
    pub fn require_clouds(&self) -> Result<()> {
        if self.clouds.is_empty() {
            return Err(ReportError::Config(
                "no clouds configured; set `clouds` in the config file".into(),
            ));
        }
        Ok(())
    }
}
