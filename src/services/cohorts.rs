//! Cohort building from directory identities

use std::collections::BTreeSet;
use std::fmt;

use tracing::warn;

use crate::types::{Cohort, Identity};

/// Name of the cohort combining every configured organization
pub const ALL_COHORT: &str = "all";

/// A configured organization that cannot be reported on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CohortWarning {
    /// No identity declares this organization
    UnknownOrganization(String),
    /// Every identity of this organization is blacklisted
    FullyBlacklisted(String),
    /// The name cannot be used as part of a report file name
    InvalidName(String),
}

impl fmt::Display for CohortWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CohortWarning::UnknownOrganization(org) => {
                write!(f, "organization '{}' is not used by any user", org)
            }
            CohortWarning::FullyBlacklisted(org) => {
                write!(f, "every user of organization '{}' is blacklisted", org)
            }
            CohortWarning::InvalidName(org) => {
                write!(f, "organization name '{}' cannot be used in a file name", org)
            }
        }
    }
}

/// Whether `name` can be embedded in a report file name without leaving the
/// output directory
pub fn valid_cohort_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Cohorts to report on, plus the organizations that were dropped
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CohortPlan {
    pub cohorts: Vec<Cohort>,
    pub warnings: Vec<CohortWarning>,
}

/// Build one cohort per configured organization (sorted by name) followed by
/// the combined `all` cohort.
///
/// Blacklisted usernames are removed first. When no organization is
/// configured, `all` holds every remaining identity.
pub fn build_cohorts(
    identities: &[Identity],
    organizations: &BTreeSet<String>,
    blacklist: &BTreeSet<String>,
) -> CohortPlan {
    let mut plan = CohortPlan::default();

    if organizations.is_empty() {
        plan.cohorts.push(Cohort {
            name: ALL_COHORT.to_string(),
            members: identities
                .iter()
                .filter(|i| !blacklist.contains(&i.username))
                .cloned()
                .collect(),
        });
        return plan;
    }

    let mut everyone = Vec::new();
    for org in organizations {
        if !valid_cohort_name(org) {
            plan.warnings.push(CohortWarning::InvalidName(org.clone()));
            continue;
        }

        let declared: Vec<&Identity> = identities
            .iter()
            .filter(|i| i.organization.as_deref() == Some(org.as_str()))
            .collect();

        if declared.is_empty() {
            plan.warnings
                .push(CohortWarning::UnknownOrganization(org.clone()));
            continue;
        }

        let members: Vec<Identity> = declared
            .into_iter()
            .filter(|i| !blacklist.contains(&i.username))
            .cloned()
            .collect();

        if members.is_empty() {
            plan.warnings
                .push(CohortWarning::FullyBlacklisted(org.clone()));
            continue;
        }

        everyone.extend(members.iter().cloned());
        plan.cohorts.push(Cohort {
            name: org.clone(),
            members,
        });
    }

    plan.cohorts.push(Cohort {
        name: ALL_COHORT.to_string(),
        members: everyone,
    });

    for w in &plan.warnings {
        warn!("skipping cohort: {}", w);
    }

    plan
}
