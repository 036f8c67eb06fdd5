//! Directory identities and the cohorts built from them

use serde::{Deserialize, Serialize};

/// Usernames longer than this are shortened in log output
const DISPLAY_USERNAME_MAX: usize = 50;

/// A consumer identity as listed by the user directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub username: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
}

impl Identity {
    /// "First Last username", with long usernames cut to 50 chars + "..."
    pub fn display_name(&self) -> String {
        let username = if self.username.chars().count() > DISPLAY_USERNAME_MAX {
            let head: String = self.username.chars().take(DISPLAY_USERNAME_MAX).collect();
            format!("{}...", head)
        } else {
            self.username.clone()
        };

        [
            self.first_name.as_deref(),
            self.last_name.as_deref(),
            Some(username.as_str()),
        ]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// A named set of identities reported on together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cohort {
    pub name: String,
    pub members: Vec<Identity>,
}

impl Cohort {
    pub fn usernames(&self) -> impl Iterator<Item = &str> {
        self.members.iter().map(|m| m.username.as_str())
    }
}
