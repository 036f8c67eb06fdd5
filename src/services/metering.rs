//! Metering service client
//!
//! Talks to the usage and user endpoints of the metering service. The rest of
//! the crate only sees the [`UsageSource`] and [`DirectorySource`] traits.

use std::fmt;
use std::time::Duration;

use chrono::NaiveDate;
use reqwest::blocking::{Client, Response};
use reqwest::header::{COOKIE, SET_COOKIE};
use serde::Deserialize;
use tracing::debug;

use crate::types::{Frequency, Identity, ReportError, Result, UsageRecord};

/// Environment variable holding the service username
pub const USERNAME_ENV: &str = "METERING_USERNAME";
/// Environment variable holding the service password
pub const PASSWORD_ENV: &str = "METERING_PASSWORD";

const LOGIN_PATH: &str = "/auth/login";
const USAGE_PATH: &str = "/api/usage";
const USER_PATH: &str = "/api/user";

/// Source of usage records for one query
pub trait UsageSource {
    fn fetch_usage(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>>;
}

/// Source of identities known to the service
pub trait DirectorySource {
    fn list_identities(&self) -> Result<Vec<Identity>>;
}

/// Login credentials
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Read credentials from `METERING_USERNAME` / `METERING_PASSWORD`
    pub fn from_env() -> Result<Self> {
        let read = |name: &str| {
            std::env::var(name)
                .map_err(|_| ReportError::Config(format!("environment variable {} is not set", name)))
        };
        Ok(Self {
            username: read(USERNAME_ENV)?,
            password: read(PASSWORD_ENV)?,
        })
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// An authenticated session. Created by [`MeteringClient::login`] and passed
/// to every request made during one run.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    cookie: String,
}

impl Session {
    /// Build a session from the `Set-Cookie` values of a login response.
    /// Only the `name=value` part of each cookie is kept.
    pub fn from_set_cookie<'a>(values: impl IntoIterator<Item = &'a str>) -> Option<Self> {
        let pairs: Vec<&str> = values
            .into_iter()
            .filter_map(|v| v.split(';').next())
            .map(str::trim)
            .filter(|pair| pair.contains('='))
            .collect();
        if pairs.is_empty() {
            return None;
        }
        Some(Self {
            cookie: pairs.join("; "),
        })
    }

    /// Value for the `Cookie` request header
    pub fn cookie_header(&self) -> &str {
        &self.cookie
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// One usage request: a frequency, a date window, and the users and clouds
/// to include
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageQuery {
    pub frequency: Frequency,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub users: Vec<String>,
    pub clouds: Vec<String>,
}

fn any_of(field: &str, values: &[String]) -> Option<String> {
    if values.is_empty() {
        return None;
    }
    let clauses: Vec<String> = values
        .iter()
        .map(|v| format!("{}='{}'", field, v))
        .collect();
    Some(format!("({})", clauses.join(" or ")))
}

impl UsageQuery {
    /// CIMI filter expression for this query, e.g.
    /// `frequency='monthly' and start-timestamp>=2017-06-01 and end-timestamp<=2017-07-01 and (user='a') and (cloud='x')`
    pub fn filter(&self) -> String {
        let mut parts = vec![
            format!("frequency='{}'", self.frequency),
            format!("start-timestamp>={}", self.start.format("%Y-%m-%d")),
            format!("end-timestamp<={}", self.end.format("%Y-%m-%d")),
        ];
        parts.extend(any_of("user", &self.users));
        parts.extend(any_of("cloud", &self.clouds));
        parts.join(" and ")
    }
}

#[derive(Debug, Deserialize)]
struct UsageCollection {
    #[serde(default)]
    usages: Vec<UsageRecord>,
}

#[derive(Debug, Deserialize)]
struct UserCollection {
    #[serde(default)]
    users: Vec<Identity>,
}

/// Parse the body of a usage query response
pub fn parse_usage_response(body: &str) -> Result<Vec<UsageRecord>> {
    let collection: UsageCollection = serde_json::from_str(body)
        .map_err(|e| ReportError::Parse(format!("invalid usage response: {}", e)))?;
    Ok(collection.usages)
}

/// Parse the body of a user listing response
pub fn parse_user_response(body: &str) -> Result<Vec<Identity>> {
    let collection: UserCollection = serde_json::from_str(body)
        .map_err(|e| ReportError::Parse(format!("invalid user response: {}", e)))?;
    Ok(collection.users)
}

/// Blocking HTTP client for the metering service
pub struct MeteringClient {
    http: Client,
    endpoint: String,
}

impl MeteringClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.endpoint, path)
    }

    /// Log in and return the session to use for the rest of the run
    pub fn login(&self, credentials: &Credentials) -> Result<Session> {
        let response = self
            .http
            .post(self.url(LOGIN_PATH))
            .form(&[
                ("username", credentials.username.as_str()),
                ("password", credentials.password.as_str()),
            ])
            .send()?;

        if !response.status().is_success() {
            return Err(ReportError::Login(format!(
                "{} rejected credentials for {} ({})",
                self.endpoint,
                credentials.username,
                response.status()
            )));
        }

        let cookies = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok());
        Session::from_set_cookie(cookies)
            .ok_or_else(|| ReportError::Login("login response carried no session cookie".into()))
    }

    /// Fetch usage records matching `query`
    pub fn fetch_usage(&self, session: &Session, query: &UsageQuery) -> Result<Vec<UsageRecord>> {
        let filter = query.filter();
        debug!(url = %self.url(USAGE_PATH), %filter, "requesting usage");

        let response = self
            .http
            .put(self.url(USAGE_PATH))
            .header(COOKIE, session.cookie_header())
            .form(&[("$filter", filter.as_str())])
            .send()?;

        parse_usage_response(&Self::success_body(response)?)
    }

    /// List every identity visible to the session
    pub fn list_identities(&self, session: &Session) -> Result<Vec<Identity>> {
        let response = self
            .http
            .get(self.url(USER_PATH))
            .header(COOKIE, session.cookie_header())
            .send()?;

        parse_user_response(&Self::success_body(response)?)
    }

    fn success_body(response: Response) -> Result<String> {
        let status = response.status();
        let body = response.text()?;
        if !status.is_success() {
            return Err(ReportError::Fetch {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(body)
    }

    /// Bind a session to this client for use through the source traits
    pub fn with_session(&self, session: Session) -> SessionClient<'_> {
        SessionClient {
            client: self,
            session,
        }
    }
}

/// A client paired with the session of the current run
pub struct SessionClient<'a> {
    client: &'a MeteringClient,
    session: Session,
}

impl UsageSource for SessionClient<'_> {
    fn fetch_usage(&self, query: &UsageQuery) -> Result<Vec<UsageRecord>> {
        self.client.fetch_usage(&self.session, query)
    }
}

impl DirectorySource for SessionClient<'_> {
    fn list_identities(&self) -> Result<Vec<Identity>> {
        self.client.list_identities(&self.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Measure;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn query(users: &[&str], clouds: &[&str]) -> UsageQuery {
        UsageQuery {
            frequency: Frequency::Monthly,
            start: date(2017, 6, 1),
            end: date(2017, 7, 1),
            users: users.iter().map(|s| s.to_string()).collect(),
            clouds: clouds.iter().map(|s| s.to_string()).collect(),
        }
    }

    // ========== UsageQuery::filter ==========

    #[test]
    fn test_filter_full() {
        let q = query(&["alice", "bob"], &["exo-gva"]);
        assert_eq!(
            q.filter(),
            "frequency='monthly' and start-timestamp>=2017-06-01 and end-timestamp<=2017-07-01 \
             and (user='alice' or user='bob') and (cloud='exo-gva')"
        );
    }

    #[test]
    fn test_filter_omits_empty_clauses() {
        let q = query(&[], &[]);
        assert_eq!(
            q.filter(),
            "frequency='monthly' and start-timestamp>=2017-06-01 and end-timestamp<=2017-07-01"
        );
    }

    #[test]
    fn test_filter_weekly() {
        let mut q = query(&["a"], &["x"]);
        q.frequency = Frequency::Weekly;
        assert!(q.filter().starts_with("frequency='weekly'"));
    }

    // ========== Session ==========

    #[test]
    fn test_session_from_set_cookie() {
        let session = Session::from_set_cookie([
            "com.sixsq.slipstream.cookie=token=abc; Path=/; HttpOnly",
            "other=1; Secure",
        ])
        .unwrap();
        assert_eq!(
            session.cookie_header(),
            "com.sixsq.slipstream.cookie=token=abc; other=1"
        );
    }

    #[test]
    fn test_session_from_no_cookie() {
        assert!(Session::from_set_cookie(Vec::<&str>::new()).is_none());
        assert!(Session::from_set_cookie(["; Path=/"]).is_none());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let creds = Credentials {
            username: "ada".into(),
            password: "hunter2".into(),
        };
        assert!(!format!("{:?}", creds).contains("hunter2"));
        let session = Session::from_set_cookie(["sid=secret"]).unwrap();
        assert!(!format!("{:?}", session).contains("secret"));
    }

    // ========== response parsing ==========

    #[test]
    fn test_parse_usage_response() {
        let body = r#"{
            "count": 2,
            "usages": [
                {"user": "a", "cloud": "x", "usage": {"vm": {"unit-minutes": 60}}},
                {"user": "a", "usage": {"ram": {"unit-minutes": null}}}
            ]
        }"#;
        let records = parse_usage_response(body).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].usage["vm"]["unit-minutes"], Measure::Number(60.0));
        assert!(records[1].cloud.is_none());
    }

    #[test]
    fn test_parse_usage_response_without_usages() {
        let records = parse_usage_response(r#"{"count": 0}"#).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_parse_usage_response_invalid() {
        let err = parse_usage_response("<html>").unwrap_err();
        assert!(matches!(err, ReportError::Parse(_)));
    }

    #[test]
    fn test_parse_user_response() {
        let body = r#"{"users": [{"username": "ada", "organization": "CERN"}, {"username": "bob"}]}"#;
        let users = parse_user_response(body).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].organization.as_deref(), Some("CERN"));
        assert!(users[1].organization.is_none());
    }

    #[test]
    fn test_client_trims_endpoint() {
        let client = MeteringClient::new("https://nuv.la/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.endpoint(), "https://nuv.la");
        assert_eq!(client.url(USAGE_PATH), "https://nuv.la/api/usage");
    }
}
