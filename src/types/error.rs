use thiserror::Error;

/// usage-report error types
#[derive(Error, Debug)]
pub enum ReportError {
    /// File I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport-level HTTP failure (connect, timeout, TLS)
    #[error("http error: {0}")]
    Http(String),

    /// Metering service answered with a non-success status
    #[error("fetch failed with status {status}: {message}")]
    Fetch { status: u16, message: String },

    /// Login was rejected
    #[error("login failed: {0}")]
    Login(String),

    /// Failed to parse a service response or a file
    #[error("parse error: {0}")]
    Parse(String),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),

    /// Invalid year/month input for period planning
    #[error("invalid period: {0}")]
    Period(String),
}

impl From<reqwest::Error> for ReportError {
    fn from(err: reqwest::Error) -> Self {
        ReportError::Http(err.to_string())
    }
}

/// Result type alias for usage-report
pub type Result<T> = std::result::Result<T, ReportError>;
