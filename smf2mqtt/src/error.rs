use thiserror::Error;

/// Failure of a single forecast update. None of these stop the bridge; the
/// previous estimate stays current and the next scheduled update may succeed.
#[derive(Debug, Error)]
pub enum ForecastError {
    #[error("no Smart Manager ID or base URL configured")]
    MissingEndpoint,

    #[error("authentication rejected by Solar Manager (HTTP {0})")]
    Auth(u16),

    #[error("error fetching Solar Manager forecast: {0}")]
    Network(#[from] ureq::Error),

    #[error("unexpected response format: {0}")]
    Parse(String),
}

impl ForecastError {
    /// The credentials need to be fixed before any further update can succeed.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, ForecastError::Auth(_))
    }
}

/// Problems with the configured entry, reported once at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EntryError {
    #[error("Smart Manager ID is required")]
    MissingSmartManagerId,

    #[error("unknown time zone '{0}'")]
    InvalidTimeZone(String),

    #[error("update interval must be at least one second")]
    InvalidUpdateInterval,
}
