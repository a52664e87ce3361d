use std::time::Duration;

use base64::{prelude::BASE64_STANDARD, Engine};
use chrono_tz::Tz;
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use ureq::Agent;

use crate::coordinator::ForecastSource;
use crate::entry::ConfigEntry;
use crate::error::{EntryError, ForecastError};
use crate::forecast::{Estimate, ForecastEntry, DEFAULT_INTERVAL};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Blocking client for the Solar Manager cloud forecast endpoint.
pub struct SolarManagerClient {
    agent: Agent,
    url: Option<String>,
    authorization: Option<String>,
    timezone: Tz,
}

impl SolarManagerClient {
    pub fn new(url: Option<String>, credentials: Option<(&str, &str)>, timezone: Tz) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build()
            .into();
        let authorization = credentials.map(|(username, password)| {
            format!(
                "Basic {}",
                BASE64_STANDARD.encode(format!("{username}:{password}"))
            )
        });
        Self {
            agent,
            url,
            authorization,
            timezone,
        }
    }

    pub fn from_entry(entry: &ConfigEntry) -> Result<Self, EntryError> {
        Ok(Self::new(
            entry.endpoint(),
            entry.credentials(),
            entry.timezone()?,
        ))
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    fn fetch(&self, url: &str) -> Result<String, ForecastError> {
        debug!("Requesting forecast from {url}");
        let mut request = self.agent.get(url).header("Accept", "application/json");
        if let Some(authorization) = &self.authorization {
            request = request.header("Authorization", authorization.as_str());
        }
        let mut response = request.call().map_err(classify)?;
        Ok(response.body_mut().read_to_string()?)
    }
}

impl ForecastSource for SolarManagerClient {
    fn estimate(&self) -> Result<Estimate, ForecastError> {
        let url = self.url.as_deref().ok_or(ForecastError::MissingEndpoint)?;
        let body = self.fetch(url)?;
        parse_forecast(&body, self.timezone)
    }
}

fn classify(err: ureq::Error) -> ForecastError {
    match err {
        ureq::Error::StatusCode(status @ (401 | 403)) => ForecastError::Auth(status),
        err => ForecastError::Network(err),
    }
}

/// Build an estimate from the body of a forecast response, which carries
/// the series in its `data` array.
pub fn parse_forecast(body: &str, timezone: Tz) -> Result<Estimate, ForecastError> {
    let payload: Value =
        serde_json::from_str(body).map_err(|e| ForecastError::Parse(e.to_string()))?;
    let Some(data) = payload.get("data").and_then(Value::as_array) else {
        return Err(ForecastError::Parse(
            "'data' field missing or not a list".to_string(),
        ));
    };
    let entries = data
        .iter()
        .map(ForecastEntry::deserialize)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ForecastError::Parse(format!("invalid forecast entry: {e}")))?;
    debug!("Received {} forecast entries", entries.len());

    Estimate::from_entries(entries, timezone, DEFAULT_INTERVAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::UTC;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn body() -> String {
        json!({
            "data": [
                {"t": "2024-06-01T10:15:00Z", "pW": 1500, "pWmin": 900},
                {"t": "2024-06-01T10:00:00Z", "pW": 1200.7},
                {"t": "2024-06-01T10:30:00Z", "pW": null}
            ]
        })
        .to_string()
    }

    #[test]
    fn fetches_with_basic_auth() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/forecast")
            // user:pass
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body())
            .create();

        let client = SolarManagerClient::new(
            Some(format!("{}/forecast", server.url())),
            Some(("user", "pass")),
            UTC,
        );
        let estimate = client.estimate().unwrap();

        let watts: Vec<i64> = estimate.watts().map(|(_, w)| w).collect();
        assert_eq!(watts, vec![1200, 1500, 0]);
        mock.assert();
    }

    #[test]
    fn sends_no_authorization_without_credentials() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/forecast")
            .match_header("authorization", Matcher::Missing)
            .with_status(200)
            .with_body(body())
            .create();

        let client = SolarManagerClient::new(Some(format!("{}/forecast", server.url())), None, UTC);
        assert!(client.estimate().is_ok());
        mock.assert();
    }

    #[test]
    fn rejected_credentials_are_an_auth_error() {
        let mut server = Server::new();
        let mock = server.mock("GET", "/forecast").with_status(401).create();

        let client = SolarManagerClient::new(
            Some(format!("{}/forecast", server.url())),
            Some(("user", "wrong")),
            UTC,
        );
        let err = client.estimate().unwrap_err();
        assert!(matches!(err, ForecastError::Auth(401)));
        assert!(err.requires_reauth());
        mock.assert();
    }

    #[test]
    fn server_errors_are_network_errors() {
        let mut server = Server::new();
        let mock = server.mock("GET", "/forecast").with_status(503).create();

        let client = SolarManagerClient::new(Some(format!("{}/forecast", server.url())), None, UTC);
        let err = client.estimate().unwrap_err();
        assert!(matches!(err, ForecastError::Network(_)));
        assert!(!err.requires_reauth());
        mock.assert();
    }

    #[test]
    fn unexpected_payload_is_a_parse_error() {
        let mut server = Server::new();
        let mock = server
            .mock("GET", "/forecast")
            .with_status(200)
            .with_body(r#"{"data": {"t": "2024-06-01T10:00:00Z"}}"#)
            .create();

        let client = SolarManagerClient::new(Some(format!("{}/forecast", server.url())), None, UTC);
        assert!(matches!(client.estimate(), Err(ForecastError::Parse(_))));
        mock.assert();
    }

    #[test]
    fn missing_endpoint_is_reported_without_a_request() {
        let client = SolarManagerClient::new(None, None, UTC);
        assert!(matches!(
            client.estimate(),
            Err(ForecastError::MissingEndpoint)
        ));
    }

    #[test]
    fn entry_builds_the_cloud_url() {
        let entry = ConfigEntry {
            smid: Some("abc".to_string()),
            ..Default::default()
        };
        let client = SolarManagerClient::from_entry(&entry).unwrap();
        assert_eq!(
            client.url(),
            Some("https://cloud.solar-manager.ch/v3/users/abc/data/forecast")
        );
    }

    #[test]
    fn parse_rejects_non_json() {
        assert!(matches!(
            parse_forecast("<html>maintenance</html>", UTC),
            Err(ForecastError::Parse(_))
        ));
        assert!(matches!(
            parse_forecast(r#"{"error": "nope"}"#, UTC),
            Err(ForecastError::Parse(_))
        ));
    }
}
