use std::time::Duration;

use chrono_tz::Tz;
use serde_derive::Deserialize;
use serde_json::{json, Value};

use crate::error::EntryError;

pub const DOMAIN: &str = "solar_manager_forecast";
pub const NAME: &str = "Solar Manager Forecast";
pub const ATTRIBUTION: &str = "Data provided by Solar Manager (cloud.solar-manager.ch)";

const API_BASE: &str = "https://cloud.solar-manager.ch";
const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30 * 60);
const REDACTED: &str = "**REDACTED**";

/// User supplied settings for one Solar Manager installation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ConfigEntry {
    pub name: Option<String>,
    pub smid: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Only used when no Smart Manager ID is configured.
    pub base_url: Option<String>,
    pub time_zone: Option<String>,
    /// Seconds between two forecast updates.
    pub update_interval: Option<u64>,
}

impl ConfigEntry {
    pub fn validate(&self) -> Result<(), EntryError> {
        if non_empty(&self.smid).is_none() && non_empty(&self.base_url).is_none() {
            return Err(EntryError::MissingSmartManagerId);
        }
        if self.update_interval == Some(0) {
            return Err(EntryError::InvalidUpdateInterval);
        }
        self.timezone()?;
        Ok(())
    }

    pub fn title(&self) -> &str {
        non_empty(&self.name).unwrap_or(NAME)
    }

    /// Stable identifier used for MQTT topics and unique ids.
    pub fn device_id(&self) -> String {
        let source = non_empty(&self.smid).unwrap_or_else(|| self.title());
        let slug: String = source
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("smf_{slug}")
    }

    /// The forecast endpoint. A Smart Manager ID takes precedence over an
    /// explicit base URL.
    pub fn endpoint(&self) -> Option<String> {
        match non_empty(&self.smid) {
            Some(smid) => Some(format!("{API_BASE}/v3/users/{smid}/data/forecast")),
            None => non_empty(&self.base_url).map(str::to_string),
        }
    }

    /// Basic auth credentials, only when both parts are present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((non_empty(&self.username)?, non_empty(&self.password)?))
    }

    pub fn timezone(&self) -> Result<Tz, EntryError> {
        match non_empty(&self.time_zone) {
            None => Ok(Tz::UTC),
            Some(name) => name
                .parse()
                .map_err(|_| EntryError::InvalidTimeZone(name.to_string())),
        }
    }

    pub fn update_interval(&self) -> Duration {
        self.update_interval
            .filter(|&secs| secs > 0)
            .map_or(DEFAULT_UPDATE_INTERVAL, Duration::from_secs)
    }

    /// The entry with credentials and the installation id masked.
    pub fn redacted(&self) -> Value {
        let mask = |value: &Option<String>| value.as_ref().map(|_| REDACTED);
        json!({
            "name": self.name,
            "smid": mask(&self.smid),
            "username": mask(&self.username),
            "password": mask(&self.password),
            "base_url": self.base_url,
            "time_zone": self.time_zone,
            "update_interval": self.update_interval,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry() -> ConfigEntry {
        ConfigEntry {
            smid: Some("SM-1234".to_string()),
            username: Some("user@example.com".to_string()),
            password: Some("secret".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn smid_is_required_without_base_url() {
        let entry = ConfigEntry::default();
        assert_eq!(entry.validate(), Err(EntryError::MissingSmartManagerId));

        let entry = ConfigEntry {
            base_url: Some("http://localhost:8080/forecast".to_string()),
            ..Default::default()
        };
        assert_eq!(entry.validate(), Ok(()));
    }

    #[test]
    fn smid_wins_over_base_url() {
        let entry = ConfigEntry {
            base_url: Some("http://localhost:8080/forecast".to_string()),
            ..entry()
        };
        assert_eq!(
            entry.endpoint().as_deref(),
            Some("https://cloud.solar-manager.ch/v3/users/SM-1234/data/forecast")
        );
    }

    #[test]
    fn credentials_need_both_parts() {
        assert_eq!(entry().credentials(), Some(("user@example.com", "secret")));
        let entry = ConfigEntry {
            password: Some(" ".to_string()),
            ..entry()
        };
        assert_eq!(entry.credentials(), None);
    }

    #[test]
    fn time_zone_defaults_to_utc_and_is_validated() {
        assert_eq!(entry().timezone(), Ok(Tz::UTC));

        let zurich = ConfigEntry {
            time_zone: Some("Europe/Zurich".to_string()),
            ..entry()
        };
        assert_eq!(zurich.timezone(), Ok(chrono_tz::Europe::Zurich));

        let bogus = ConfigEntry {
            time_zone: Some("Mars/Olympus".to_string()),
            ..entry()
        };
        assert_eq!(
            bogus.validate(),
            Err(EntryError::InvalidTimeZone("Mars/Olympus".to_string()))
        );
    }

    #[test]
    fn update_interval_defaults_to_thirty_minutes() {
        assert_eq!(entry().update_interval(), Duration::from_secs(1800));
        let entry = ConfigEntry {
            update_interval: Some(600),
            ..entry()
        };
        assert_eq!(entry.update_interval(), Duration::from_secs(600));
    }

    #[test]
    fn device_id_is_a_topic_safe_slug() {
        assert_eq!(entry().device_id(), "smf_sm_1234");
        assert_eq!(
            ConfigEntry {
                base_url: Some("http://x".to_string()),
                ..Default::default()
            }
            .device_id(),
            "smf_solar_manager_forecast"
        );
    }

    #[test]
    fn redaction_hides_secrets() {
        let redacted = entry().redacted();
        assert_eq!(redacted["smid"], REDACTED);
        assert_eq!(redacted["username"], REDACTED);
        assert_eq!(redacted["password"], REDACTED);
        assert_eq!(redacted["time_zone"], Value::Null);
        assert!(!redacted.to_string().contains("secret"));
    }
}
