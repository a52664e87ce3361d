use std::path::{Path, PathBuf};
use std::{env, fs};

use anyhow::Context;
use log::{info, warn};
use serde_derive::Deserialize;
use smf2mqtt::{entry::ConfigEntry, mqtt_config::MqttConfig};

#[derive(Clone, Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub solar_manager: ConfigEntry,
    pub home_assistant: Option<MqttConfig>,
    pub simple_mqtt: Option<MqttConfig>,
}

impl Config {
    pub fn is_valid(&self) -> bool {
        self.solar_manager.validate().is_ok()
            && (self.home_assistant.as_ref().is_some_and(|x| x.is_valid())
                || self.simple_mqtt.as_ref().is_some_and(|x| x.is_valid()))
    }

    /// Load config.toml from the working directory, or next to the
    /// executable, and apply environment overrides.
    pub fn load() -> anyhow::Result<Config> {
        let mut config = match config_path() {
            Some(path) => {
                info!("loading configuration from {}", path.display());
                Self::from_file(&path)?
            }
            None => {
                warn!("Could not find config.toml, using environment only");
                Config::default()
            }
        };
        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> anyhow::Result<Config> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&contents).context("toml config unparsable")
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let entry = &mut self.solar_manager;
        // $SOLAR_MANAGER_*
        for (key, field) in [
            ("SOLAR_MANAGER_SMID", &mut entry.smid),
            ("SOLAR_MANAGER_USERNAME", &mut entry.username),
            ("SOLAR_MANAGER_PASSWORD", &mut entry.password),
            ("SOLAR_MANAGER_BASE_URL", &mut entry.base_url),
            ("SOLAR_MANAGER_TIME_ZONE", &mut entry.time_zone),
        ] {
            if let Some(value) = var(key) {
                *field = Some(value);
            }
        }

        let broker = BrokerOverrides {
            host: var("MQTT_BROKER_HOST"),
            username: var("MQTT_USERNAME"),
            password: var("MQTT_PASSWORD"),
            port: var("MQTT_PORT").map(|port| {
                port.parse().unwrap_or_else(|_| {
                    warn!("Invalid MQTT_PORT '{port}', using {DEFAULT_PORT}");
                    DEFAULT_PORT
                })
            }),
        };
        if broker.is_empty() {
            return;
        }
        broker.apply(self.home_assistant.get_or_insert_with(MqttConfig::default));
        // prefixes of an existing [simple_mqtt] section stay as configured
        if let Some(simple_mqtt) = &mut self.simple_mqtt {
            broker.apply(simple_mqtt);
        }
    }
}

const DEFAULT_PORT: u16 = 1883;

/// Broker settings taken from $MQTT_BROKER_HOST, $MQTT_USERNAME,
/// $MQTT_PASSWORD and $MQTT_PORT.
struct BrokerOverrides {
    host: Option<String>,
    username: Option<String>,
    password: Option<String>,
    port: Option<u16>,
}

impl BrokerOverrides {
    fn is_empty(&self) -> bool {
        self.host.is_none()
            && self.username.is_none()
            && self.password.is_none()
            && self.port.is_none()
    }

    fn apply(&self, config: &mut MqttConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(username) = &self.username {
            config.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.password = Some(password.clone());
        }
        if let Some(port) = self.port {
            config.port = Some(port);
        }
    }
}

// working dir first, then the directory of the executable
fn config_path() -> Option<PathBuf> {
    let cwd = env::current_dir().ok().map(|dir| dir.join("config.toml"));
    let exe = env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("config.toml")));
    cwd.into_iter().chain(exe).find(|path| path.exists())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const TOML: &str = r#"
        [solar_manager]
        smid = "SM-42"
        username = "me@example.com"
        password = "secret"
        time_zone = "Europe/Zurich"
        update_interval = 900

        [home_assistant]
        host = "broker.local"
        port = 1883
    "#;

    #[test]
    fn parses_full_config() {
        let config: Config = toml::from_str(TOML).unwrap();
        assert!(config.is_valid());
        assert_eq!(config.solar_manager.smid.as_deref(), Some("SM-42"));
        assert_eq!(config.solar_manager.update_interval, Some(900));
        assert_eq!(config.home_assistant.unwrap().host, "broker.local");
        assert!(config.simple_mqtt.is_none());
    }

    #[test]
    fn needs_an_output() {
        let config: Config = toml::from_str("[solar_manager]\nsmid = \"SM-42\"\n").unwrap();
        assert!(!config.is_valid());
    }

    #[test]
    fn environment_overrides_file() {
        let mut config: Config = toml::from_str(TOML).unwrap();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SOLAR_MANAGER_SMID", "SM-99"),
            ("MQTT_BROKER_HOST", "mosquitto"),
            ("MQTT_PORT", "not-a-port"),
        ]);
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.solar_manager.smid.as_deref(), Some("SM-99"));
        assert_eq!(config.solar_manager.password.as_deref(), Some("secret"));
        let mqtt = config.home_assistant.unwrap();
        assert_eq!(mqtt.host, "mosquitto");
        assert_eq!(mqtt.port, Some(1883));
    }

    #[test]
    fn environment_keeps_simple_mqtt_prefixes() {
        let toml = format!(
            "{TOML}\n[simple_mqtt]\nhost = \"old\"\ntopic_prefix = \"pv\"\n"
        );
        let mut config: Config = toml::from_str(&toml).unwrap();
        config.home_assistant.as_mut().unwrap().discovery_prefix = Some("ha".to_string());
        let vars: HashMap<&str, &str> = HashMap::from([
            ("MQTT_BROKER_HOST", "mosquitto"),
            ("MQTT_USERNAME", "bridge"),
        ]);
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        let simple = config.simple_mqtt.unwrap();
        assert_eq!(simple.host, "mosquitto");
        assert_eq!(simple.username.as_deref(), Some("bridge"));
        assert_eq!(simple.topic_prefix.as_deref(), Some("pv"));
        assert!(simple.discovery_prefix.is_none());
        assert_eq!(config.home_assistant.unwrap().discovery_prefix.as_deref(), Some("ha"));
    }

    #[test]
    fn environment_without_broker_leaves_outputs_alone() {
        let mut config: Config = toml::from_str(TOML).unwrap();
        config.apply_env(|key| (key == "SOLAR_MANAGER_USERNAME").then(|| "other".to_string()));
        assert_eq!(config.solar_manager.username.as_deref(), Some("other"));
        assert!(config.simple_mqtt.is_none());
        assert_eq!(config.home_assistant.unwrap().host, "broker.local");
    }

    #[test]
    fn environment_alone_is_enough() {
        let mut config = Config::default();
        let vars: HashMap<&str, &str> = HashMap::from([
            ("SOLAR_MANAGER_SMID", "SM-1"),
            ("MQTT_BROKER_HOST", "mosquitto"),
        ]);
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));
        assert!(config.is_valid());
    }
}
