use crate::coordinator::{Snapshot, UpdateStatus};
use crate::diagnostics::Diagnostics;
use crate::energy::solar_forecast;
use crate::entry::{ConfigEntry, ATTRIBUTION, DOMAIN};
use crate::forecast::Estimate;
use crate::home_assistant_config::{DeviceConfig, SensorConfig, Topics};
use crate::metric_collector::MetricCollector;
use crate::mqtt_config::MqttConfig;
use crate::mqtt_wrapper::{LastWill, MqttWrapper, QoS};
use crate::sensors::{self, SENSORS};

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::Serialize;
use serde_json::Value;

const ONLINE: &str = "online";
const OFFLINE: &str = "offline";

/// Publishes the forecast as Home Assistant entities using MQTT discovery.
pub struct HomeAssistant<MQTT: MqttWrapper> {
    client: MQTT,
    entry: ConfigEntry,
    device_config: DeviceConfig,
    discovery_topic: String,
    topics: Topics,
    energy_topic: String,
    diagnostics_topic: String,
    configs_published: bool,
    published: Option<(u64, UpdateStatus)>,
}

impl<MQTT: MqttWrapper> HomeAssistant<MQTT> {
    pub fn new(config: &MqttConfig, entry: &ConfigEntry) -> Self {
        let device_id = entry.device_id();
        let base_topic = format!("{DOMAIN}/{device_id}");
        let discovery_prefix = config
            .discovery_prefix
            .as_deref()
            .unwrap_or("homeassistant");
        let topics = Topics {
            state: format!("{base_topic}/state"),
            attributes: format!("{base_topic}/attributes"),
            availability: format!("{base_topic}/availability"),
        };
        let last_will = LastWill {
            topic: topics.availability.clone(),
            payload: OFFLINE.to_string(),
        };
        let client = MQTT::new(config, "-ha", Some(last_will));
        Self {
            client,
            entry: entry.clone(),
            device_config: DeviceConfig::new(
                "Solar production forecast".to_string(),
                device_id.clone(),
            ),
            discovery_topic: format!("{discovery_prefix}/sensor/{device_id}"),
            topics,
            energy_topic: format!("{base_topic}/energy_forecast"),
            diagnostics_topic: format!("{base_topic}/diagnostics"),
            configs_published: false,
            published: None,
        }
    }

    pub fn client(&self) -> &MQTT {
        &self.client
    }

    fn publish_json<T: Serialize>(&mut self, topic: &str, payload: &T) {
        match serde_json::to_string(payload) {
            Ok(payload) => self.publish_text(topic, payload),
            Err(e) => error!("Failed to serialize payload for {topic}: {e}"),
        }
    }

    fn publish_text(&mut self, topic: &str, payload: String) {
        debug!("Publishing to {topic} with payload {payload}");
        if let Err(e) = self.client.publish(topic, QoS::AtMostOnce, true, payload) {
            error!("Failed to publish message: {e:?}");
        }
    }

    fn publish_configs(&mut self) {
        // configs let home assistant know what sensors are available and where to find them
        let configs: Vec<SensorConfig> = SENSORS
            .iter()
            .map(|sensor| SensorConfig::new_sensor(&self.topics, &self.device_config, sensor))
            .collect();
        for sensor_config in &configs {
            let config_topic =
                format!("{}/{}/config", self.discovery_topic, sensor_config.unique_id);
            self.publish_json(&config_topic, sensor_config);
        }
        info!("Announced {} sensors to Home Assistant", configs.len());
    }

    fn publish_states(&mut self, estimate: &Estimate, now: DateTime<Utc>) {
        // states contain the actual data
        let states = Value::Object(sensors::states(estimate, now));
        let topic = self.topics.state.clone();
        self.publish_json(&topic, &states);

        let mut attributes = sensors::attributes(estimate, now);
        attributes["attribution"] = ATTRIBUTION.into();
        let topic = self.topics.attributes.clone();
        self.publish_json(&topic, &attributes);
    }

    fn publish_availability(&mut self, available: bool) {
        let topic = self.topics.availability.clone();
        let payload = if available { ONLINE } else { OFFLINE };
        self.publish_text(&topic, payload.to_string());
    }

    /// Energy dashboard series and diagnostics only change with a new
    /// estimate or a status change.
    fn publish_forecast(&mut self, snapshot: &Snapshot) {
        let marker = (snapshot.generation, snapshot.status);
        if self.published == Some(marker) {
            return;
        }
        let topic = self.energy_topic.clone();
        match solar_forecast(snapshot.estimate.as_deref()) {
            Some(forecast) => self.publish_json(&topic, &forecast),
            // an empty retained message clears the previous forecast
            None => self.publish_text(&topic, String::new()),
        }
        let diagnostics = Diagnostics::new(&self.entry, snapshot);
        let topic = self.diagnostics_topic.clone();
        self.publish_json(&topic, &diagnostics);
        self.published = Some(marker);
    }
}

impl<MQTT: MqttWrapper> MetricCollector for HomeAssistant<MQTT> {
    fn publish(&mut self, snapshot: &Snapshot) {
        if !self.configs_published {
            self.publish_configs();
            self.configs_published = true;
        }

        let available = snapshot.is_available();
        if let (true, Some(estimate)) = (available, snapshot.estimate.as_deref()) {
            self.publish_states(estimate, snapshot.now);
        }
        self.publish_availability(available);
        self.publish_forecast(snapshot);
    }

    fn shutdown(&mut self) {
        self.publish_availability(false);
    }
}
