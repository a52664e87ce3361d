use crate::{
    coordinator::Snapshot,
    entry::DOMAIN,
    metric_collector::MetricCollector,
    mqtt_config::MqttConfig,
    mqtt_wrapper::{MqttWrapper, QoS},
    sensors::SENSORS,
};

use log::{debug, warn};

/// Publishes every sensor value as plain text on its own topic.
pub struct SimpleMqtt<MQTT: MqttWrapper> {
    client: MQTT,
    prefix: String,
}

impl<MQTT: MqttWrapper> SimpleMqtt<MQTT> {
    pub fn new(config: &MqttConfig) -> Self {
        let client = MQTT::new(config, "-sm", None);
        let prefix = config
            .topic_prefix
            .clone()
            .unwrap_or_else(|| DOMAIN.to_string());
        Self { client, prefix }
    }

    pub fn client(&self) -> &MQTT {
        &self.client
    }
}

impl<MQTT: MqttWrapper> MetricCollector for SimpleMqtt<MQTT> {
    fn publish(&mut self, snapshot: &Snapshot) {
        let Some(estimate) = snapshot.estimate.as_deref().filter(|_| snapshot.is_available()) else {
            debug!("No current forecast, skipping plain MQTT output");
            return;
        };

        let forecast_time = snapshot.now.to_rfc3339();
        let forecast_topic = format!("{}/forecast_time", self.prefix);
        let topic_payload_pairs = std::iter::once((forecast_topic, forecast_time))
            .chain(SENSORS.iter().map(|sensor| {
                (
                    format!("{}/{}", self.prefix, sensor.key),
                    sensor.state(estimate, snapshot.now).to_string(),
                )
            }))
            .collect::<Vec<_>>();

        topic_payload_pairs
            .into_iter()
            .for_each(|(topic, payload)| {
                if let Err(e) = self.client.publish(topic, QoS::AtMostOnce, true, payload) {
                    warn!("mqtt error: {e:?}")
                }
            });
    }
}
