use serde::Serialize;

use crate::sensors::{SensorDescription, SensorKind};

/// `DeviceConfig` is used to define the configuration for a Home Assistant device
/// in the MQTT discovery protocol and is used to group entities together.
///
#[derive(Serialize, Clone)]
pub struct DeviceConfig {
    name: String,
    model: String,
    identifiers: Vec<String>,
    manufacturer: String,
    configuration_url: String,
    sw_version: String, // Software version of the application that supplies the discovered MQTT item.
}

impl DeviceConfig {
    pub fn new(name: String, identifier: String) -> Self {
        Self {
            name,
            model: "PV production forecast".to_string(),
            identifiers: vec![identifier],
            manufacturer: "Solar Manager".to_string(),
            configuration_url: "https://solarmanager.ch".to_string(),
            // Rust compiler sets the CARGO_PKG_VERSION environment from the Cargo.toml .
            sw_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Topics shared by all sensors of one device.
pub struct Topics {
    pub state: String,
    pub attributes: String,
    pub availability: String,
}

/// `SensorConfig` is used to define the configuration for a Home Assistant sensor entity
/// in the MQTT discovery protocol.
///
/// More information about the MQTT discovery protocol can be found here:
/// https://www.home-assistant.io/docs/mqtt/discovery/
///
/// More information about the Home assistant sensor entities can be found here:
/// https://developers.home-assistant.io/docs/core/entity/sensor/
///
#[derive(Serialize)]
pub struct SensorConfig {
    pub unique_id: String,  //  A globally unique identifier for the sensor.
    object_id: String,      // Keeps the entity id stable, e.g. sensor.power_production_now
    name: String,           // The name of the sensor.
    state_topic: String,    // The MQTT topic where sensor readings will be published.
    value_template: String, // A template to extract a value from the mqtt message.
    availability_topic: String,
    enabled_by_default: bool,
    device: DeviceConfig, // The device that the sensor belongs to, used to group entities together.
    unit_of_measurement: String,
    device_class: String,
    // exclude optional if they are not provided
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    json_attributes_topic: Option<String>,
}

impl SensorConfig {
    pub fn new_sensor(
        topics: &Topics,
        device_config: &DeviceConfig,
        sensor: &SensorDescription,
    ) -> Self {
        let (device_class, unit_of_measurement) = match sensor.kind {
            SensorKind::Power => ("power", "W"),
            SensorKind::Energy => ("energy", "Wh"),
        };
        SensorConfig {
            unique_id: format!("{}_{}", device_config.identifiers[0], sensor.key),
            object_id: sensor.key.to_string(),
            name: sensor.name.to_string(),
            state_topic: topics.state.clone(),
            value_template: format!("{{{{ value_json.{} }}}}", sensor.key),
            availability_topic: topics.availability.clone(),
            enabled_by_default: sensor.enabled_by_default,
            device: device_config.clone(),
            unit_of_measurement: unit_of_measurement.to_string(),
            device_class: device_class.to_string(),
            state_class: sensor.measurement.then(|| "measurement".to_string()),
            json_attributes_topic: sensor
                .forecast_attribute
                .then(|| topics.attributes.clone()),
        }
    }
}
