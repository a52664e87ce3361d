use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use crate::forecast::{Estimate, DEFAULT_INTERVAL};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorKind {
    Power,
    Energy,
}

/// Describes one published sensor and how its state derives from the
/// current estimate.
pub struct SensorDescription {
    pub key: &'static str,
    pub name: &'static str,
    pub kind: SensorKind,
    pub measurement: bool,
    pub enabled_by_default: bool,
    /// Whether the sensor carries the 24 h forecast list as attribute.
    pub forecast_attribute: bool,
    state: fn(&Estimate, DateTime<Utc>) -> i64,
}

impl SensorDescription {
    pub fn state(&self, estimate: &Estimate, now: DateTime<Utc>) -> i64 {
        (self.state)(estimate, now)
    }
}

pub const SENSORS: &[SensorDescription] = &[
    SensorDescription {
        key: "power_production_now",
        name: "Estimated power production - now",
        kind: SensorKind::Power,
        measurement: true,
        enabled_by_default: true,
        forecast_attribute: false,
        state: |estimate, now| estimate.power_production_at(&now),
    },
    SensorDescription {
        key: "power_production_next_15minutes",
        name: "Estimated power production - next 15 minutes",
        kind: SensorKind::Power,
        measurement: false,
        enabled_by_default: false,
        forecast_attribute: false,
        state: |estimate, now| estimate.power_production_at(&(now + DEFAULT_INTERVAL)),
    },
    SensorDescription {
        key: "power_production_next_30minutes",
        name: "Estimated power production - next 30 minutes",
        kind: SensorKind::Power,
        measurement: false,
        enabled_by_default: false,
        forecast_attribute: false,
        state: |estimate, now| estimate.power_production_at(&(now + DEFAULT_INTERVAL * 2)),
    },
    SensorDescription {
        key: "power_production_next_24h_15min",
        name: "Estimated power production - next 24 hours",
        kind: SensorKind::Power,
        measurement: true,
        enabled_by_default: false,
        forecast_attribute: true,
        state: |estimate, now| estimate.power_production_at(&now),
    },
    SensorDescription {
        key: "energy_production_next_24h",
        name: "Estimated energy production - next 24 hours",
        kind: SensorKind::Energy,
        measurement: false,
        enabled_by_default: false,
        forecast_attribute: false,
        state: |estimate, now| estimate.sum_energy_production(now, 24),
    },
];

/// State values of all sensors, keyed by sensor key.
pub fn states(estimate: &Estimate, now: DateTime<Utc>) -> Map<String, Value> {
    SENSORS
        .iter()
        .map(|sensor| (sensor.key.to_string(), sensor.state(estimate, now).into()))
        .collect()
}

/// Extra attributes: the quarter hour power list for the next 24 hours.
pub fn attributes(estimate: &Estimate, now: DateTime<Utc>) -> Value {
    json!({ "forecasts": estimate.power_production_next_24h(now) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::ForecastEntry;
    use chrono_tz::UTC;

    fn estimate() -> Estimate {
        let entries = ["00:00", "00:15", "00:30", "00:45"]
            .iter()
            .zip([100.0, 150.0, 200.0, 250.0])
            .map(|(time, power)| ForecastEntry {
                t: Some(format!("2024-06-01T{time}:00Z")),
                power_w: Some(power),
            })
            .collect();
        Estimate::from_entries(entries, UTC, DEFAULT_INTERVAL).unwrap()
    }

    #[test]
    fn keys_are_unique() {
        let mut keys: Vec<_> = SENSORS.iter().map(|s| s.key).collect();
        keys.sort_unstable();
        keys.dedup();
        assert_eq!(keys.len(), SENSORS.len());
    }

    #[test]
    fn look_ahead_sensors_shift_the_query_time() {
        let now = "2024-06-01T00:07:00Z".parse::<DateTime<Utc>>().unwrap();
        let states = states(&estimate(), now);
        assert_eq!(states["power_production_now"], 100);
        assert_eq!(states["power_production_next_15minutes"], 150);
        assert_eq!(states["power_production_next_30minutes"], 200);
        assert_eq!(states["power_production_next_24h_15min"], 100);
    }

    #[test]
    fn attributes_hold_96_values() {
        let now = "2024-06-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let attributes = attributes(&estimate(), now);
        let forecasts = attributes["forecasts"].as_array().unwrap();
        assert_eq!(forecasts.len(), 96);
        assert_eq!(forecasts[3], 250);
        assert_eq!(forecasts[95], 250);
    }
}
