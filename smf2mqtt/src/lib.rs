// externally visible interfaces
pub mod coordinator;
pub mod diagnostics;
pub mod energy;
pub mod entry;
pub mod error;
pub mod forecast;
pub mod home_assistant;
pub mod metric_collector;
pub mod mqtt_config;
pub mod mqtt_wrapper;
pub mod sensors;
pub mod simple_mqtt;
pub mod solar_manager;

// internal interfaces
mod home_assistant_config;

pub use chrono_tz::Tz;
