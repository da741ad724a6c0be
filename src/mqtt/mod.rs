//! MQTT publishing module
//!
//! Sensor projections, Home Assistant discovery and state publishing.

pub mod context;
pub mod publisher;
pub mod types;

pub use publisher::MqttPublisher;
pub use types::{SensorDescription, SENSORS};
