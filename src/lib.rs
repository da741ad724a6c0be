//! Linky to MQTT Bridge
//!
//! Polls the Enedis consumption data API for Linky smart meters and
//! publishes the results as Home Assistant sensors over MQTT, while
//! maintaining long-term cumulative statistics in a local store.

pub mod config;
pub mod coordinator;
pub mod errors;
pub mod linky;
pub mod mqtt;
pub mod setup;
pub mod statistics;

pub use config::Config;
pub use coordinator::{LinkySnapshot, RefreshCoordinator};
pub use linky::AsyncLinkyClient;
pub use mqtt::MqttPublisher;
pub use statistics::SqliteStore;
