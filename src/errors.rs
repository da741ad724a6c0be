//! Error types for the Linky-MQTT bridge
//!
//! Uses thiserror for ergonomic error definitions.
//! These errors can be converted to anyhow::Error in the main application.

use crate::config::ConfigError;

/// Errors raised by the Enedis data API client
#[derive(Debug, thiserror::Error)]
pub enum LinkyError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("no access to metering point {0}")]
    PrmAccess(String),

    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("API request failed: {0}")]
    Api(String),
}

/// Cycle-level failures of the refresh coordinator
///
/// Per-endpoint failures are swallowed inside a cycle; only authentication
/// rejection and a cycle with no usable data at all surface here.
#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error("authentication failed, a new token is required: {0}")]
    Authentication(String),

    #[error("no consumption data could be fetched from the API")]
    NoData,
}

/// Statistics store and import errors
#[derive(Debug, thiserror::Error)]
pub enum StatisticsError {
    #[error("invalid import range: {0}")]
    InvalidRange(String),

    #[error("statistics store failure: {0}")]
    Store(#[from] rusqlite::Error),

    #[error(transparent)]
    Api(#[from] LinkyError),
}

/// Setup flow failures, rendered as user guidance by the CLI
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("no access to metering point {0}")]
    PrmAccess(String),

    #[error("several metering points are associated with this token, pick one with --prm: {}", .0.join(", "))]
    MultiplePrms(Vec<String>),

    #[error("metering point {0} is already configured")]
    AlreadyConfigured(String),

    #[error("token validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// MQTT connection and publishing errors
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("Failed to publish message to topic '{topic}': {reason}")]
    PublishFailed { topic: String, reason: String },

    #[error("Failed to serialize data: {error:?}")]
    SerializationError { error: serde_json::Error },

    #[error("MQTT client error: {0}")]
    ClientError(String),
}
