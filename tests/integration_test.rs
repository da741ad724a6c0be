//! Integration tests for linky-mqtt-rs
//!
//! These tests verify the core functionality without requiring access to
//! the Enedis gateway or an MQTT broker.

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use linky_mqtt_rs::config::{Config, MeterConfig, MqttConfig};
use linky_mqtt_rs::coordinator::LinkySnapshot;
use linky_mqtt_rs::errors::{LinkyError, MqttError, RefreshError, SetupError, StatisticsError};
use linky_mqtt_rs::linky::{IntervalReading, MeteringData, ReadingType};
use linky_mqtt_rs::mqtt::context::MqttPayload;
use linky_mqtt_rs::mqtt::SENSORS;
use linky_mqtt_rs::statistics::{
    consumption_statistic_id, record_series, SqliteStore, StatisticsStore,
};

fn daily_series(days: &[(u32, f64)]) -> MeteringData {
    MeteringData {
        usage_point_id: "12345678901234".to_string(),
        quality: Some("BRUT".to_string()),
        start: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 1, 8).unwrap(),
        reading_type: ReadingType::default(),
        interval_reading: days
            .iter()
            .map(|(day, value)| IntervalReading {
                value: *value,
                date: NaiveDate::from_ymd_opt(2024, 1, *day)
                    .unwrap()
                    .and_time(NaiveTime::MIN),
                interval_length: None,
            })
            .collect(),
    }
}

// ============================================================================
// Config Tests
// ============================================================================

#[test]
fn test_mqtt_config_debug_redacts_password() {
    let config: Config = toml::from_str(
        r#"
        [mqtt]
        host = "mqtt.example.com"
        username = "test-user"
        password = "secret-password"
        "#,
    )
    .unwrap();

    let debug_output = format!("{:?}", config.mqtt);

    // Password should be redacted
    assert!(!debug_output.contains("secret-password"));
    assert!(debug_output.contains("***REDACTED***"));

    // Username should still be visible
    assert!(debug_output.contains("test-user"));
}

#[test]
fn test_meter_config_debug_redacts_token() {
    let meter = MeterConfig::new("secret-token", "12345678901234");

    let debug_output = format!("{:?}", meter);

    // The token is a credential and must never be logged
    assert!(!debug_output.contains("secret-token"));
    assert!(debug_output.contains("***REDACTED***"));

    // The PRM should still be visible
    assert!(debug_output.contains("12345678901234"));
}

#[test]
fn test_config_defaults() {
    let config: MqttConfig = toml::from_str(
        r#"
        host = "mqtt.example.com"
        "#,
    )
    .unwrap();

    assert_eq!(config.port, 1883);
    assert_eq!(config.root, "linky");
    assert_eq!(config.username, "");
}

// ============================================================================
// MQTT Payload Tests
// ============================================================================

#[test]
fn test_mqtt_payload_f64() {
    let value = 42.5_f64;
    assert_eq!(value.to_payload(), "42.5");

    let value = 0.0_f64;
    assert_eq!(value.to_payload(), "0");

    let value = -123.456_f64;
    assert_eq!(value.to_payload(), "-123.456");
}

#[test]
fn test_mqtt_payload_bool() {
    let value = true;
    assert_eq!(value.to_payload(), "true");

    let value = false;
    assert_eq!(value.to_payload(), "false");
}

#[test]
fn test_mqtt_payload_string() {
    let value = "test".to_string();
    assert_eq!(value.to_payload(), "test");

    let value = "".to_string();
    assert_eq!(value.to_payload(), "");
}

#[test]
fn test_mqtt_payload_datetime() {
    let dt = Utc.with_ymd_and_hms(2024, 1, 15, 12, 30, 45).unwrap();
    let payload = dt.to_payload();

    // Should be RFC3339 format
    assert!(payload.starts_with("2024-01-15T12:30:45"));
    assert!(payload.contains("Z") || payload.contains("+") || payload.contains("-"));
}

#[test]
fn test_mqtt_payload_json() {
    let value = serde_json::json!({"quality": "BRUT", "last_value": 42.0});
    let payload = value.to_payload();
    assert!(payload.starts_with("{"));
    assert!(payload.contains("\"quality\":\"BRUT\""));
}

// ============================================================================
// Error Type Tests
// ============================================================================

#[test]
fn test_linky_error_display() {
    let error = LinkyError::PrmAccess("12345678901234".to_string());
    let error_string = format!("{}", error);
    assert!(error_string.contains("12345678901234"));
    assert!(error_string.contains("no access"));
}

#[test]
fn test_refresh_errors_are_distinct() {
    // Authentication failure and "no data" must be distinguishable
    let auth = RefreshError::Authentication("token expired".to_string());
    let no_data = RefreshError::NoData;

    assert!(format!("{auth}").contains("token expired"));
    assert!(format!("{no_data}").contains("no consumption data"));
    assert_ne!(format!("{auth}"), format!("{no_data}"));
}

#[test]
fn test_setup_error_lists_prms() {
    let error = SetupError::MultiplePrms(vec![
        "11111111111111".to_string(),
        "22222222222222".to_string(),
    ]);
    let error_string = format!("{}", error);
    assert!(error_string.contains("11111111111111, 22222222222222"));
    assert!(error_string.contains("--prm"));
}

#[test]
fn test_mqtt_error_publish_failed() {
    let error = MqttError::PublishFailed {
        topic: "test/topic".to_string(),
        reason: "Connection lost".to_string(),
    };
    let error_string = format!("{}", error);
    assert!(error_string.contains("test/topic"));
    assert!(error_string.contains("Connection lost"));
}

#[test]
fn test_error_type_implements_std_error() {
    // Verify that our error types implement std::error::Error
    let linky_err = LinkyError::Api("boom".to_string());
    let _: &dyn std::error::Error = &linky_err;

    let stats_err = StatisticsError::InvalidRange("bad".to_string());
    let _: &dyn std::error::Error = &stats_err;
}

// ============================================================================
// Statistics Merge Tests
// ============================================================================

fn temp_store(name: &str) -> (tempfile::TempDir, SqliteStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::new(dir.path().join(format!("{name}.db")));
    (dir, store)
}

#[test]
fn test_historical_import_accumulates_from_zero() {
    let (_dir, store) = temp_store("import");
    let id = consumption_statistic_id("12345678901234");

    let days: Vec<_> = (1..=7).map(|d| (d, 100.0)).collect();
    let appended = record_series(&store, &id, &daily_series(&days), false).unwrap();
    assert_eq!(appended, 7);

    let last = store.last_point(&id).unwrap().unwrap();
    assert_eq!(last.state, 100.0);
    assert_eq!(last.sum, 700.0);
}

#[test]
fn test_incremental_merge_is_idempotent_across_windows() {
    let (_dir, store) = temp_store("overlap");
    let id = consumption_statistic_id("12345678901234");

    // Two overlapping refresh windows: days 1-5, then 3-8
    let first: Vec<_> = (1..=5).map(|d| (d, 100.0)).collect();
    let second: Vec<_> = (3..=8).map(|d| (d, 100.0)).collect();

    record_series(&store, &id, &daily_series(&first), true).unwrap();
    record_series(&store, &id, &daily_series(&second), true).unwrap();

    // Each of the 8 days counted exactly once
    let last = store.last_point(&id).unwrap().unwrap();
    assert_eq!(last.sum, 800.0);
}

#[test]
fn test_incremental_merge_continues_from_stored_point() {
    let (_dir, store) = temp_store("continue");
    let id = consumption_statistic_id("12345678901234");

    let recorded: Vec<_> = (1..=5).map(|d| (d, 100.0)).collect();
    record_series(&store, &id, &daily_series(&recorded), true).unwrap();

    let window: Vec<_> = (1..=8).map(|d| (d, 100.0)).collect();
    let appended = record_series(&store, &id, &daily_series(&window), true).unwrap();

    // Only days 6, 7 and 8 are new
    assert_eq!(appended, 3);
    let last = store.last_point(&id).unwrap().unwrap();
    assert_eq!(last.sum, 800.0);
    assert_eq!(
        last.start,
        Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2024, 1, 8)
                .unwrap()
                .and_time(NaiveTime::MIN)
        )
    );
}

// ============================================================================
// Sensor Projection Tests
// ============================================================================

#[test]
fn test_sensor_availability_matches_snapshot() {
    let snapshot = LinkySnapshot {
        daily_consumption: Some(daily_series(&[(1, 100.0)])),
        load_curve: None,
        max_power: Some(daily_series(&[(1, 4200.0)])),
        daily_production: None,
        production_load_curve: None,
    };

    for sensor in &SENSORS {
        let expected = match sensor.key {
            "daily_consumption" | "total_consumption_week" | "max_power" => true,
            _ => false,
        };
        assert_eq!(
            (sensor.available)(&snapshot),
            expected,
            "availability mismatch for {}",
            sensor.key
        );
    }
}

#[test]
fn test_snapshot_projection_values() {
    let snapshot = LinkySnapshot {
        daily_consumption: Some(daily_series(&[(1, 100.0), (2, 250.0)])),
        ..Default::default()
    };

    let daily = SENSORS
        .iter()
        .find(|s| s.key == "daily_consumption")
        .unwrap();
    let weekly = SENSORS
        .iter()
        .find(|s| s.key == "total_consumption_week")
        .unwrap();

    assert_eq!((daily.value)(&snapshot), Some(250.0));
    assert_eq!((weekly.value)(&snapshot), Some(350.0));
}
