//! Sensor projections over a refresh snapshot
//!
//! Six fixed sensors, each a pure view of the current snapshot: a value,
//! an availability predicate, and optionally extra attributes and a
//! last-reset timestamp for the cumulative ones. The descriptor table
//! drives both discovery announcements and state publishing; none of the
//! projection functions perform I/O.

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::coordinator::LinkySnapshot;
use crate::linky::MeteringData;

/// Declarative description of one sensor entity
pub struct SensorDescription {
    pub key: &'static str,
    pub name: &'static str,
    pub unit: &'static str,
    pub device_class: &'static str,
    pub state_class: &'static str,
    pub enabled_by_default: bool,
    pub value: fn(&LinkySnapshot) -> Option<f64>,
    pub available: fn(&LinkySnapshot) -> bool,
    pub attributes: Option<fn(&LinkySnapshot) -> Option<serde_json::Value>>,
    pub last_reset: Option<fn(&LinkySnapshot) -> Option<DateTime<Utc>>>,
}

fn last_value(series: Option<&MeteringData>) -> Option<f64> {
    series.and_then(|data| data.last()).map(|reading| reading.value)
}

fn last_day_start(series: Option<&MeteringData>) -> Option<DateTime<Utc>> {
    series.and_then(|data| data.last()).map(|reading| reading.day_start())
}

/// Extra state attributes describing the most recent reading of a series
fn reading_attributes(series: Option<&MeteringData>) -> Option<serde_json::Value> {
    let data = series?;
    let last = data.last()?;
    Some(json!({
        "usage_point_id": data.usage_point_id,
        "quality": data.quality,
        "last_value": last.value,
        "last_date": last.date.and_utc().to_rfc3339(),
    }))
}

fn daily_consumption_value(snapshot: &LinkySnapshot) -> Option<f64> {
    last_value(snapshot.daily_consumption.as_ref())
}

fn daily_consumption_available(snapshot: &LinkySnapshot) -> bool {
    snapshot.daily_consumption.is_some()
}

fn daily_consumption_attributes(snapshot: &LinkySnapshot) -> Option<serde_json::Value> {
    reading_attributes(snapshot.daily_consumption.as_ref())
}

fn daily_consumption_last_reset(snapshot: &LinkySnapshot) -> Option<DateTime<Utc>> {
    last_day_start(snapshot.daily_consumption.as_ref())
}

fn total_consumption_week_value(snapshot: &LinkySnapshot) -> Option<f64> {
    snapshot.daily_consumption.as_ref().map(MeteringData::total)
}

fn total_consumption_week_last_reset(snapshot: &LinkySnapshot) -> Option<DateTime<Utc>> {
    snapshot
        .daily_consumption
        .as_ref()
        .map(MeteringData::range_start)
}

fn current_power_value(snapshot: &LinkySnapshot) -> Option<f64> {
    last_value(snapshot.load_curve.as_ref())
}

fn current_power_available(snapshot: &LinkySnapshot) -> bool {
    snapshot.load_curve.is_some()
}

fn max_power_value(snapshot: &LinkySnapshot) -> Option<f64> {
    last_value(snapshot.max_power.as_ref())
}

fn max_power_available(snapshot: &LinkySnapshot) -> bool {
    snapshot.max_power.is_some()
}

fn max_power_attributes(snapshot: &LinkySnapshot) -> Option<serde_json::Value> {
    reading_attributes(snapshot.max_power.as_ref())
}

fn daily_production_value(snapshot: &LinkySnapshot) -> Option<f64> {
    last_value(snapshot.daily_production.as_ref())
}

fn daily_production_available(snapshot: &LinkySnapshot) -> bool {
    snapshot.daily_production.is_some()
}

fn daily_production_attributes(snapshot: &LinkySnapshot) -> Option<serde_json::Value> {
    reading_attributes(snapshot.daily_production.as_ref())
}

fn daily_production_last_reset(snapshot: &LinkySnapshot) -> Option<DateTime<Utc>> {
    last_day_start(snapshot.daily_production.as_ref())
}

fn current_production_power_value(snapshot: &LinkySnapshot) -> Option<f64> {
    last_value(snapshot.production_load_curve.as_ref())
}

fn current_production_power_available(snapshot: &LinkySnapshot) -> bool {
    snapshot.production_load_curve.is_some()
}

pub static SENSORS: [SensorDescription; 6] = [
    SensorDescription {
        key: "daily_consumption",
        name: "Daily consumption",
        unit: "Wh",
        device_class: "energy",
        state_class: "total",
        enabled_by_default: true,
        value: daily_consumption_value,
        available: daily_consumption_available,
        attributes: Some(daily_consumption_attributes),
        last_reset: Some(daily_consumption_last_reset),
    },
    SensorDescription {
        key: "total_consumption_week",
        name: "Consumption last 7 days",
        unit: "Wh",
        device_class: "energy",
        state_class: "total",
        enabled_by_default: true,
        value: total_consumption_week_value,
        available: daily_consumption_available,
        attributes: None,
        last_reset: Some(total_consumption_week_last_reset),
    },
    SensorDescription {
        key: "current_power",
        name: "Current power",
        unit: "W",
        device_class: "power",
        state_class: "measurement",
        enabled_by_default: true,
        value: current_power_value,
        available: current_power_available,
        attributes: None,
        last_reset: None,
    },
    SensorDescription {
        key: "max_power",
        name: "Max power",
        unit: "VA",
        device_class: "apparent_power",
        state_class: "measurement",
        enabled_by_default: true,
        value: max_power_value,
        available: max_power_available,
        attributes: Some(max_power_attributes),
        last_reset: None,
    },
    SensorDescription {
        key: "daily_production",
        name: "Daily production",
        unit: "Wh",
        device_class: "energy",
        state_class: "total",
        enabled_by_default: false,
        value: daily_production_value,
        available: daily_production_available,
        attributes: Some(daily_production_attributes),
        last_reset: Some(daily_production_last_reset),
    },
    SensorDescription {
        key: "current_production_power",
        name: "Current production power",
        unit: "W",
        device_class: "power",
        state_class: "measurement",
        enabled_by_default: false,
        value: current_production_power_value,
        available: current_production_power_available,
        attributes: None,
        last_reset: None,
    },
];
