//! Data types for Enedis data gateway responses
//!
//! The gateway returns the Enedis "meter reading" JSON envelope. Numeric
//! values arrive as strings, daily series carry plain dates while load
//! curves carry full timestamps; both quirks are absorbed here.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer};

/// One metering series as returned by a single API call
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MeteringData {
    pub usage_point_id: String,
    #[serde(default)]
    pub quality: Option<String>,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub reading_type: ReadingType,
    #[serde(default)]
    pub interval_reading: Vec<IntervalReading>,
}

/// Unit and aggregation metadata attached to a series
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ReadingType {
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub measurement_kind: Option<String>,
    #[serde(default)]
    pub aggregate: Option<String>,
    #[serde(default)]
    pub measuring_period: Option<String>,
}

/// A single (timestamp, value) reading
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IntervalReading {
    #[serde(deserialize_with = "deserialize_value")]
    pub value: f64,
    #[serde(deserialize_with = "deserialize_reading_date")]
    pub date: NaiveDateTime,
    #[serde(default)]
    pub interval_length: Option<String>,
}

impl MeteringData {
    /// Most recent reading of the series, if any
    pub fn last(&self) -> Option<&IntervalReading> {
        self.interval_reading.last()
    }

    /// Sum of all readings in the series
    pub fn total(&self) -> f64 {
        self.interval_reading.iter().map(|r| r.value).sum()
    }

    /// First day of the fetched range, at midnight UTC
    pub fn range_start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start.and_time(NaiveTime::MIN))
    }
}

impl IntervalReading {
    /// The reading's day, at midnight UTC
    pub fn day_start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.date.date().and_time(NaiveTime::MIN))
    }
}

fn deserialize_value<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(value) => Ok(value),
        Raw::Text(text) => text.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn deserialize_reading_date<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| {
            NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map(|date| date.and_time(NaiveTime::MIN))
        })
        .map_err(serde::de::Error::custom)
}
