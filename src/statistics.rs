//! Long-term cumulative statistics
//!
//! Daily energy readings are folded into an ever-growing running sum, one
//! point per day, so dashboards can chart consumption history far beyond
//! the API's trailing window. Each new point's sum is the previous stored
//! sum plus the day's value; the sum is never recomputed from scratch.
//!
//! Two entry points share the merge: the incremental commit after every
//! refresh cycle (which skips days at or before the last stored point, so
//! overlapping windows never double-count) and the user-triggered
//! historical import over an explicit date range.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::coordinator::LinkySnapshot;
use crate::errors::{LinkyError, StatisticsError};
use crate::linky::{AsyncLinkyClient, MeteringData};

/// One stored point of a cumulative series
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatisticPoint {
    /// Day start, midnight UTC
    pub start: DateTime<Utc>,
    /// The day's value in watt-hours
    pub state: f64,
    /// Running sum of all values through this day
    pub sum: f64,
}

/// Statistics sink: last-point lookup and batch append per statistic id
pub trait StatisticsStore: Send + Sync {
    fn last_point(&self, statistic_id: &str) -> Result<Option<StatisticPoint>, StatisticsError>;

    fn append(&self, statistic_id: &str, points: &[StatisticPoint])
        -> Result<(), StatisticsError>;
}

pub fn consumption_statistic_id(prm: &str) -> String {
    format!("{prm}_energy_consumption")
}

pub fn production_statistic_id(prm: &str) -> String {
    format!("{prm}_energy_production")
}

/// SQLite-backed statistics store
///
/// The connection is opened per operation; the path is the only state, so
/// the store is freely shareable across meter tasks.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db_path: PathBuf,
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS statistics (
    statistic_id TEXT NOT NULL,
    start TEXT NOT NULL,
    state REAL NOT NULL,
    sum REAL NOT NULL,
    PRIMARY KEY (statistic_id, start)
)";

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    fn connect(&self) -> Result<Connection, StatisticsError> {
        let conn = Connection::open(&self.db_path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }
}

impl StatisticsStore for SqliteStore {
    fn last_point(&self, statistic_id: &str) -> Result<Option<StatisticPoint>, StatisticsError> {
        let conn = self.connect()?;

        let mut stmt = conn.prepare(
            "SELECT start, state, sum FROM statistics
             WHERE statistic_id = ?1
             ORDER BY start DESC LIMIT 1",
        )?;

        let mut rows = stmt.query_map([statistic_id], |row| {
            Ok(StatisticPoint {
                start: row.get(0)?,
                state: row.get(1)?,
                sum: row.get(2)?,
            })
        })?;

        rows.next().transpose().map_err(StatisticsError::from)
    }

    fn append(
        &self,
        statistic_id: &str,
        points: &[StatisticPoint],
    ) -> Result<(), StatisticsError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        for point in points {
            tx.execute(
                "INSERT INTO statistics (statistic_id, start, state, sum)
                 VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![statistic_id, point.start, point.state, point.sum],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

/// Folds a fetched series into cumulative points, continuing from `last`.
///
/// With `skip_recorded`, readings at or before the last stored point's day
/// are dropped; the historical import path disables the skip because its
/// range was chosen explicitly by the caller.
pub fn cumulative_points(
    series: &MeteringData,
    last: Option<&StatisticPoint>,
    skip_recorded: bool,
) -> Vec<StatisticPoint> {
    let mut sum = last.map_or(0.0, |point| point.sum);
    let lower_bound = if skip_recorded {
        last.map(|point| point.start)
    } else {
        None
    };

    let mut points = Vec::with_capacity(series.interval_reading.len());
    for reading in &series.interval_reading {
        let start = reading.day_start();
        if let Some(bound) = lower_bound {
            if start <= bound {
                continue;
            }
        }
        sum += reading.value;
        points.push(StatisticPoint {
            start,
            state: reading.value,
            sum,
        });
    }
    points
}

/// Merges one series into the store. Returns the number of appended points.
pub fn record_series(
    store: &dyn StatisticsStore,
    statistic_id: &str,
    series: &MeteringData,
    skip_recorded: bool,
) -> Result<usize, StatisticsError> {
    let last = store.last_point(statistic_id)?;
    let points = cumulative_points(series, last.as_ref(), skip_recorded);

    if points.is_empty() {
        debug!("no new statistics for {statistic_id}");
        return Ok(0);
    }

    store.append(statistic_id, &points)?;
    Ok(points.len())
}

/// Incremental commit after a refresh cycle: consumption and production
/// merge independently; an absent series contributes nothing.
pub fn record_snapshot(
    store: &dyn StatisticsStore,
    prm: &str,
    snapshot: &LinkySnapshot,
) -> Result<(), StatisticsError> {
    if let Some(series) = &snapshot.daily_consumption {
        let appended = record_series(store, &consumption_statistic_id(prm), series, true)?;
        debug!("recorded {appended} consumption statistics for {prm}");
    }
    if let Some(series) = &snapshot.daily_production {
        let appended = record_series(store, &production_statistic_id(prm), series, true)?;
        debug!("recorded {appended} production statistics for {prm}");
    }
    Ok(())
}

/// Rejects a historical import range before any network call is made
pub fn validate_range(
    start: NaiveDate,
    end: NaiveDate,
    today: NaiveDate,
) -> Result<(), StatisticsError> {
    if start > end {
        return Err(StatisticsError::InvalidRange(format!(
            "start {start} is after end {end}"
        )));
    }
    if end > today {
        return Err(StatisticsError::InvalidRange(format!(
            "end {end} is in the future"
        )));
    }
    Ok(())
}

/// User-triggered backfill over an explicit date range.
///
/// Consumption is required; production is fetched on a best-effort basis
/// (points without a production meter reply with an API error, which is
/// logged and skipped). Authentication rejection always propagates.
pub async fn import_historical(
    client: &AsyncLinkyClient,
    store: &dyn StatisticsStore,
    start: NaiveDate,
    end: NaiveDate,
    request_delay: Duration,
) -> Result<(), StatisticsError> {
    validate_range(start, end, Utc::now().date_naive())?;

    let prm = client.prm().to_string();

    let consumption = client.get_daily_consumption(start, end).await?;
    let appended = record_series(store, &consumption_statistic_id(&prm), &consumption, false)?;
    info!("imported {appended} consumption statistics for {prm}");

    tokio::time::sleep(request_delay).await;

    match client.get_daily_production(start, end).await {
        Ok(production) => {
            let appended =
                record_series(store, &production_statistic_id(&prm), &production, false)?;
            info!("imported {appended} production statistics for {prm}");
        }
        Err(err @ LinkyError::Authentication(_)) => return Err(err.into()),
        Err(err) => debug!("no production data to import: {err}"),
    }

    Ok(())
}
