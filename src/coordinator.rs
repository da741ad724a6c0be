//! Refresh coordinator
//!
//! One coordinator per configured meter. Each cycle fetches the five data
//! series for the trailing week, strictly sequentially with a small delay
//! between calls (the gateway caps at 5 requests per second). A failed
//! endpoint leaves its field absent and the cycle carries on; an
//! authentication rejection aborts the cycle immediately. A cycle that
//! yields none of the three primary series at all is a failure, production
//! data alone is never enough.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, Utc};
use tracing::{debug, warn};

use crate::errors::{LinkyError, RefreshError};
use crate::linky::{AsyncLinkyClient, MeteringData};
use crate::statistics::{self, StatisticsStore};

/// Number of trailing days fetched per refresh cycle
const FETCH_WINDOW_DAYS: u64 = 7;

/// The bundle of series from one refresh cycle.
///
/// Built fresh each cycle and handed out as an immutable value, so
/// consumers always see a complete snapshot, never a half-updated one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinkySnapshot {
    pub daily_consumption: Option<MeteringData>,
    pub load_curve: Option<MeteringData>,
    pub max_power: Option<MeteringData>,
    pub daily_production: Option<MeteringData>,
    pub production_load_curve: Option<MeteringData>,
}

impl LinkySnapshot {
    /// True when none of the primary consumption series came back
    pub fn is_empty(&self) -> bool {
        self.daily_consumption.is_none() && self.load_curve.is_none() && self.max_power.is_none()
    }
}

pub struct RefreshCoordinator {
    client: AsyncLinkyClient,
    store: Arc<dyn StatisticsStore>,
    request_delay: Duration,
}

impl RefreshCoordinator {
    pub fn new(
        client: AsyncLinkyClient,
        store: Arc<dyn StatisticsStore>,
        request_delay: Duration,
    ) -> Self {
        Self {
            client,
            store,
            request_delay,
        }
    }

    /// Runs one refresh cycle and returns the new snapshot.
    ///
    /// On success the fetched daily series are also committed to the
    /// statistics store; a store failure is logged and swallowed, it never
    /// fails an otherwise-successful cycle.
    pub async fn refresh(&self) -> Result<LinkySnapshot, RefreshError> {
        // The API typically serves data up to yesterday
        let end = Utc::now().date_naive();
        let start = end - Days::new(FETCH_WINDOW_DAYS);

        let mut snapshot = LinkySnapshot::default();

        snapshot.daily_consumption = self
            .try_fetch("daily consumption", self.client.get_daily_consumption(start, end))
            .await?;
        self.pause().await;

        snapshot.load_curve = self
            .try_fetch(
                "load curve",
                self.client.get_consumption_load_curve(start, end),
            )
            .await?;
        self.pause().await;

        snapshot.max_power = self
            .try_fetch("max power", self.client.get_max_power(start, end))
            .await?;
        self.pause().await;

        // Production endpoints fail for meters without solar panels
        snapshot.daily_production = self
            .try_fetch("daily production", self.client.get_daily_production(start, end))
            .await?;
        self.pause().await;

        snapshot.production_load_curve = self
            .try_fetch(
                "production load curve",
                self.client.get_production_load_curve(start, end),
            )
            .await?;

        if snapshot.is_empty() {
            return Err(RefreshError::NoData);
        }

        if let Err(err) = statistics::record_snapshot(&*self.store, self.client.prm(), &snapshot) {
            warn!("failed to record statistics: {err}");
        }

        Ok(snapshot)
    }

    /// One guarded fetch: API errors degrade to an absent series,
    /// authentication rejection aborts the whole cycle.
    async fn try_fetch<F>(&self, label: &str, fetch: F) -> Result<Option<MeteringData>, RefreshError>
    where
        F: Future<Output = Result<MeteringData, LinkyError>>,
    {
        match fetch.await {
            Ok(data) => Ok(Some(data)),
            Err(LinkyError::Authentication(reason)) => {
                Err(RefreshError::Authentication(reason))
            }
            Err(err) => {
                debug!("failed to fetch {label}: {err}");
                Ok(None)
            }
        }
    }

    async fn pause(&self) {
        tokio::time::sleep(self.request_delay).await;
    }
}
