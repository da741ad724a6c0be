//! Enedis data gateway client
//!
//! Thin async HTTP client over the gateway used by Linky token holders.
//! Construction is offline: the bearer token is a JWT whose payload lists
//! the subscribed metering points, so token shape and PRM access are
//! validated before any request is made. The gateway itself remains the
//! authority on whether the token is actually accepted.

use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde::Deserialize;

use super::types::MeteringData;
use crate::errors::LinkyError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("linky-mqtt-rs/", env!("CARGO_PKG_VERSION"));

/// Async client scoped to one metering point
#[derive(Debug)]
pub struct AsyncLinkyClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    prm: String,
    prms: Vec<String>,
}

#[derive(Deserialize)]
struct TokenClaims {
    sub: Subject,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Subject {
    One(String),
    Many(Vec<String>),
}

/// Metering points listed in the token payload, comma-separated or as a list
fn decode_prms(token: &str) -> Result<Vec<String>, LinkyError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| LinkyError::InvalidToken("token is not a JWT".to_string()))?;

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| LinkyError::InvalidToken(format!("token payload is not base64: {e}")))?;

    let claims: TokenClaims = serde_json::from_slice(&bytes)
        .map_err(|e| LinkyError::InvalidToken(format!("token payload is not valid JSON: {e}")))?;

    let prms: Vec<String> = match claims.sub {
        Subject::One(raw) => raw
            .split(',')
            .map(|prm| prm.trim().to_string())
            .filter(|prm| !prm.is_empty())
            .collect(),
        Subject::Many(list) => list,
    };

    if prms.is_empty() {
        return Err(LinkyError::InvalidToken(
            "token grants access to no metering point".to_string(),
        ));
    }

    Ok(prms)
}

impl AsyncLinkyClient {
    /// Create a client for `token`, scoped to `prm` when given, otherwise to
    /// the first metering point the token grants.
    ///
    /// # Errors
    /// `InvalidToken` if the token cannot be decoded, `PrmAccess` if the
    /// requested point is not among the token's grants.
    pub fn new(token: &str, prm: Option<&str>, base_url: &str) -> Result<Self, LinkyError> {
        let prms = decode_prms(token)?;

        let prm = match prm {
            Some(requested) => {
                if !prms.iter().any(|p| p == requested) {
                    return Err(LinkyError::PrmAccess(requested.to_string()));
                }
                requested.to_string()
            }
            None => prms[0].clone(),
        };

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LinkyError::Api(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            prm,
            prms,
        })
    }

    /// All metering points the token grants access to
    pub fn prms(&self) -> &[String] {
        &self.prms
    }

    /// The metering point this client is scoped to
    pub fn prm(&self) -> &str {
        &self.prm
    }

    pub async fn get_daily_consumption(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MeteringData, LinkyError> {
        self.fetch_series("daily_consumption", start, end).await
    }

    pub async fn get_consumption_load_curve(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MeteringData, LinkyError> {
        self.fetch_series("consumption_load_curve", start, end)
            .await
    }

    pub async fn get_max_power(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MeteringData, LinkyError> {
        self.fetch_series("daily_consumption_max_power", start, end)
            .await
    }

    pub async fn get_daily_production(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MeteringData, LinkyError> {
        self.fetch_series("daily_production", start, end).await
    }

    pub async fn get_production_load_curve(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MeteringData, LinkyError> {
        self.fetch_series("production_load_curve", start, end).await
    }

    async fn fetch_series(
        &self,
        endpoint: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MeteringData, LinkyError> {
        let url = format!(
            "{}/api/{}/{}/start/{}/end/{}",
            self.base_url, endpoint, self.prm, start, end
        );

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| LinkyError::Api(format!("{endpoint}: {e}")))?;

        match response.status() {
            status if status.is_success() => {
                let envelope: MeterReadingEnvelope = response
                    .json()
                    .await
                    .map_err(|e| LinkyError::Api(format!("{endpoint}: invalid response: {e}")))?;
                Ok(envelope.meter_reading)
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(LinkyError::Authentication(
                format!("{endpoint} returned HTTP {}", response.status()),
            )),
            status => Err(LinkyError::Api(format!(
                "{endpoint} returned HTTP {status}"
            ))),
        }
    }
}

#[derive(Deserialize)]
struct MeterReadingEnvelope {
    meter_reading: MeteringData,
}
