//! Setup flow
//!
//! Validates a token, discovers the metering points it grants, optionally
//! narrows the choice to one of them, and appends the resulting meter
//! record to the configuration file. The flow is linear: token entry,
//! point selection (only when the token grants several points and none
//! was requested), record creation.

use std::path::Path;

use tracing::info;

use crate::config::{Config, MeterConfig};
use crate::errors::{LinkyError, SetupError};
use crate::linky::AsyncLinkyClient;

/// Runs the whole setup flow and returns the configured PRM.
///
/// # Errors
/// `InvalidToken` when the token does not decode, `MultiplePrms` when a
/// choice is required, `PrmAccess` when the requested point is not granted,
/// `AlreadyConfigured` when a record for the point already exists.
pub fn run(
    config: &mut Config,
    config_path: &Path,
    token: &str,
    requested_prm: Option<&str>,
    api_url: &str,
) -> Result<String, SetupError> {
    // Token entry: constructing an unscoped client validates the token and
    // yields the list of accessible metering points
    let client = AsyncLinkyClient::new(token, None, api_url).map_err(|err| match err {
        LinkyError::InvalidToken(reason) => SetupError::InvalidToken(reason),
        other => SetupError::Validation(other.to_string()),
    })?;

    let prms = client.prms().to_vec();
    info!("token grants access to {} metering point(s)", prms.len());

    // Point selection: a single grant short-circuits the choice
    let prm = match requested_prm {
        Some(requested) => {
            AsyncLinkyClient::new(token, Some(requested), api_url).map_err(|err| match err {
                LinkyError::PrmAccess(prm) => SetupError::PrmAccess(prm),
                LinkyError::InvalidToken(reason) => SetupError::InvalidToken(reason),
                other => SetupError::Validation(other.to_string()),
            })?;
            requested.to_string()
        }
        None if prms.len() == 1 => prms[0].clone(),
        None => return Err(SetupError::MultiplePrms(prms)),
    };

    // Record creation, deduplicated by metering point
    if config.meters.iter().any(|meter| meter.prm == prm) {
        return Err(SetupError::AlreadyConfigured(prm));
    }

    config.meters.push(MeterConfig::new(token, prm.clone()));
    config.save(config_path)?;

    info!("metering point {prm} configured");
    Ok(prm)
}
