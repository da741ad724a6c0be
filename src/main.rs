mod config;
mod coordinator;
mod errors;
mod linky;
mod mqtt;
mod setup;
mod statistics;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use config::{Config, MeterConfig};
use coordinator::RefreshCoordinator;
use linky::AsyncLinkyClient;
use mqtt::MqttPublisher;
use statistics::{SqliteStore, StatisticsStore};
use tracing::{error, info};

/// Linky MQTT Bridge - Publishes Enedis Linky meter data to MQTT
#[derive(Parser)]
#[command(name = "linky-mqtt-rs")]
#[command(version)]
#[command(about = "Linky MQTT Bridge - Publishes Enedis Linky meter data to MQTT", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the API and publish sensors (default)
    Run,
    /// Validate a token and add a metering point to the configuration
    Setup {
        /// Bearer token issued by the Enedis data gateway
        #[arg(long)]
        token: String,
        /// Metering point to configure, required when the token grants several
        #[arg(long)]
        prm: Option<String>,
        /// Base URL of the Enedis data gateway
        #[arg(long, default_value = config::DEFAULT_API_URL)]
        api_url: String,
    },
    /// Backfill statistics over an explicit date range
    Import {
        /// Metering point, may be omitted when only one is configured
        #[arg(long)]
        prm: Option<String>,
        /// First day of the range (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// Last day of the range (YYYY-MM-DD), defaults to today
        #[arg(long)]
        end: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration first (to get log level)
    let config_path = cli.config;
    let config = Config::from_file(&config_path)?;

    // Initialize tracing with log level from config
    let app_log_level = config.default.log_level.as_str();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("linky_mqtt_rs={}", app_log_level).parse()?)
                .add_directive("rumqttc=warn".parse()?), // Only show warnings/errors from rumqttc
        )
        .init();

    info!("Configuration loaded from: {}", config_path.display());
    info!("Log level: {}", config.default.log_level);
    info!("  MQTT Root: {}", config.mqtt.root);
    info!("  Configured meters: {}", config.meters.len());

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run_bridge(config).await,
        Command::Setup {
            token,
            prm,
            api_url,
        } => run_setup(config, &config_path, &token, prm.as_deref(), &api_url),
        Command::Import { prm, start, end } => run_import(config, prm.as_deref(), &start, end.as_deref()).await,
    }
}

fn run_setup(
    mut config: Config,
    config_path: &Path,
    token: &str,
    prm: Option<&str>,
    api_url: &str,
) -> anyhow::Result<()> {
    let prm = setup::run(&mut config, config_path, token, prm, api_url)?;
    info!("Setup complete for metering point {prm}");
    info!("Start the bridge with: linky-mqtt-rs --config {}", config_path.display());
    Ok(())
}

/// Resolves the meter record an operation targets
fn select_meter<'a>(config: &'a Config, prm: Option<&str>) -> anyhow::Result<&'a MeterConfig> {
    match prm {
        Some(prm) => config
            .meters
            .iter()
            .find(|meter| meter.prm == prm)
            .ok_or_else(|| anyhow::anyhow!("metering point {prm} is not configured")),
        None => match config.meters.as_slice() {
            [] => Err(anyhow::anyhow!(
                "no metering point configured, run setup first"
            )),
            [meter] => Ok(meter),
            _ => Err(anyhow::anyhow!(
                "several metering points are configured, pick one with --prm"
            )),
        },
    }
}

async fn run_import(
    config: Config,
    prm: Option<&str>,
    start: &str,
    end: Option<&str>,
) -> anyhow::Result<()> {
    let meter = select_meter(&config, prm)?;

    let start = NaiveDate::parse_from_str(start, "%Y-%m-%d")
        .map_err(|e| anyhow::anyhow!("invalid start date '{start}': {e}"))?;
    let end = match end {
        Some(end) => NaiveDate::parse_from_str(end, "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("invalid end date '{end}': {e}"))?,
        None => Utc::now().date_naive(),
    };

    let client = AsyncLinkyClient::new(&meter.token, Some(&meter.prm), &meter.api_url)?;
    let store = SqliteStore::new(&config.statistics.database);

    info!(
        "Importing statistics for {} from {start} to {end}",
        meter.prm
    );
    statistics::import_historical(&client, &store, start, end, meter.request_delay).await?;

    Ok(())
}

async fn run_bridge(config: Config) -> anyhow::Result<()> {
    if config.meters.is_empty() {
        anyhow::bail!("no metering point configured, run setup first");
    }

    let store = Arc::new(SqliteStore::new(&config.statistics.database));
    info!(
        "Statistics store: {}",
        config.statistics.database.display()
    );

    let mut publishers = Vec::new();
    for meter in &config.meters {
        let publisher = meter_publisher(&config, meter)?;
        publishers.push(publisher.clone());

        let meter = meter.clone();
        let store = store.clone();
        tokio::spawn(async move {
            if let Err(err) = meter_loop(meter, publisher, store).await {
                error!("{err:#}");
                std::process::exit(1);
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("Received ctrl-c, shutting down");

    for publisher in &publishers {
        let _ = publisher.publish_online_status(false).await;
    }

    Ok(())
}

fn meter_publisher(config: &Config, meter: &MeterConfig) -> anyhow::Result<MqttPublisher> {
    let device_id = format!("linky-{}", meter.prm);
    info!("Creating MQTT publisher for {device_id}...");
    Ok(MqttPublisher::new(&config.mqtt, device_id)?)
}

async fn meter_loop(
    meter: MeterConfig,
    publisher: MqttPublisher,
    store: Arc<dyn StatisticsStore>,
) -> anyhow::Result<()> {
    let client = AsyncLinkyClient::new(&meter.token, Some(&meter.prm), &meter.api_url)
        .map_err(|err| anyhow::anyhow!("metering point {}: {err}", meter.prm))?;
    let coordinator = RefreshCoordinator::new(client, store, meter.request_delay);

    publisher.publish_discovery(&meter.prm).await?;
    info!("✓ Published discovery for {}", meter.prm);

    publisher.publish_online_status(true).await?;
    info!("✓ Published online status");

    let mut interval = tokio::time::interval(meter.scan_interval);
    let mut last_snapshot = None;
    let mut first_refresh = true;

    loop {
        // The first tick fires immediately: the eager startup refresh
        interval.tick().await;

        match coordinator.refresh().await {
            Ok(snapshot) => {
                info!(
                    "Refreshed {}: consumption={} load_curve={} max_power={} production={}",
                    meter.prm,
                    snapshot.daily_consumption.is_some(),
                    snapshot.load_curve.is_some(),
                    snapshot.max_power.is_some(),
                    snapshot.daily_production.is_some(),
                );
                publisher
                    .publish_snapshot(&snapshot, last_snapshot.as_ref())
                    .await?;
                last_snapshot = Some(snapshot);
            }
            Err(err @ errors::RefreshError::Authentication(_)) => {
                // A rejected token never recovers on its own
                return Err(anyhow::anyhow!(
                    "metering point {}: {err}, re-run setup with a fresh token",
                    meter.prm
                ));
            }
            Err(err) if first_refresh => {
                // Starting broken is indistinguishable from running broken
                // unless the first cycle fails loudly
                return Err(anyhow::anyhow!(
                    "metering point {}: first refresh failed: {err}",
                    meter.prm
                ));
            }
            Err(err) => {
                error!("Refresh failed for {}: {err}", meter.prm);
                publisher.publish_all_unavailable().await?;
                last_snapshot = None;
            }
        }

        first_refresh = false;
    }
}
