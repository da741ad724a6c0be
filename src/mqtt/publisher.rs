use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde_json::json;
use std::time::Duration;

use crate::config::MqttConfig;
use crate::coordinator::LinkySnapshot;
use crate::errors::MqttError;
use crate::mqtt::context::PublishContext;
use crate::mqtt::types::SENSORS;

const DISCOVERY_PREFIX: &str = "homeassistant";

#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    root_topic: String,
    device_id: String,
}

/// Publishes a projected value only when it differs from the previous
/// snapshot's projection (all state topics are retained)
macro_rules! publish_if_changed {
    ($context:expr, $topic:expr, $projection:expr, $snapshot:expr, $old:expr) => {
        let current = ($projection)($snapshot);
        if $old.map(|o| ($projection)(o)) != Some(current.clone()) {
            if let Some(payload) = current {
                $context.publish($topic, &payload).await?;
            }
        }
    };
}

impl MqttPublisher {
    pub fn new(config: &MqttConfig, device_id: String) -> Result<Self, MqttError> {
        let client_id = format!("linky-mqtt-rs-{}", device_id);

        tracing::info!("Using MQTT TCP connection: {}:{}", config.host, config.port);
        let mut mqtt_options = MqttOptions::new(client_id, &config.host, config.port);

        if !config.username.is_empty() {
            mqtt_options.set_credentials(&config.username, &config.password);
        }

        mqtt_options.set_keep_alive(Duration::from_secs(60));

        // Last Will and Testament - mark the bridge offline when the
        // connection is lost
        let online_topic = format!("{}/{}/online", config.root, device_id);
        mqtt_options.set_last_will(rumqttc::LastWill {
            topic: online_topic.clone(),
            message: b"offline".to_vec().into(),
            qos: QoS::AtLeastOnce,
            retain: true,
        });

        let (client, mut event_loop) = AsyncClient::new(mqtt_options, 10);

        // Drive the connection in the background; on a broker error, crash
        // the process (let it crash philosophy)
        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!("MQTT connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!("MQTT connection error: {:?}", e);
                        std::process::exit(1);
                    }
                }
            }
        });

        let root_topic = format!("{}/{}", config.root, device_id);

        Ok(Self {
            client,
            root_topic,
            device_id,
        })
    }

    pub fn context(&'_ self, topic: &str) -> PublishContext<'_> {
        let full_topic = if topic.is_empty() {
            self.root_topic.clone()
        } else {
            format!("{}/{}", self.root_topic, topic)
        };
        PublishContext::new(&self.client, full_topic)
    }

    pub async fn publish_online_status(&self, online: bool) -> Result<(), MqttError> {
        let context = self.context("");
        context
            .publish("online", &if online { "online" } else { "offline" })
            .await
    }

    /// Announce the six sensors to Home Assistant via MQTT discovery,
    /// grouped under one Linky device keyed by the metering point
    pub async fn publish_discovery(&self, prm: &str) -> Result<(), MqttError> {
        let device = json!({
            "identifiers": [self.device_id],
            "manufacturer": "Enedis",
            "model": "Linky",
            "name": format!("Linky {prm}"),
        });

        for sensor in &SENSORS {
            let config_topic = format!(
                "{}/sensor/{}/{}/config",
                DISCOVERY_PREFIX, self.device_id, sensor.key
            );
            let payload = json!({
                "name": sensor.name,
                "unique_id": format!("{}_{}", prm, sensor.key),
                "state_topic": format!("{}/{}/state", self.root_topic, sensor.key),
                "json_attributes_topic": format!("{}/{}/attributes", self.root_topic, sensor.key),
                "availability": [
                    {"topic": format!("{}/online", self.root_topic)},
                    {"topic": format!("{}/{}/available", self.root_topic, sensor.key)},
                ],
                "availability_mode": "all",
                "unit_of_measurement": sensor.unit,
                "device_class": sensor.device_class,
                "state_class": sensor.state_class,
                "enabled_by_default": sensor.enabled_by_default,
                "device": device,
            });

            let payload = serde_json::to_string(&payload)
                .map_err(|error| MqttError::SerializationError { error })?;
            self.client
                .publish(&config_topic, QoS::AtLeastOnce, true, payload)
                .await
                .map_err(|e| MqttError::PublishFailed {
                    topic: config_topic,
                    reason: e.to_string(),
                })?;
        }

        Ok(())
    }

    /// Publish sensor states for a fresh snapshot.
    /// Only values that changed compared to `old` are republished.
    pub async fn publish_snapshot(
        &self,
        snapshot: &LinkySnapshot,
        old: Option<&LinkySnapshot>,
    ) -> Result<(), MqttError> {
        for sensor in &SENSORS {
            let context = self.context(sensor.key);

            let available = (sensor.available)(snapshot);
            if old.map(sensor.available) != Some(available) {
                context
                    .publish("available", &if available { "online" } else { "offline" })
                    .await?;
            }

            publish_if_changed!(context, "state", sensor.value, snapshot, old);

            if let Some(attributes) = sensor.attributes {
                publish_if_changed!(context, "attributes", attributes, snapshot, old);
            }

            if let Some(last_reset) = sensor.last_reset {
                publish_if_changed!(context, "last_reset", last_reset, snapshot, old);
            }
        }

        Ok(())
    }

    /// Mark every sensor unavailable, used when a refresh cycle fails
    pub async fn publish_all_unavailable(&self) -> Result<(), MqttError> {
        for sensor in &SENSORS {
            let context = self.context(sensor.key);
            context.publish("available", &"offline").await?;
        }
        Ok(())
    }
}
