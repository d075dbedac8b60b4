//! Networked backend
//!
//! Each actuator is a smart device listening on its own MQTT topic for
//! `ON`/`OFF` payloads. Publishes use QoS 1 and count as delivered only
//! once the broker's PUBACK arrives within the confirm timeout.

use super::ActuatorBackend;
use crate::error::{HvacError, Result};
use crate::models::{ActuatorCommand, Device};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Outgoing, Packet, QoS};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Publish order for one command
const PUBLISH_ORDER: [Device; 3] = [Device::Fan, Device::Cooler, Device::Heater];

/// Pause between reconnect attempts after a connection error
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Broker connection and topic layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttSettings {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub keep_alive_secs: u64,
    pub fan_topic: String,
    pub heater_topic: String,
    pub cooler_topic: String,
    pub confirm_timeout_secs: u64,
}

impl Default for MqttSettings {
    fn default() -> Self {
        let topics = MqttTopics::default();
        Self {
            broker_host: "mqtt.example.com".to_string(),
            broker_port: 1883,
            client_id: "hvac-agent".to_string(),
            keep_alive_secs: 60,
            fan_topic: topics.fan,
            heater_topic: topics.heater,
            cooler_topic: topics.cooler,
            confirm_timeout_secs: 5,
        }
    }
}

impl MqttSettings {
    pub fn topics(&self) -> MqttTopics {
        MqttTopics {
            fan: self.fan_topic.clone(),
            heater: self.heater_topic.clone(),
            cooler: self.cooler_topic.clone(),
        }
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs.max(1))
    }
}

/// Topic per actuator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttTopics {
    pub fan: String,
    pub heater: String,
    pub cooler: String,
}

impl Default for MqttTopics {
    fn default() -> Self {
        Self {
            fan: "home/hvac/fan".to_string(),
            heater: "home/hvac/heater".to_string(),
            cooler: "home/hvac/ac".to_string(),
        }
    }
}

impl MqttTopics {
    pub fn topic_for(&self, device: Device) -> &str {
        match device {
            Device::Fan => &self.fan,
            Device::Heater => &self.heater,
            Device::Cooler => &self.cooler,
        }
    }
}

/// Confirmed publish to a message broker
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish and wait for the broker's acknowledgement
    async fn publish(&self, topic: &str, payload: &str) -> Result<()>;

    async fn disconnect(&self) -> Result<()>;
}

/// Publishes one message per actuator
pub struct NetworkedBackend<P> {
    publisher: P,
    topics: MqttTopics,
}

impl<P: Publisher> NetworkedBackend<P> {
    pub fn new(publisher: P, topics: MqttTopics) -> Self {
        Self { publisher, topics }
    }

    pub fn topics(&self) -> &MqttTopics {
        &self.topics
    }
}

#[async_trait]
impl<P: Publisher> ActuatorBackend for NetworkedBackend<P> {
    fn name(&self) -> &'static str {
        "networked"
    }

    async fn apply(&self, command: &ActuatorCommand) -> Result<()> {
        for device in PUBLISH_ORDER {
            let topic = self.topics.topic_for(device);
            let payload = command.state_of(device).payload();
            self.publisher.publish(topic, payload).await?;
            debug!(topic, payload, "Actuator command delivered");
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        self.publisher.disconnect().await
    }
}

/// rumqttc client with its event loop running on a background task
pub struct RumqttPublisher {
    client: AsyncClient,
    events: broadcast::Sender<Event>,
    confirm_timeout: Duration,
    /// One publish in flight at a time, so the next outgoing packet id is ours
    in_flight: Mutex<()>,
}

impl RumqttPublisher {
    /// Connect to the broker and wait for it to accept the session
    pub async fn connect(settings: &MqttSettings) -> Result<Self> {
        let mut options = MqttOptions::new(
            settings.client_id.clone(),
            settings.broker_host.clone(),
            settings.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(settings.keep_alive_secs.max(5)));

        let (client, mut eventloop) = AsyncClient::new(options, 16);
        let (events, mut connected) = broadcast::channel(64);
        let forward = events.clone();

        let driver = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        debug!("MQTT event loop stopping after disconnect");
                        break;
                    }
                    Ok(event) => {
                        let _ = forward.send(event);
                    }
                    Err(e) => {
                        warn!(error = %e, "MQTT connection error, reconnecting");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                }
            }
        });

        let broker = format!("{}:{}", settings.broker_host, settings.broker_port);
        let wait_connack = async {
            loop {
                match connected.recv().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => return true,
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => return false,
                }
            }
        };

        let confirm_timeout = settings.confirm_timeout();
        match timeout(confirm_timeout, wait_connack).await {
            Ok(true) => {
                info!(broker = %broker, client_id = %settings.client_id, "Connected to MQTT broker");
                Ok(Self {
                    client,
                    events,
                    confirm_timeout,
                    in_flight: Mutex::new(()),
                })
            }
            _ => {
                driver.abort();
                Err(HvacError::Delivery {
                    topic: broker,
                    reason: format!("broker did not accept connection within {:?}", confirm_timeout),
                })
            }
        }
    }
}

#[async_trait]
impl Publisher for RumqttPublisher {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        let _guard = self.in_flight.lock().await;
        let mut events = self.events.subscribe();

        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload.as_bytes().to_vec())
            .await
            .map_err(|e| HvacError::Delivery {
                topic: topic.to_string(),
                reason: e.to_string(),
            })?;

        let acked = async {
            let mut pkid = None;
            loop {
                match events.recv().await {
                    Ok(Event::Outgoing(Outgoing::Publish(id))) if pkid.is_none() => pkid = Some(id),
                    Ok(Event::Incoming(Packet::PubAck(ack))) if Some(ack.pkid) == pkid => {
                        return Ok::<(), String>(())
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "MQTT event subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        return Err("event loop stopped".to_string())
                    }
                }
            }
        };

        match timeout(self.confirm_timeout, acked).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(HvacError::Delivery {
                topic: topic.to_string(),
                reason,
            }),
            Err(_) => Err(HvacError::Delivery {
                topic: topic.to_string(),
                reason: format!("no PUBACK within {:?}", self.confirm_timeout),
            }),
        }
    }

    async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from MQTT broker");
        self.client.disconnect().await.map_err(|e| HvacError::Delivery {
            topic: "disconnect".to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl<T: Publisher + ?Sized> Publisher for Arc<T> {
    async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
        (**self).publish(topic, payload).await
    }

    async fn disconnect(&self) -> Result<()> {
        (**self).disconnect().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: StdMutex<Vec<(String, String)>>,
        fail_topic: Option<String>,
        disconnected: StdMutex<bool>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, topic: &str, payload: &str) -> Result<()> {
            if self.fail_topic.as_deref() == Some(topic) {
                return Err(HvacError::Delivery {
                    topic: topic.to_string(),
                    reason: "no PUBACK".to_string(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }

        async fn disconnect(&self) -> Result<()> {
            *self.disconnected.lock().unwrap() = true;
            Ok(())
        }
    }

    fn sent(p: &RecordingPublisher) -> Vec<(String, String)> {
        p.sent.lock().unwrap().clone()
    }

    fn pairs(expected: &[(&str, &str)]) -> Vec<(String, String)> {
        expected
            .iter()
            .map(|(t, p)| (t.to_string(), p.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_cooling_publishes_in_order() {
        let publisher = Arc::new(RecordingPublisher::default());
        let backend = NetworkedBackend::new(publisher.clone(), MqttTopics::default());

        backend.apply(&ActuatorCommand::cooling()).await.unwrap();
        assert_eq!(
            sent(&publisher),
            pairs(&[
                ("home/hvac/fan", "ON"),
                ("home/hvac/ac", "ON"),
                ("home/hvac/heater", "OFF"),
            ])
        );
    }

    #[tokio::test]
    async fn test_idle_publishes_all_off() {
        let publisher = Arc::new(RecordingPublisher::default());
        let backend = NetworkedBackend::new(publisher.clone(), MqttTopics::default());

        backend.apply(&ActuatorCommand::idle()).await.unwrap();
        assert!(sent(&publisher).iter().all(|(_, payload)| payload == "OFF"));
        assert_eq!(sent(&publisher).len(), 3);
    }

    #[tokio::test]
    async fn test_unconfirmed_publish_is_delivery_error() {
        let publisher = Arc::new(RecordingPublisher {
            fail_topic: Some("home/hvac/ac".to_string()),
            ..Default::default()
        });
        let backend = NetworkedBackend::new(publisher.clone(), MqttTopics::default());

        let err = backend.apply(&ActuatorCommand::heating()).await.unwrap_err();
        assert!(matches!(err, HvacError::Delivery { ref topic, .. } if topic == "home/hvac/ac"));
        // fan went out before the failure, heater never did
        assert_eq!(sent(&publisher), pairs(&[("home/hvac/fan", "OFF")]));
    }

    #[tokio::test]
    async fn test_shutdown_disconnects() {
        let publisher = Arc::new(RecordingPublisher::default());
        let backend = NetworkedBackend::new(publisher.clone(), MqttTopics::default());
        backend.shutdown().await.unwrap();
        assert!(*publisher.disconnected.lock().unwrap());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = MqttSettings::default();
        assert_eq!(settings.broker_port, 1883);
        assert_eq!(settings.keep_alive_secs, 60);
        assert_eq!(settings.topics(), MqttTopics::default());
        assert_eq!(settings.confirm_timeout(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_unreachable_broker_fails_connect() {
        let settings = MqttSettings {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1,
            confirm_timeout_secs: 1,
            ..Default::default()
        };
        let err = RumqttPublisher::connect(&settings).await.err().unwrap();
        assert_eq!(err.kind(), "delivery");
    }
}
