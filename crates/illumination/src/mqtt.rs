//! MQTT transport for the illumination controller
//!
//! Publishes commands on the request topic and forwards every message received
//! on the status topic into the client's inbound stream. The event loop runs
//! in a background task; rumqttc reconnects on the next poll after an error,
//! and the status subscription is renewed on every ConnAck.

use std::time::Duration;

use contracts::{ContractError, IlluminationConfig, InboundMessage, MessageTransport, Topics};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const REQUEST_QUEUE_CAPACITY: usize = 64;
const STATUS_CHANNEL_CAPACITY: usize = 256;
const RECONNECT_BACKOFF: Duration = Duration::from_secs(1);

/// MQTT message transport
pub struct MqttTransport {
    client: AsyncClient,
    event_loop: JoinHandle<()>,
}

impl MqttTransport {
    /// Connect to the broker and subscribe to the status topic
    pub async fn connect(
        config: &IlluminationConfig,
        topics: &Topics,
    ) -> Result<(Self, mpsc::Receiver<InboundMessage>), ContractError> {
        let mut options = MqttOptions::new(
            config.client_id.clone(),
            config.broker_host.clone(),
            config.broker_port,
        );
        options.set_keep_alive(Duration::from_secs(60));

        let (client, mut eventloop) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);
        client
            .subscribe(topics.status.clone(), QoS::AtMostOnce)
            .await
            .map_err(|e| ContractError::transport("mqtt", format!("subscribe failed: {e}")))?;

        let (tx, rx) = mpsc::channel(STATUS_CHANNEL_CAPACITY);
        let resubscriber = client.clone();
        let status_topic = topics.status.clone();

        let event_loop = tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = InboundMessage::new(publish.topic, publish.payload);
                        if tx.send(message).await.is_err() {
                            debug!("Status receiver dropped, stopping MQTT event loop");
                            break;
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(topic = %status_topic, "MQTT connected");
                        if let Err(e) =
                            resubscriber.try_subscribe(status_topic.clone(), QoS::AtMostOnce)
                        {
                            warn!(error = %e, "Failed to renew status subscription");
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "MQTT connection error, retrying");
                        tokio::time::sleep(RECONNECT_BACKOFF).await;
                    }
                }
            }
        });

        info!(
            broker = %config.broker_host,
            port = config.broker_port,
            "MQTT transport started"
        );

        Ok((Self { client, event_loop }, rx))
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        self.event_loop.abort();
    }
}

impl MessageTransport for MqttTransport {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn publish(&self, topic: &str, payload: &str) -> Result<(), ContractError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .await
            .map_err(|e| ContractError::transport("mqtt", format!("publish failed: {e}")))
    }
}
