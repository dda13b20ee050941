//! MQTT adapter for the RV-C bridge.
//!
//! Wraps a [`rumqttc`] client. [`MqttPublisher`] implements the
//! [`CommandPublisher`] port, and [`MqttTransport::start`] drives the event
//! loop, (re)subscribing on every `ConnAck` and forwarding each publish to the
//! bridge as a [`RawMessage`].

pub mod config;
pub mod error;

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use rvc_app::codec::{OutboundMessage, RawMessage};
use rvc_app::ports::CommandPublisher;
use rvc_domain::error::RvcError;

pub use config::MqttConfig;
pub use error::MqttError;

/// Build the client options from the configuration.
#[must_use]
pub fn options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
    options.set_keep_alive(config.keep_alive());
    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.as_deref().unwrap_or_default());
    }
    options
}

/// Publishes outbound commands, fire-and-forget.
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
}

impl MqttPublisher {
    /// Ask the broker connection to close.
    ///
    /// # Errors
    ///
    /// Fails when the event loop is already gone.
    pub async fn disconnect(&self) -> Result<(), MqttError> {
        self.client.disconnect().await.map_err(MqttError::Client)
    }
}

impl CommandPublisher for MqttPublisher {
    fn publish(&self, message: OutboundMessage) -> impl Future<Output = Result<(), RvcError>> + Send {
        let client = self.client.clone();
        async move {
            client
                .publish(message.topic, QoS::AtMostOnce, false, message.payload)
                .await
                .map_err(|err| MqttError::Client(err).into_domain())
        }
    }
}

/// A broker connection that has not started polling yet.
pub struct MqttTransport {
    publisher: MqttPublisher,
    eventloop: EventLoop,
    channel_capacity: usize,
    reconnect_delay: Duration,
}

impl MqttTransport {
    /// Create the client. No network traffic happens until [`Self::start`].
    #[must_use]
    pub fn connect(config: &MqttConfig) -> Self {
        let capacity = config.channel_capacity.max(1);
        let (client, eventloop) = AsyncClient::new(options(config), capacity);
        tracing::info!(
            host = %config.broker_host,
            port = config.broker_port,
            client_id = %config.client_id,
            "MQTT client created"
        );
        Self {
            publisher: MqttPublisher { client },
            eventloop,
            channel_capacity: capacity,
            reconnect_delay: config.reconnect_delay(),
        }
    }

    /// Spawn the event loop task.
    ///
    /// Returns the publisher, the stream of inbound status messages, and the
    /// task handle. The task stops when `token` is cancelled, the receiver is
    /// dropped, or a disconnect has been flushed.
    #[must_use]
    pub fn start(
        self,
        topics: Vec<String>,
        token: CancellationToken,
    ) -> (MqttPublisher, mpsc::Receiver<RawMessage>, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        let client = self.publisher.client.clone();
        let task = tokio::spawn(poll(
            self.eventloop,
            client,
            topics,
            tx,
            self.reconnect_delay,
            token,
        ));
        (self.publisher, rx, task)
    }
}

async fn poll(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: Vec<String>,
    inbound: mpsc::Sender<RawMessage>,
    reconnect_delay: Duration,
    token: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = token.cancelled() => break,
            event = eventloop.poll() => event,
        };
        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!(?topics, "connected to broker");
                subscribe(&client, &topics);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = RawMessage::new(publish.topic, publish.payload.to_vec());
                if inbound.send(message).await.is_err() {
                    tracing::debug!("inbound receiver dropped, stopping MQTT loop");
                    break;
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => break,
            Ok(_) => {}
            Err(err) => {
                tracing::warn!(error = ?MqttError::Connection(err), "MQTT connection lost");
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(reconnect_delay) => {}
                }
            }
        }
    }
    tracing::info!("MQTT loop stopped");
}

fn subscribe(client: &AsyncClient, topics: &[String]) {
    for topic in topics {
        if let Err(err) = client.try_subscribe(topic, QoS::AtMostOnce) {
            tracing::warn!(%topic, error = %MqttError::Client(err), "subscription not queued");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_build_options_from_config() {
        let config = MqttConfig {
            broker_host: "192.168.100.234".to_string(),
            client_id: "coach".to_string(),
            keep_alive_secs: 45,
            ..MqttConfig::default()
        };
        let options = options(&config);
        assert_eq!(options.broker_address(), ("192.168.100.234".to_string(), 1883));
        assert_eq!(options.client_id(), "coach");
        assert_eq!(options.keep_alive(), Duration::from_secs(45));
    }

    #[tokio::test]
    async fn should_stop_polling_when_cancelled() {
        let config = MqttConfig {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1,
            reconnect_delay_ms: 10,
            ..MqttConfig::default()
        };
        let token = CancellationToken::new();
        let (_publisher, _rx, task) = MqttTransport::connect(&config).start(vec!["rvc/#".to_string()], token.clone());

        token.cancel();
        task.await.unwrap();
    }
}
