use crate::errors::BridgeError;
use crate::topics::{Inbound, Outbound, Topics};
use common::{Backoff, env_parse, env_string};
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use schema::{EmotionResult, IdentityBatch, IdentityConfig, StreamKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Frames are a few hundred KB at most; results are small JSON documents.
const MAX_PACKET_SIZE: usize = 4 * 1024 * 1024;
const EVENT_BUFFER: usize = 64;
const RECONNECT_BACKOFF: Backoff =
    Backoff::new(u32::MAX, Duration::from_millis(100), Duration::from_secs(30));

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub host: String,
    pub port: u16,
    pub topic_prefix: String,
    pub device_id: String,
    pub keep_alive: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            topic_prefix: "kiosk".to_string(),
            device_id: "terminal-01".to_string(),
            keep_alive: Duration::from_secs(30),
        }
    }
}

impl ChannelConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: env_string("KIOSK_MQTT_HOST", &defaults.host),
            port: env_parse("KIOSK_MQTT_PORT", defaults.port),
            topic_prefix: env_string("KIOSK_TOPIC_PREFIX", &defaults.topic_prefix),
            device_id: env_string("KIOSK_DEVICE_ID", &defaults.device_id),
            keep_alive: defaults.keep_alive,
        }
    }
}

/// Typed inbound events. Everything the backend sends is normalized here;
/// consumers never see raw payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    EmotionBatch(Vec<EmotionResult>),
    IdentityBatch(IdentityBatch),
}

/// Turn a received publish into a typed event. Malformed payloads are dropped.
pub fn demux(topics: &Topics, topic: &str, payload: &[u8]) -> Option<ChannelEvent> {
    let inbound = topics.parse_inbound(topic)?;

    let event = match inbound {
        Inbound::FunResult => schema::decode_emotion_batch(payload).map(ChannelEvent::EmotionBatch),
        Inbound::AttResult => schema::decode_identity_batch(payload).map(ChannelEvent::IdentityBatch),
    };

    match event {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(event = inbound.as_str(), error = %e, "Dropping malformed result");
            None
        }
    }
}

/// Publishing half of the event channel. Cheap to clone.
#[derive(Clone)]
pub struct EventChannel {
    client: AsyncClient,
    topics: Arc<Topics>,
    connected: Arc<AtomicBool>,
}

impl EventChannel {
    /// Create the client and spawn the connection task on the current runtime.
    ///
    /// The connection is established (and re-established) in the background;
    /// lifecycle transitions arrive as [`ChannelEvent::Connected`] and
    /// [`ChannelEvent::Disconnected`].
    pub fn connect(config: &ChannelConfig) -> (Self, mpsc::Receiver<ChannelEvent>) {
        let client_id = format!("kiosk-{}", config.device_id);
        let mut options = MqttOptions::new(client_id, config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(true);
        options.set_max_packet_size(MAX_PACKET_SIZE, MAX_PACKET_SIZE);

        let (client, eventloop) = AsyncClient::new(options, 16);
        let topics = Arc::new(Topics::new(&config.topic_prefix, &config.device_id));
        let connected = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        tokio::spawn(run_connection(
            eventloop,
            client.clone(),
            topics.clone(),
            connected.clone(),
            tx,
        ));

        tracing::info!(
            broker = %format!("{}:{}", config.host, config.port),
            device_id = %config.device_id,
            "Event channel initialized"
        );

        (
            Self {
                client,
                topics,
                connected,
            },
            rx,
        )
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Publish a compressed frame for `stream`. Frames are fire-and-forget.
    pub async fn send_frame(&self, stream: StreamKind, bytes: Vec<u8>) -> Result<(), BridgeError> {
        if !self.is_connected() {
            return Err(BridgeError::Disconnected);
        }
        let topic = self.topics.outbound(Outbound::frame_for(stream));
        self.client
            .publish(topic, QoS::AtMostOnce, false, bytes)
            .await?;
        Ok(())
    }

    pub async fn send_identity_config(&self, config: &IdentityConfig) -> Result<(), BridgeError> {
        let payload = serde_json::to_vec(config)?;
        let topic = self.topics.outbound(Outbound::AttCfg);
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        tracing::debug!(th = config.th, mark = config.mark, "Identity config sent");
        Ok(())
    }

    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(error = %e, "Event channel disconnect failed");
        }
    }
}

fn reconnect_delay(attempt: u32) -> Duration {
    let capped = RECONNECT_BACKOFF.delay_for_attempt(attempt);
    let jitter_ms = (capped.as_millis() as u64 / 10).max(1);
    capped + Duration::from_millis(fastrand::u64(0..jitter_ms))
}

async fn run_connection(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topics: Arc<Topics>,
    connected: Arc<AtomicBool>,
    tx: mpsc::Sender<ChannelEvent>,
) {
    let mut reconnect_attempts = 0u32;

    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                reconnect_attempts = 0;
                for inbound in Inbound::ALL {
                    if let Err(e) = client.subscribe(topics.inbound(inbound), QoS::AtMostOnce).await {
                        tracing::warn!(error = %e, topic = inbound.as_str(), "Subscribe failed");
                    }
                }
                connected.store(true, Ordering::Release);
                tracing::info!("Event channel connected");
                Some(ChannelEvent::Connected)
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                demux(&topics, &publish.topic, &publish.payload)
            }
            Ok(Event::Incoming(Packet::PingResp)) => {
                tracing::trace!("MQTT ping response received");
                None
            }
            Ok(_) => None,
            Err(e) => {
                let was_connected = connected.swap(false, Ordering::AcqRel);
                if matches!(e, ConnectionError::RequestsDone) {
                    tracing::info!("Event channel closed");
                    if was_connected {
                        let _ = tx.send(ChannelEvent::Disconnected).await;
                    }
                    return;
                }

                let delay = reconnect_delay(reconnect_attempts);
                reconnect_attempts = reconnect_attempts.saturating_add(1);
                tracing::warn!(
                    error = %e,
                    attempt = reconnect_attempts,
                    backoff_ms = delay.as_millis() as u64,
                    "Event channel lost, reconnecting"
                );

                if was_connected && tx.send(ChannelEvent::Disconnected).await.is_err() {
                    return;
                }
                tokio::time::sleep(delay).await;
                None
            }
        };

        if let Some(event) = event
            && tx.send(event).await.is_err()
        {
            tracing::debug!("Event receiver dropped, stopping channel task");
            return;
        }
    }
}
