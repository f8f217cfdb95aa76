//! MQTT transport session.
//!
//! [`MqttSession`] wraps a single rumqttc connection and drives it through
//! connect, subscribe, and message delivery for one run. The observation
//! window only sees the [`BusSession`] trait, so tests can substitute a
//! scripted in-memory session.
//!
//! There is no reconnect logic here: the first transport error after a
//! successful connect ends the session and is reported to the caller.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS, SubscribeFilter,
    SubscribeReasonCode,
};

use crate::config::MqttSection;

/// Keep-alive interval advertised to the broker.
const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Capacity of the rumqttc request channel.
const REQUEST_CHANNEL_CAPACITY: usize = 10;

/// One message observed on the bus.
#[derive(Debug, Clone)]
pub struct Arrival {
    pub topic: String,
    /// Payload decoded as UTF-8, lossily. Monitoring only needs to display
    /// it, never to interpret it.
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

/// Lifecycle of a single broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribed,
    Closed,
    Failed,
}

/// Errors raised by the transport session. All of them are fatal to the
/// run; none of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The connection could not be established (unreachable host, protocol
    /// failure, TLS, ...).
    #[error("Broker connection failed: {0}")]
    Connect(#[from] rumqttc::ConnectionError),

    /// The broker answered the handshake with a refusal code
    /// (bad credentials, unavailable, ...).
    #[error("Broker rejected the connection: {0:?}")]
    Refused(ConnectReturnCode),

    /// The subscribe request could not be issued.
    #[error("Subscribe request failed: {0}")]
    Subscribe(#[from] rumqttc::ClientError),

    /// The broker acknowledged the subscribe but refused a topic filter.
    #[error("Broker rejected subscription to '{0}'")]
    SubscribeRejected(String),

    /// An established connection dropped mid-session.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),
}

/// The transport surface the observation window drives.
///
/// `connect` and `subscribe` are called once each, in that order;
/// `next_arrival` is then awaited repeatedly until the window closes.
/// `disconnect` must be safe in every state, including before a successful
/// connect.
#[async_trait]
pub trait BusSession: Send {
    async fn connect(&mut self) -> Result<(), SessionError>;
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), SessionError>;
    async fn next_arrival(&mut self) -> Result<Arrival, SessionError>;
    async fn disconnect(&mut self);
}

/// A live MQTT session over rumqttc.
///
/// The event loop is polled exclusively by the caller's task (through the
/// [`BusSession`] methods), so message handling and deadline checks never
/// race over shared state.
pub struct MqttSession {
    client: AsyncClient,
    eventloop: EventLoop,
    state: SessionState,
}

impl MqttSession {
    /// Prepare a session against the configured broker. No network traffic
    /// happens until [`connect`](BusSession::connect) is awaited.
    pub fn new(mqtt: &MqttSection) -> Self {
        let client_id = format!("mqttwatch-{}", std::process::id());
        let mut options = MqttOptions::new(client_id, mqtt.host.clone(), mqtt.port);
        options.set_credentials(mqtt.user.clone(), mqtt.pass.clone());
        options.set_keep_alive(KEEP_ALIVE);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CHANNEL_CAPACITY);

        Self {
            client,
            eventloop,
            state: SessionState::Disconnected,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> SessionState {
        self.state
    }
}

#[async_trait]
impl BusSession for MqttSession {
    /// Drive the event loop until the broker accepts or refuses the
    /// connection.
    async fn connect(&mut self) -> Result<(), SessionError> {
        self.state = SessionState::Connecting;

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    if ack.code == ConnectReturnCode::Success {
                        self.state = SessionState::Connected;
                        tracing::info!("Connected to MQTT broker");
                        return Ok(());
                    }
                    self.state = SessionState::Failed;
                    return Err(SessionError::Refused(ack.code));
                }
                // Outgoing CONNECT and similar bookkeeping events.
                Ok(_) => continue,
                Err(e) => {
                    self.state = SessionState::Failed;
                    return Err(e.into());
                }
            }
        }
    }

    /// Request every topic filter, then wait for the broker's SUBACK before
    /// reporting success.
    async fn subscribe(&mut self, topics: &[String]) -> Result<(), SessionError> {
        let filters: Vec<SubscribeFilter> = topics
            .iter()
            .map(|topic| SubscribeFilter::new(topic.clone(), QoS::AtMostOnce))
            .collect();

        self.client.subscribe_many(filters).await?;

        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::SubAck(ack))) => {
                    // Return codes are positional, matching the requested filters.
                    for (idx, code) in ack.return_codes.iter().enumerate() {
                        if matches!(code, SubscribeReasonCode::Failure) {
                            let topic = topics.get(idx).cloned().unwrap_or_default();
                            self.state = SessionState::Failed;
                            return Err(SessionError::SubscribeRejected(topic));
                        }
                    }
                    self.state = SessionState::Subscribed;
                    tracing::debug!(topics = topics.len(), "Subscriptions acknowledged");
                    return Ok(());
                }
                Ok(_) => continue,
                Err(e) => {
                    self.state = SessionState::Failed;
                    return Err(e.into());
                }
            }
        }
    }

    /// Wait for the next inbound publish, stamping the arrival time on
    /// receipt. Protocol chatter (pings, acks) is absorbed here.
    async fn next_arrival(&mut self) -> Result<Arrival, SessionError> {
        loop {
            match self.eventloop.poll().await {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    return Ok(Arrival {
                        topic: publish.topic.clone(),
                        payload: String::from_utf8_lossy(&publish.payload).into_owned(),
                        received_at: Utc::now(),
                    });
                }
                Ok(_) => continue,
                Err(e) => {
                    self.state = SessionState::Failed;
                    return Err(SessionError::ConnectionLost(e.to_string()));
                }
            }
        }
    }

    /// Release the connection. A no-op when nothing was ever established.
    async fn disconnect(&mut self) {
        if matches!(
            self.state,
            SessionState::Disconnected | SessionState::Connecting
        ) {
            return;
        }

        if let Err(e) = self.client.disconnect().await {
            tracing::debug!(error = %e, "Disconnect request failed; connection already gone");
        }

        if self.state != SessionState::Failed {
            self.state = SessionState::Closed;
        }
    }
}
