//! Transport layer for outbound telemetry
//!
//! The bridge talks to the broker through two traits so the lifecycle and the
//! publish pipeline can be exercised without a network: a [`TransportConnector`]
//! builds a [`BrokerTransport`] from the configured identity and hands it the
//! channel on which connection events are reported.

use crate::config::{BridgeConfig, BrokerEndpoint};
use crate::error::BridgeResult;
use std::time::Duration;
use tokio::sync::mpsc;

pub mod mqtt;

/// Connection-level signals emitted by a transport.
///
/// These are independent notifications, not a strict automaton; any event may
/// follow any other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Handshake completed (first connect or any re-handshake)
    Connected,
    /// Transport is about to retry the connection
    Reconnecting { attempt: u32 },
    /// Link lost, waiting before the next retry
    Offline,
    /// Transport closed, typically on shutdown
    Closed,
    /// Non-fatal transport error
    Error(String),
}

/// Identity and TLS material needed to reach the broker.
///
/// PEM blobs are passed through to the TLS layer unmodified.
#[derive(Clone)]
pub struct TransportIdentity {
    pub endpoint: BrokerEndpoint,
    pub client_id: String,
    pub private_key: Vec<u8>,
    pub certificate: Vec<u8>,
    pub certificate_authority: Vec<u8>,
    pub keep_alive: Duration,
    pub clean_session: bool,
}

impl TransportIdentity {
    /// Build from a configuration. Fails if the endpoint does not parse.
    pub fn from_config(config: &BridgeConfig) -> BridgeResult<Self> {
        Ok(Self {
            endpoint: config.endpoint()?,
            client_id: config.broker.client_id.clone(),
            private_key: config.credentials.private_key.as_bytes().to_vec(),
            certificate: config.credentials.certificate.as_bytes().to_vec(),
            certificate_authority: config.certificate_authority().as_bytes().to_vec(),
            keep_alive: Duration::from_secs(config.broker.keep_alive_secs),
            clean_session: config.broker.clean_session,
        })
    }
}

impl std::fmt::Debug for TransportIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportIdentity")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("keep_alive", &self.keep_alive)
            .field("clean_session", &self.clean_session)
            .finish_non_exhaustive()
    }
}

/// Handle to an open broker transport
#[async_trait::async_trait]
pub trait BrokerTransport: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Hand a message to the transport's send queue without waiting for delivery
    fn publish(&self, topic: &str, payload: String) -> Result<(), Self::Error>;

    /// Close the transport. `force` skips the graceful disconnect.
    /// Closing an already closed transport is a no-op.
    async fn close(&mut self, force: bool) -> Result<(), Self::Error>;

    fn is_closed(&self) -> bool;
}

/// Factory for broker transports
pub trait TransportConnector: Send + Sync {
    type Transport: BrokerTransport + 'static;

    /// Open a transport and start reporting connection events on `events`.
    /// Connection progress is asynchronous; this returns once the transport exists.
    fn connect(
        &self,
        identity: TransportIdentity,
        events: mpsc::Sender<TransportEvent>,
    ) -> BridgeResult<Self::Transport>;
}

/// Type alias for the MQTT transport
pub type MqttTransport = mqtt::MqttTransport;
