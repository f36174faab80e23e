//! Impure I/O for the MQTT transport
//!
//! Owns the rumqttc client and a spawned driver task that polls the event loop,
//! translates what it sees into [`TransportEvent`]s and applies the reconnect
//! backoff. rumqttc reconnects on the next poll after an error, so the driver's
//! only job between attempts is to wait.

use super::connection::{configure_mqtt_options, MqttError, ReconnectConfig, REQUEST_QUEUE_CAPACITY};
use super::events::{route_mqtt_event, EventRoute};
use crate::error::BridgeResult;
use crate::transport::{BrokerTransport, TransportConnector, TransportEvent, TransportIdentity};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{AsyncClient, EventLoop};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn, Instrument};

/// How long `close` waits for the driver task to stop
const DRIVER_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(2);

/// Mutual-TLS MQTT transport
pub struct MqttTransport {
    client: AsyncClient,
    shutdown_tx: watch::Sender<bool>,
    driver_handle: Option<JoinHandle<()>>,
    closed: bool,
}

impl MqttTransport {
    /// Create the client and spawn its driver. Must be called inside a tokio runtime.
    pub fn spawn(
        identity: &TransportIdentity,
        reconnect_config: ReconnectConfig,
        events: mpsc::Sender<TransportEvent>,
    ) -> Self {
        let mqtt_options = configure_mqtt_options(identity);
        let (client, event_loop) = AsyncClient::new(mqtt_options, REQUEST_QUEUE_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            endpoint = %identity.endpoint,
            client_id = %identity.client_id,
            "Starting MQTT transport"
        );

        let driver = EventLoopDriver {
            event_loop,
            events,
            shutdown_rx,
            reconnect_config,
            connected: false,
            attempts: 0,
        };
        let span = crate::mqtt_span!(endpoint = %identity.endpoint);
        let handle = tokio::spawn(driver.run().instrument(span));

        Self {
            client,
            shutdown_tx,
            driver_handle: Some(handle),
            closed: false,
        }
    }

    async fn join_driver(&mut self) {
        let Some(mut handle) = self.driver_handle.take() else {
            return;
        };
        match tokio::time::timeout(DRIVER_SHUTDOWN_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => debug!("MQTT driver task shut down gracefully"),
            Ok(Err(e)) if !e.is_cancelled() => warn!("MQTT driver task ended with error: {}", e),
            Err(_) => {
                warn!("MQTT driver task didn't shut down in time, aborting it");
                handle.abort();
            }
            _ => {}
        }
    }
}

#[async_trait]
impl BrokerTransport for MqttTransport {
    type Error = MqttError;

    fn publish(&self, topic: &str, payload: String) -> Result<(), MqttError> {
        if self.closed {
            return Err(MqttError::Closed);
        }
        self.client
            .try_publish(topic, QoS::AtMostOnce, false, payload)
            .map_err(MqttError::PublishFailed)
    }

    async fn close(&mut self, force: bool) -> Result<(), MqttError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let mut result = Ok(());
        if force {
            let _ = self.shutdown_tx.send(true);
        } else {
            // the driver exits once the DISCONNECT packet has been written
            if let Err(e) = self.client.try_disconnect() {
                let _ = self.shutdown_tx.send(true);
                result = Err(MqttError::DisconnectFailed(e));
            }
        }

        self.join_driver().await;
        let _ = self.shutdown_tx.send(true);
        info!(force, "MQTT transport closed");
        result
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// State owned by the spawned event-loop task
struct EventLoopDriver {
    event_loop: EventLoop,
    events: mpsc::Sender<TransportEvent>,
    shutdown_rx: watch::Receiver<bool>,
    reconnect_config: ReconnectConfig,
    connected: bool,
    attempts: u32,
}

impl EventLoopDriver {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        debug!("Shutdown signal received, stopping MQTT driver");
                        break;
                    }
                }

                polled = self.event_loop.poll() => match polled {
                    Ok(event) => {
                        if !self.on_route(route_mqtt_event(&event)).await {
                            break;
                        }
                    }
                    Err(e) => {
                        if !self.on_connection_error(e.to_string()).await {
                            break;
                        }
                    }
                }
            }
        }

        self.emit(TransportEvent::Closed).await;
        info!("MQTT driver stopped");
    }

    async fn emit(&mut self, event: TransportEvent) {
        // receiver gone means the bridge stopped listening
        let _ = self.events.send(event).await;
    }

    /// Returns false when the driver should stop
    async fn on_route(&mut self, route: EventRoute) -> bool {
        match route {
            EventRoute::ConnectionAcknowledged => {
                info!(after_attempts = self.attempts, "MQTT connection established");
                self.connected = true;
                self.attempts = 0;
                self.emit(TransportEvent::Connected).await;
                true
            }
            EventRoute::DisconnectedByBroker => {
                warn!("MQTT broker closed the connection");
                self.go_offline().await;
                true
            }
            EventRoute::DisconnectSent => {
                debug!("DISCONNECT sent, stopping MQTT driver");
                false
            }
            EventRoute::Infrastructure(event) => {
                trace!(target: "mqtt_transport", "MQTT event: {}", event);
                true
            }
        }
    }

    async fn go_offline(&mut self) {
        if self.connected {
            self.connected = false;
            self.emit(TransportEvent::Offline).await;
        }
    }

    /// Report the error, wait out the backoff, announce the retry.
    /// Returns false if shutdown was requested while waiting.
    async fn on_connection_error(&mut self, message: String) -> bool {
        error!("MQTT connection error: {}", message);
        self.emit(TransportEvent::Error(message)).await;
        self.go_offline().await;

        self.attempts = self.attempts.saturating_add(1);
        let delay_ms = self.reconnect_config.calculate_backoff_delay(self.attempts);
        info!(
            attempt = self.attempts,
            delay_ms, "Reconnecting to MQTT broker after backoff"
        );

        tokio::select! {
            changed = self.shutdown_rx.changed() => {
                if changed.is_err() || *self.shutdown_rx.borrow() {
                    return false;
                }
            }
            _ = tokio::time::sleep(Duration::from_millis(delay_ms)) => {}
        }

        self.emit(TransportEvent::Reconnecting {
            attempt: self.attempts,
        })
        .await;
        true
    }
}

/// Connector producing [`MqttTransport`]s
#[derive(Debug, Clone, Default)]
pub struct MqttConnector {
    reconnect_config: ReconnectConfig,
}

impl MqttConnector {
    pub fn new(reconnect_config: ReconnectConfig) -> Self {
        Self { reconnect_config }
    }
}

impl TransportConnector for MqttConnector {
    type Transport = MqttTransport;

    fn connect(
        &self,
        identity: TransportIdentity,
        events: mpsc::Sender<TransportEvent>,
    ) -> BridgeResult<MqttTransport> {
        Ok(MqttTransport::spawn(
            &identity,
            self.reconnect_config.clone(),
            events,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerEndpoint;

    fn unreachable_identity() -> TransportIdentity {
        TransportIdentity {
            endpoint: BrokerEndpoint {
                host: "127.0.0.1".to_string(),
                port: 1,
            },
            client_id: "test-boat".to_string(),
            private_key: Vec::new(),
            certificate: Vec::new(),
            certificate_authority: Vec::new(),
            keep_alive: Duration::from_secs(30),
            clean_session: true,
        }
    }

    fn fast_reconnect() -> ReconnectConfig {
        ReconnectConfig {
            backoff_pattern: vec![10],
            sustained_delay: 10,
        }
    }

    #[tokio::test]
    async fn test_unreachable_broker_reports_error_then_reconnects() {
        let (tx, mut rx) = mpsc::channel(16);
        let mut transport = MqttTransport::spawn(&unreachable_identity(), fast_reconnect(), tx);

        let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("driver should report within timeout")
            .expect("channel open");
        assert!(matches!(first, TransportEvent::Error(_)), "got {first:?}");

        let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, TransportEvent::Reconnecting { attempt: 1 });

        transport.close(true).await.unwrap();
        assert!(transport.is_closed());
    }

    fn assert_send<T: Send>(_: &T) {}

    #[tokio::test]
    async fn test_driver_future_can_be_spawned() {
        let options = configure_mqtt_options(&unreachable_identity());
        let (_client, event_loop) = AsyncClient::new(options, REQUEST_QUEUE_CAPACITY);
        let (events, _rx) = mpsc::channel(1);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let driver = EventLoopDriver {
            event_loop,
            events,
            shutdown_rx,
            reconnect_config: fast_reconnect(),
            connected: false,
            attempts: 0,
        };

        let run = driver.run();
        assert_send(&run);
    }

    #[tokio::test]
    async fn test_connector_uses_its_reconnect_config() {
        let connector = MqttConnector::new(fast_reconnect());
        let (tx, mut rx) = mpsc::channel(16);
        let mut transport = connector.connect(unreachable_identity(), tx).unwrap();

        // with a 10ms backoff the first retry is announced well inside the default 1s delay
        let mut saw_retry = false;
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_millis(500), rx.recv()).await {
            if event == (TransportEvent::Reconnecting { attempt: 1 }) {
                saw_retry = true;
                break;
            }
        }
        assert!(saw_retry);

        transport.close(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_blocks_publish() {
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let mut transport = MqttTransport::spawn(&unreachable_identity(), fast_reconnect(), tx);

        transport.close(true).await.unwrap();
        transport.close(true).await.unwrap();
        assert!(matches!(
            transport.publish("a/b", "1".to_string()),
            Err(MqttError::Closed)
        ));
    }
}
