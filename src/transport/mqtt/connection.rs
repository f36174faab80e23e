//! Pure connection configuration for the MQTT transport
//!
//! Everything here is free of I/O: option building, reconnect backoff and the
//! transport error type.

use crate::transport::TransportIdentity;
use rumqttc::v5::MqttOptions;
use rumqttc::Transport as RumqttcTransport;
use thiserror::Error;

/// ALPN protocol AWS IoT Core requires for MQTT over port 443
pub const AWS_IOT_ALPN: &[u8] = b"x-amzn-mqtt-ca";

/// Capacity of the rumqttc request queue
pub const REQUEST_QUEUE_CAPACITY: usize = 64;

/// Reconnection backoff configuration
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delays in milliseconds for the first attempts
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after the pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: vec![1_000, 2_000, 4_000, 8_000, 16_000, 32_000, 64_000],
            sustained_delay: 128_000,
        }
    }
}

impl ReconnectConfig {
    /// Backoff delay before the given attempt (1-based)
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Publishing failed")]
    PublishFailed(#[source] rumqttc::v5::ClientError),
    #[error("Disconnect failed")]
    DisconnectFailed(#[source] rumqttc::v5::ClientError),
    #[error("Transport closed")]
    Closed,
}

/// Build rumqttc options for a mutual-TLS connection
pub fn configure_mqtt_options(identity: &TransportIdentity) -> MqttOptions {
    let mut mqtt_options = MqttOptions::new(
        identity.client_id.clone(),
        identity.endpoint.host.clone(),
        identity.endpoint.port,
    );

    let alpn = (identity.endpoint.port == 443).then(|| vec![AWS_IOT_ALPN.to_vec()]);
    let transport = RumqttcTransport::tls(
        identity.certificate_authority.clone(),
        Some((identity.certificate.clone(), identity.private_key.clone())),
        alpn,
    );
    mqtt_options.set_transport(transport);
    mqtt_options.set_keep_alive(identity.keep_alive);
    mqtt_options.set_clean_start(identity.clean_session);

    mqtt_options
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerEndpoint;
    use std::time::Duration;

    fn identity(port: u16) -> TransportIdentity {
        TransportIdentity {
            endpoint: BrokerEndpoint {
                host: "broker.local".to_string(),
                port,
            },
            client_id: "boat".to_string(),
            private_key: b"key".to_vec(),
            certificate: b"cert".to_vec(),
            certificate_authority: b"ca".to_vec(),
            keep_alive: Duration::from_secs(30),
            clean_session: true,
        }
    }

    #[test]
    fn test_backoff_pattern() {
        let config = ReconnectConfig::default();
        assert_eq!(config.calculate_backoff_delay(1), 1_000);
        assert_eq!(config.calculate_backoff_delay(2), 2_000);
        assert_eq!(config.calculate_backoff_delay(7), 64_000);
        assert_eq!(config.calculate_backoff_delay(8), 128_000);
        assert_eq!(config.calculate_backoff_delay(100), 128_000);
        // attempt 0 is treated as the first attempt
        assert_eq!(config.calculate_backoff_delay(0), 1_000);
    }

    #[test]
    fn test_empty_pattern_uses_sustained_delay() {
        let config = ReconnectConfig {
            backoff_pattern: Vec::new(),
            sustained_delay: 500,
        };
        assert_eq!(config.calculate_backoff_delay(1), 500);
    }

    #[test]
    fn test_configure_mqtt_options() {
        let options = configure_mqtt_options(&identity(8883));
        assert_eq!(options.client_id(), "boat");
        assert_eq!(
            options.broker_address(),
            ("broker.local".to_string(), 8883)
        );
        assert_eq!(options.keep_alive(), Duration::from_secs(30));
        assert!(options.clean_start());
    }
}
