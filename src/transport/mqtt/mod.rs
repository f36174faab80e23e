//! MQTT transport built on rumqttc
//!
//! Split the same way as the rest of the transport code: pure functions apart
//! from I/O.
//!
//! - [`connection`] - option building, reconnect backoff, error type
//! - [`events`] - routing of polled rumqttc events
//! - [`client`] - the transport handle and its event-loop driver
//!
//! # Usage
//!
//! ```rust,no_run
//! use signalk_iot_bridge::config::BridgeConfig;
//! use signalk_iot_bridge::transport::mqtt::MqttConnector;
//! use signalk_iot_bridge::transport::{BrokerTransport, TransportConnector, TransportIdentity};
//! use tokio::sync::mpsc;
//!
//! # tokio_test::block_on(async {
//! let config = BridgeConfig::load_from_file("bridge.toml".as_ref())?;
//! let identity = TransportIdentity::from_config(&config)?;
//!
//! let (events_tx, mut events_rx) = mpsc::channel(32);
//! let mut transport = MqttConnector::default().connect(identity, events_tx)?;
//! while let Some(event) = events_rx.recv().await {
//!     println!("{event:?}");
//! }
//! transport.close(true).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod events;

pub use client::{MqttConnector, MqttTransport};
pub use connection::{MqttError, ReconnectConfig};
pub use events::{route_mqtt_event, EventRoute};
