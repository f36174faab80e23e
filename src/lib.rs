//! Signal K to MQTT bridge
//!
//! Republishes vessel telemetry from a Signal K data bus to an MQTT broker over
//! mutual TLS (AWS IoT Core and compatible brokers).
//!
//! # Overview
//!
//! - [`bridge`] - topic mapping, the operational-state gate, the publish
//!   pipeline, the connection supervisor and the controller that owns them
//! - [`source`] - the subscription interface and a delta-stream implementation
//! - [`transport`] - the broker transport interface and its rumqttc implementation
//! - [`observability`] - logging, provider status sinks, health endpoint
//! - [`config`] - TOML configuration with eager validation
//!
//! # Quick Start
//!
//! ```rust
//! use signalk_iot_bridge::bridge::{map_topic, RoutingMode, StateGate};
//! use std::collections::BTreeSet;
//!
//! assert_eq!(
//!     map_topic("navigation.speedOverGround", RoutingMode::PerPathTopic),
//!     "navigation/speedOverGround"
//! );
//! assert_eq!(map_topic("navigation.position", RoutingMode::SingleTopic), "signalk");
//!
//! let allow: BTreeSet<String> = ["default", "anchored"].iter().map(|s| s.to_string()).collect();
//! let mut gate = StateGate::new("broker.local", allow);
//! assert!(!gate.should_publish());
//! gate.set_connected(true);
//! assert!(gate.should_publish());
//! gate.observe_state_update("sailing");
//! assert!(!gate.should_publish());
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod observability;
pub mod source;
pub mod testing;
pub mod transport;

pub use bridge::BridgeController;
pub use config::{BridgeConfig, ConfigError};
pub use error::{BridgeError, BridgeResult};
