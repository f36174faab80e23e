//! Testing utilities and mock implementations
//!
//! Mocks for driving the bridge without an MQTT broker or a Signal K server.

pub mod mocks;

pub use mocks::*;
