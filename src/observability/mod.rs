//! Observability: structured logging, provider status sinks and the health endpoint

pub mod health;
pub mod logging;
pub mod status;

pub use health::HealthServer;
pub use logging::{init_default_logging, init_logging, LogFormat};
pub use status::{ProviderStatus, StatusBoard, StatusReporter};

pub use logging::{bridge_span, mqtt_span, subscription_span};
