//! Subscription-to-publish pipeline
//!
//! One update in, at most one transport publish out. Updates on
//! `navigation.state` are control input for the [`StateGate`] and are never
//! forwarded as telemetry.

use super::state_gate::StateGate;
use super::topic::{map_topic, RoutingMode};
use crate::error::{BridgeError, BridgeResult};
use crate::observability::status::StatusReporter;
use crate::source::Update;
use crate::transport::BrokerTransport;
use tracing::trace;

/// Path carrying the vessel's operational state
pub const NAVIGATION_STATE_PATH: &str = "navigation.state";

/// What happened to one update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Handed to the transport
    Published { topic: String },
    /// Dropped by the gate
    Suppressed,
    /// Consumed as an operational state report
    StateObserved { announcement: Option<String> },
}

/// Per-update publish decision and hand-off
#[derive(Debug, Clone)]
pub struct PublishPipeline {
    mode: RoutingMode,
}

impl PublishPipeline {
    pub fn new(mode: RoutingMode) -> Self {
        Self { mode }
    }

    pub fn routing_mode(&self) -> RoutingMode {
        self.mode
    }

    /// Decide on and, if permitted, publish a single update.
    ///
    /// Errors concern this update only; the caller carries on with the batch.
    pub fn handle<T>(
        &self,
        update: Update,
        gate: &mut StateGate,
        transport: &T,
        reporter: &dyn StatusReporter,
    ) -> BridgeResult<PublishOutcome>
    where
        T: BrokerTransport + ?Sized,
    {
        if update.path.is_empty() {
            return Err(BridgeError::invalid_update("update has an empty path"));
        }

        if update.path == NAVIGATION_STATE_PATH {
            let state = update.value.as_str().ok_or_else(|| {
                BridgeError::invalid_update(format!(
                    "{NAVIGATION_STATE_PATH} must be a string, got {}",
                    update.value
                ))
            })?;
            let announcement = gate.observe_state_update(state);
            if let Some(text) = &announcement {
                reporter.set_provider_status(text);
            }
            return Ok(PublishOutcome::StateObserved { announcement });
        }

        if !gate.should_publish() {
            trace!(
                path = %update.path,
                state = %gate.current_state(),
                connected = gate.is_connected(),
                "Update suppressed"
            );
            return Ok(PublishOutcome::Suppressed);
        }

        let topic = map_topic(&update.path, self.mode);
        let payload =
            serde_json::to_string(&update.value).map_err(|source| BridgeError::SerializationError {
                path: update.path.clone(),
                source,
            })?;

        reporter.debug(&format!("PUB {topic} {payload}"));
        transport
            .publish(&topic, payload)
            .map_err(|e| BridgeError::transport(format!("publish to {topic} failed: {e}")))?;

        Ok(PublishOutcome::Published { topic })
    }
}
