//! Operational-state publish gate
//!
//! The gate owns the two facts that decide whether telemetry leaves the vessel:
//! the latest operational state reported on `navigation.state` and whether the
//! broker link is up. It is owned by the bridge event loop and never shared.

use std::collections::BTreeSet;

/// Operational state before any `navigation.state` update has been seen
pub const INITIAL_STATE: &str = "default";

/// Publish gate keyed on vessel operational state and broker connectivity
#[derive(Debug, Clone)]
pub struct StateGate {
    broker: String,
    allow_list: BTreeSet<String>,
    current_state: String,
    connected: bool,
}

impl StateGate {
    /// Create a disconnected gate in the initial state.
    ///
    /// `broker` is only used to build status text.
    pub fn new(broker: impl Into<String>, allow_list: BTreeSet<String>) -> Self {
        Self {
            broker: broker.into(),
            allow_list,
            current_state: INITIAL_STATE.to_string(),
            connected: false,
        }
    }

    pub fn current_state(&self) -> &str {
        &self.current_state
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn allow_list(&self) -> &BTreeSet<String> {
        &self.allow_list
    }

    /// Record a new operational state.
    ///
    /// Returns the status text to announce, if any. Nothing is announced when the
    /// state is unchanged or the link is down; the next connect reports the state.
    pub fn observe_state_update(&mut self, new_state: &str) -> Option<String> {
        if new_state == self.current_state {
            return None;
        }

        tracing::debug!(
            from = %self.current_state,
            to = %new_state,
            connected = self.connected,
            "Operational state changed"
        );
        self.current_state = new_state.to_string();

        if self.connected {
            Some(self.status_text())
        } else {
            None
        }
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// True iff connected and the current state is allow-listed
    pub fn should_publish(&self) -> bool {
        self.connected && self.allow_list.contains(&self.current_state)
    }

    /// Status text describing the connected link and whether data is flowing
    pub fn status_text(&self) -> String {
        if self.should_publish() {
            format!("Connected to {}. Sending data", self.broker)
        } else {
            format!(
                "Connected to {}. Not sending data while {}",
                self.broker, self.current_state
            )
        }
    }
}
