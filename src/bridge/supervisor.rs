//! Connection supervisor
//!
//! Maps transport events onto provider status text and the gate's connectivity
//! flag. The supervisor never initiates a reconnect; retrying is the transport's
//! business.

use super::state_gate::StateGate;
use crate::error::sanitize_error_message;
use crate::observability::status::StatusReporter;
use crate::transport::TransportEvent;
use serde::Serialize;
use tracing::{info, warn};

/// Broker link as last reported by the transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LinkState {
    /// Bridge not started
    Idle,
    /// Transport created, no handshake yet
    Initializing,
    Connected,
    Reconnecting { attempt: u32 },
    Offline,
    Closed,
}

impl LinkState {
    pub fn is_connected(&self) -> bool {
        matches!(self, LinkState::Connected)
    }
}

/// Connection-lifecycle bookkeeping for one bridge run
#[derive(Debug)]
pub struct ConnectionSupervisor {
    broker: String,
    link: LinkState,
    reconnect_count: u32,
}

impl ConnectionSupervisor {
    pub fn new(broker: impl Into<String>) -> Self {
        Self {
            broker: broker.into(),
            link: LinkState::Idle,
            reconnect_count: 0,
        }
    }

    pub fn link_state(&self) -> &LinkState {
        &self.link
    }

    /// Reconnect attempts announced by the transport during this run
    pub fn reconnect_count(&self) -> u32 {
        self.reconnect_count
    }

    /// Announce that the bridge is starting up
    pub fn initializing(&mut self, reporter: &dyn StatusReporter) {
        self.transition(LinkState::Initializing, reporter);
        reporter.set_provider_status("Initializing");
    }

    /// Apply one transport event
    pub fn handle(
        &mut self,
        event: TransportEvent,
        gate: &mut StateGate,
        reporter: &dyn StatusReporter,
    ) {
        match event {
            TransportEvent::Connected => {
                gate.set_connected(true);
                self.transition(LinkState::Connected, reporter);
                reporter.set_provider_status(&gate.status_text());
            }
            TransportEvent::Reconnecting { attempt } => {
                self.reconnect_count = self.reconnect_count.saturating_add(1);
                self.transition(LinkState::Reconnecting { attempt }, reporter);
                reporter.set_provider_status(&format!("Reconnecting to {}", self.broker));
            }
            TransportEvent::Offline => {
                gate.set_connected(false);
                self.transition(LinkState::Offline, reporter);
                reporter.set_provider_status("Offline");
            }
            TransportEvent::Closed => {
                gate.set_connected(false);
                self.transition(LinkState::Closed, reporter);
                reporter.set_provider_status("Connection closed");
            }
            TransportEvent::Error(message) => {
                warn!(link = ?self.link, "Transport error: {}", message);
                reporter.set_provider_error(&sanitize_error_message(&message));
            }
        }
    }

    fn transition(&mut self, to: LinkState, reporter: &dyn StatusReporter) {
        if self.link != to {
            info!(from = ?self.link, to = ?to, "Broker link state changed");
        }
        self.link = to;
        reporter.set_link_state(&self.link);
    }
}
