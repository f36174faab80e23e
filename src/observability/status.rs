//! Provider status and error sinks
//!
//! The host process sees the bridge only through these sinks: a free-text
//! status, a separate error text, and debug output. Both texts are last write
//! wins; no history is kept.

use crate::bridge::supervisor::LinkState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info};

/// Host-facing status sinks
pub trait StatusReporter: Send + Sync {
    fn set_provider_status(&self, text: &str);

    fn set_provider_error(&self, text: &str);

    fn debug(&self, text: &str);

    /// Structured link state, for reporters that expose health
    fn set_link_state(&self, _state: &LinkState) {}
}

/// Snapshot of what the bridge last reported
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatus {
    pub status: String,
    pub error: Option<String>,
    pub link: LinkState,
    pub updated_at: DateTime<Utc>,
}

impl Default for ProviderStatus {
    fn default() -> Self {
        Self {
            status: String::new(),
            error: None,
            link: LinkState::Idle,
            updated_at: Utc::now(),
        }
    }
}

/// Reporter that logs through `tracing` and keeps the latest snapshot in a
/// watch channel for the health server
#[derive(Debug)]
pub struct StatusBoard {
    tx: watch::Sender<ProviderStatus>,
}

impl StatusBoard {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProviderStatus::default());
        Self { tx }
    }

    pub fn subscribe(&self) -> watch::Receiver<ProviderStatus> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> ProviderStatus {
        self.tx.borrow().clone()
    }

    fn update(&self, apply: impl FnOnce(&mut ProviderStatus)) {
        self.tx.send_modify(|status| {
            apply(status);
            status.updated_at = Utc::now();
        });
    }
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusReporter for StatusBoard {
    fn set_provider_status(&self, text: &str) {
        info!(target: "provider_status", "{}", text);
        self.update(|status| status.status = text.to_string());
    }

    fn set_provider_error(&self, text: &str) {
        error!(target: "provider_status", "{}", text);
        self.update(|status| status.error = Some(text.to_string()));
    }

    fn debug(&self, text: &str) {
        debug!(target: "provider_debug", "{}", text);
    }

    fn set_link_state(&self, state: &LinkState) {
        self.update(|status| status.link = state.clone());
    }
}
