//! Local data-bus subscription interface
//!
//! The bridge consumes Signal K deltas from a host subscription manager. The
//! manager is an external collaborator: it accepts a [`SubscriptionRequest`],
//! pushes [`SourceEvent`]s into the channel it is handed, and registers one
//! [`SubscriptionHandle`] per registration so the bridge can tear it down.

use crate::error::BridgeResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub mod pattern;
pub mod stream;

pub use pattern::PathPattern;
pub use stream::DeltaStreamSource;

/// Context the bridge subscribes to
pub const SELF_CONTEXT: &str = "vessels.self";

/// One path/value item from the data bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub path: String,
    pub value: Value,
}

impl Update {
    pub fn new(path: impl Into<String>, value: Value) -> Self {
        Self {
            path: path.into(),
            value,
        }
    }
}

/// Signal K delta message as delivered by the server
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub context: Option<String>,
    #[serde(default)]
    pub updates: Vec<DeltaUpdate>,
}

/// One source/timestamp group inside a delta
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeltaUpdate {
    #[serde(rename = "$source", skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub values: Vec<Update>,
}

impl Delta {
    /// Flatten into updates, preserving delivery order
    pub fn into_updates(self) -> Vec<Update> {
        self.updates
            .into_iter()
            .flat_map(|update| update.values)
            .collect()
    }
}

/// What the bridge asks the subscription manager for
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRequest {
    pub context: String,
    pub path: String,
    pub period: Duration,
}

impl SubscriptionRequest {
    /// Every path of the self vessel, sampled once per `period`
    pub fn all_self_paths(period: Duration) -> Self {
        Self {
            context: SELF_CONTEXT.to_string(),
            path: "*".to_string(),
            period,
        }
    }
}

/// Messages a subscription pushes into the bridge event loop
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// One delivered batch, in delivery order
    Delta(Vec<Update>),
    /// Subscription-level failure; the registration may stop delivering
    Error(String),
}

/// Unsubscribe handle for one registration.
///
/// Dropping the handle without calling [`SubscriptionHandle::unsubscribe`]
/// also cancels the registration.
#[derive(Debug)]
pub struct SubscriptionHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Handle whose cancellation is observed through `cancel`
    pub fn new(cancel: oneshot::Sender<()>) -> Self {
        Self {
            cancel: Some(cancel),
            task: None,
        }
    }

    /// Handle for a registration driven by a spawned task
    pub fn with_task(cancel: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self {
            cancel: Some(cancel),
            task: Some(task),
        }
    }

    /// Stop delivery and wait for the delivering task, if any, to finish
    pub async fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(task) = self.task.take() {
            match tokio::time::timeout(Duration::from_secs(2), task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if !e.is_cancelled() => {
                    tracing::warn!("Subscription task ended with error: {}", e);
                }
                Err(_) => tracing::warn!("Subscription task did not stop in time"),
                _ => {}
            }
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }
}

/// Host data-bus subscription manager
pub trait SubscriptionSource: Send {
    /// Register a subscription.
    ///
    /// On success at least one handle is pushed to `registry`. Deltas and
    /// subscription errors are delivered through `sink` until unsubscribed.
    fn subscribe(
        &mut self,
        request: SubscriptionRequest,
        registry: &mut Vec<SubscriptionHandle>,
        sink: mpsc::Sender<SourceEvent>,
    ) -> BridgeResult<()>;
}
