//! Mock implementations for testing
//!
//! Provides a mock broker transport and connector, a recording status reporter,
//! and a channel-backed subscription source so the bridge can be driven end to
//! end without a broker or a Signal K server.

use crate::bridge::supervisor::LinkState;
use crate::error::{BridgeError, BridgeResult};
use crate::observability::status::StatusReporter;
use crate::source::{SourceEvent, SubscriptionHandle, SubscriptionRequest, SubscriptionSource, Update};
use crate::transport::{BrokerTransport, TransportConnector, TransportEvent, TransportIdentity};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

pub type PublishedMessage = (String, String);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Error)]
#[error("Mock transport failure: {0}")]
pub struct MockTransportError(pub String);

/// Mock transport recording every publish
#[derive(Debug, Default)]
pub struct MockTransport {
    pub published: Arc<Mutex<Vec<PublishedMessage>>>,
    pub close_calls: Arc<AtomicUsize>,
    pub should_fail: bool,
    closed: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure() -> Self {
        Self {
            should_fail: true,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.published).clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrokerTransport for MockTransport {
    type Error = MockTransportError;

    fn publish(&self, topic: &str, payload: String) -> Result<(), Self::Error> {
        if self.should_fail {
            return Err(MockTransportError("publish refused".to_string()));
        }
        if self.closed {
            return Err(MockTransportError("transport closed".to_string()));
        }
        lock(&self.published).push((topic.to_string(), payload));
        Ok(())
    }

    async fn close(&mut self, _force: bool) -> Result<(), Self::Error> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Connector handing out [`MockTransport`]s that share one publish log.
///
/// Clones share state, so a test can keep one clone to inject transport events
/// after giving the other to a controller.
#[derive(Debug, Clone, Default)]
pub struct MockConnector {
    published: Arc<Mutex<Vec<PublishedMessage>>>,
    close_calls: Arc<AtomicUsize>,
    connect_calls: Arc<AtomicUsize>,
    events: Arc<Mutex<Option<mpsc::Sender<TransportEvent>>>>,
    identity: Arc<Mutex<Option<TransportIdentity>>>,
    pub fail_publish: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_publish_failure() -> Self {
        Self {
            fail_publish: true,
            ..Default::default()
        }
    }

    /// Inject a transport event as if the broker client emitted it
    pub async fn emit(&self, event: TransportEvent) {
        let sender = lock(&self.events).clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.published).clone()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Identity passed to the most recent `connect`
    pub fn last_identity(&self) -> Option<TransportIdentity> {
        lock(&self.identity).clone()
    }
}

impl TransportConnector for MockConnector {
    type Transport = MockTransport;

    fn connect(
        &self,
        identity: TransportIdentity,
        events: mpsc::Sender<TransportEvent>,
    ) -> BridgeResult<MockTransport> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.events) = Some(events);
        *lock(&self.identity) = Some(identity);
        Ok(MockTransport {
            published: Arc::clone(&self.published),
            close_calls: Arc::clone(&self.close_calls),
            should_fail: self.fail_publish,
            closed: false,
        })
    }
}

/// Status reporter that remembers everything it was told
#[derive(Debug, Default)]
pub struct RecordingReporter {
    statuses: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
    debugs: Mutex<Vec<String>>,
    links: Mutex<Vec<LinkState>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statuses(&self) -> Vec<String> {
        lock(&self.statuses).clone()
    }

    pub fn errors(&self) -> Vec<String> {
        lock(&self.errors).clone()
    }

    pub fn debugs(&self) -> Vec<String> {
        lock(&self.debugs).clone()
    }

    pub fn link_states(&self) -> Vec<LinkState> {
        lock(&self.links).clone()
    }

    pub fn last_status(&self) -> Option<String> {
        lock(&self.statuses).last().cloned()
    }

    pub fn last_error(&self) -> Option<String> {
        lock(&self.errors).last().cloned()
    }
}

impl StatusReporter for RecordingReporter {
    fn set_provider_status(&self, text: &str) {
        lock(&self.statuses).push(text.to_string());
    }

    fn set_provider_error(&self, text: &str) {
        lock(&self.errors).push(text.to_string());
    }

    fn debug(&self, text: &str) {
        lock(&self.debugs).push(text.to_string());
    }

    fn set_link_state(&self, state: &LinkState) {
        lock(&self.links).push(state.clone());
    }
}

/// Subscription source fed by the test through [`ChannelSource::deliver`]
#[derive(Debug, Clone, Default)]
pub struct ChannelSource {
    sink: Arc<Mutex<Option<mpsc::Sender<SourceEvent>>>>,
    requests: Arc<Mutex<Vec<SubscriptionRequest>>>,
    unsubscribed: Arc<AtomicUsize>,
    fail_with: Option<String>,
}

impl ChannelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source whose registrations always fail
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Default::default()
        }
    }

    /// Deliver one batch. A no-op once unsubscribed.
    pub async fn deliver(&self, updates: Vec<Update>) {
        self.send(SourceEvent::Delta(updates)).await;
    }

    pub async fn deliver_error(&self, message: &str) {
        self.send(SourceEvent::Error(message.to_string())).await;
    }

    async fn send(&self, event: SourceEvent) {
        let sink = lock(&self.sink).clone();
        if let Some(sink) = sink {
            let _ = sink.send(event).await;
        }
    }

    pub fn last_request(&self) -> Option<SubscriptionRequest> {
        lock(&self.requests).last().cloned()
    }

    pub fn unsubscribe_count(&self) -> usize {
        self.unsubscribed.load(Ordering::SeqCst)
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.sink).is_some()
    }
}

impl SubscriptionSource for ChannelSource {
    fn subscribe(
        &mut self,
        request: SubscriptionRequest,
        registry: &mut Vec<SubscriptionHandle>,
        sink: mpsc::Sender<SourceEvent>,
    ) -> BridgeResult<()> {
        lock(&self.requests).push(request);
        if let Some(message) = &self.fail_with {
            return Err(BridgeError::subscription(message.clone()));
        }

        *lock(&self.sink) = Some(sink);

        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        let shared_sink = Arc::clone(&self.sink);
        let unsubscribed = Arc::clone(&self.unsubscribed);
        let task = tokio::spawn(async move {
            let _ = cancel_rx.await;
            lock(&shared_sink).take();
            unsubscribed.fetch_add(1, Ordering::SeqCst);
        });
        registry.push(SubscriptionHandle::with_task(cancel_tx, task));
        Ok(())
    }
}
