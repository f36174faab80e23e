//! Bridge controller and the decision logic it owns
//!
//! All mutable bridge state (the [`StateGate`], the [`ConnectionSupervisor`]
//! and the transport handle) lives in a single event-loop task. Subscription
//! deltas and transport events reach it over channels, so state mutations are
//! serialized without locks.
//!
//! Shutdown unsubscribes first, then stops the loop, then force-closes the
//! transport. Nothing can publish through a closing connection.

pub mod pipeline;
pub mod state_gate;
pub mod supervisor;
pub mod topic;

pub use pipeline::{PublishOutcome, PublishPipeline, NAVIGATION_STATE_PATH};
pub use state_gate::{StateGate, INITIAL_STATE};
pub use supervisor::{ConnectionSupervisor, LinkState};
pub use topic::{map_topic, RoutingMode, SINGLE_TOPIC};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::observability::status::StatusReporter;
use crate::source::{SourceEvent, SubscriptionHandle, SubscriptionRequest, SubscriptionSource, Update};
use crate::transport::{BrokerTransport, TransportConnector, TransportEvent, TransportIdentity};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

/// Buffer for transport events and subscription batches
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// State owned by the event-loop task
struct BridgeCore<T> {
    gate: StateGate,
    supervisor: ConnectionSupervisor,
    pipeline: PublishPipeline,
    transport: T,
}

impl<T: BrokerTransport> BridgeCore<T> {
    fn on_transport_event(&mut self, event: TransportEvent, reporter: &dyn StatusReporter) {
        debug!(?event, "Transport event");
        self.supervisor.handle(event, &mut self.gate, reporter);
    }

    fn on_source_event(&mut self, event: SourceEvent, reporter: &dyn StatusReporter) {
        match event {
            SourceEvent::Delta(updates) => self.publish_batch(updates, reporter),
            SourceEvent::Error(message) => {
                let err = BridgeError::subscription(message);
                warn!(error = %err, "Subscription reported an error");
                reporter.set_provider_error(&err.provider_message());
            }
        }
    }

    fn publish_batch(&mut self, updates: Vec<Update>, reporter: &dyn StatusReporter) {
        for update in updates {
            match self
                .pipeline
                .handle(update, &mut self.gate, &self.transport, reporter)
            {
                Ok(_) => {}
                Err(err @ BridgeError::TransportError { .. }) => {
                    warn!(error = %err, "Publish failed");
                    reporter.set_provider_error(&err.provider_message());
                }
                Err(err) => warn!(error = %err, "Dropping update"),
            }
        }
    }
}

/// Handles kept while the bridge runs
struct Running<T> {
    handles: Vec<SubscriptionHandle>,
    shutdown_tx: watch::Sender<bool>,
    source_done: watch::Receiver<bool>,
    event_loop: JoinHandle<BridgeCore<T>>,
}

/// Owns the bridge for the lifetime of the process
pub struct BridgeController<C: TransportConnector> {
    connector: C,
    reporter: Arc<dyn StatusReporter>,
    running: Option<Running<C::Transport>>,
}

impl<C: TransportConnector> BridgeController<C> {
    pub fn new(connector: C, reporter: Arc<dyn StatusReporter>) -> Self {
        Self {
            connector,
            reporter,
            running: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Subscription handles currently registered
    pub fn subscription_count(&self) -> usize {
        self.running.as_ref().map_or(0, |r| r.handles.len())
    }

    /// Resolves once every subscription has finished and the event loop has
    /// handled its last batch. Never resolves while the bridge is stopped.
    pub async fn subscriptions_finished(&self) {
        let Some(running) = &self.running else {
            return std::future::pending().await;
        };
        let mut done = running.source_done.clone();
        while !*done.borrow_and_update() {
            if done.changed().await.is_err() {
                return;
            }
        }
    }

    /// Validate the configuration, open the transport, register the
    /// subscription and start the event loop.
    ///
    /// A failing subscription is reported through the error sink and does not
    /// fail the start; the bridge then simply never sees updates.
    pub async fn start(
        &mut self,
        config: &BridgeConfig,
        source: &mut dyn SubscriptionSource,
    ) -> BridgeResult<()> {
        if self.running.is_some() {
            return Err(BridgeError::AlreadyStarted);
        }

        config.validate()?;
        let identity = TransportIdentity::from_config(config)?;
        let broker = identity.endpoint.host.clone();
        let reporter = Arc::clone(&self.reporter);

        info!(
            endpoint = %identity.endpoint,
            client_id = %identity.client_id,
            routing_mode = ?config.routing_mode(),
            "Starting bridge"
        );

        let mut supervisor = ConnectionSupervisor::new(broker.clone());
        supervisor.initializing(&*reporter);

        let (transport_tx, transport_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let transport = self
            .connector
            .connect(identity, transport_tx)
            .map_err(|e| {
                reporter.set_provider_error(&e.provider_message());
                e
            })?;

        let core = BridgeCore {
            gate: StateGate::new(broker.clone(), config.bridge.allow_list.clone()),
            supervisor,
            pipeline: PublishPipeline::new(config.routing_mode()),
            transport,
        };

        let (source_tx, source_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut handles = Vec::new();
        let request = SubscriptionRequest::all_self_paths(config.send_interval());
        if let Err(e) = source.subscribe(request, &mut handles, source_tx) {
            let err = match e {
                BridgeError::SubscriptionError { .. } => e,
                other => BridgeError::subscription(other.to_string()),
            };
            error!(error = %err, "Subscription failed");
            reporter.set_provider_error(&err.provider_message());
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (source_done_tx, source_done) = watch::channel(false);
        let event_loop = tokio::spawn(
            run_event_loop(core, transport_rx, source_rx, shutdown_rx, source_done_tx, reporter)
                .instrument(crate::bridge_span!(broker = %broker)),
        );

        info!(subscriptions = handles.len(), "Bridge started");
        self.running = Some(Running {
            handles,
            shutdown_tx,
            source_done,
            event_loop,
        });
        Ok(())
    }

    /// Unsubscribe everything, then force-close the transport.
    ///
    /// Safe to call before `start` and any number of times.
    pub async fn stop(&mut self) {
        let Some(Running {
            handles,
            shutdown_tx,
            event_loop,
            ..
        }) = self.running.take()
        else {
            debug!("Bridge not running, nothing to stop");
            return;
        };

        info!(subscriptions = handles.len(), "Stopping bridge");
        for handle in handles {
            handle.unsubscribe().await;
        }

        let _ = shutdown_tx.send(true);
        match event_loop.await {
            Ok(mut core) => {
                if let Err(e) = core.transport.close(true).await {
                    let err = BridgeError::transport(e.to_string());
                    warn!(error = %err, "Transport close failed");
                    self.reporter.set_provider_error(&err.provider_message());
                }
                core.supervisor
                    .handle(TransportEvent::Closed, &mut core.gate, &*self.reporter);
            }
            Err(e) => error!("Bridge event loop ended abnormally: {}", e),
        }

        info!("Bridge stopped");
    }
}

async fn run_event_loop<T: BrokerTransport>(
    mut core: BridgeCore<T>,
    mut transport_rx: mpsc::Receiver<TransportEvent>,
    mut source_rx: mpsc::Receiver<SourceEvent>,
    mut shutdown_rx: watch::Receiver<bool>,
    source_done: watch::Sender<bool>,
    reporter: Arc<dyn StatusReporter>,
) -> BridgeCore<T> {
    let mut transport_open = true;
    let mut source_open = true;

    loop {
        tokio::select! {
            biased;

            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("Event loop shutting down");
                    break;
                }
            }

            event = transport_rx.recv(), if transport_open => match event {
                Some(event) => core.on_transport_event(event, &*reporter),
                None => {
                    debug!("Transport event channel closed");
                    transport_open = false;
                }
            },

            event = source_rx.recv(), if source_open => match event {
                Some(event) => core.on_source_event(event, &*reporter),
                None => {
                    debug!("Subscription channel closed");
                    source_open = false;
                    let _ = source_done.send(true);
                }
            },
        }
    }

    core
}
