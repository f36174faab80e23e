//! Subscription manager over a newline-delimited Signal K delta stream
//!
//! Used when the bridge runs standalone: deltas are read from any async reader
//! (stdin, a file, a socket), filtered to the self vessel and the requested path
//! pattern, and delivered as one batch per sampling period holding the latest
//! value of every path seen during that period. Once the input ends, the last
//! batch is flushed on the next tick and the subscription finishes, closing
//! its sink.

use super::{
    Delta, PathPattern, SourceEvent, SubscriptionHandle, SubscriptionRequest, SubscriptionSource,
    Update, SELF_CONTEXT,
};
use crate::error::{BridgeError, BridgeResult};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn, Instrument};

/// Delta stream backed subscription source
pub struct DeltaStreamSource<R> {
    reader: Option<R>,
    self_context: Option<String>,
}

impl<R> DeltaStreamSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader: Some(reader),
            self_context: None,
        }
    }

    /// Also treat `context` as the self vessel
    pub fn with_self_context(mut self, context: Option<String>) -> Self {
        self.self_context = context;
        self
    }
}

/// Accepts deltas addressed to the self vessel under any of its names
#[derive(Debug, Clone)]
struct ContextFilter {
    requested: String,
    self_alias: Option<String>,
}

impl ContextFilter {
    fn accepts(&self, context: Option<&str>) -> bool {
        match context {
            None => self.requested == SELF_CONTEXT,
            Some(context) if context == self.requested => true,
            Some(context) => {
                self.requested == SELF_CONTEXT && self.self_alias.as_deref() == Some(context)
            }
        }
    }
}

/// Latest value per path, kept in first-seen order
fn merge_latest(pending: &mut Vec<Update>, update: Update) {
    match pending.iter_mut().find(|u| u.path == update.path) {
        Some(existing) => existing.value = update.value,
        None => pending.push(update),
    }
}

fn parse_line(
    line: &str,
    filter: &ContextFilter,
    pattern: &PathPattern,
) -> Result<Vec<Update>, String> {
    let delta: Delta =
        serde_json::from_str(line).map_err(|e| format!("Malformed delta: {e}"))?;

    if !filter.accepts(delta.context.as_deref()) {
        return Ok(Vec::new());
    }

    Ok(delta
        .into_updates()
        .into_iter()
        .filter(|u| pattern.matches(&u.path))
        .collect())
}

async fn run_stream<R>(
    reader: R,
    request: SubscriptionRequest,
    filter: ContextFilter,
    sink: mpsc::Sender<SourceEvent>,
    mut cancel_rx: oneshot::Receiver<()>,
) where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let pattern = PathPattern::new(&request.path);
    let mut lines = reader.lines();
    let mut pending: Vec<Update> = Vec::new();
    let mut exhausted = false;

    let period = request.period.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker.tick().await; // first tick completes immediately

    loop {
        tokio::select! {
            biased;

            _ = &mut cancel_rx => {
                debug!("Delta stream subscription cancelled");
                break;
            }

            _ = ticker.tick() => {
                if !pending.is_empty() {
                    let batch = std::mem::take(&mut pending);
                    if sink.send(SourceEvent::Delta(batch)).await.is_err() {
                        debug!("Delta sink closed, stopping stream");
                        break;
                    }
                }
                if exhausted {
                    debug!("Delta stream drained");
                    break;
                }
            }

            line = lines.next_line(), if !exhausted => match line {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match parse_line(line, &filter, &pattern) {
                        Ok(updates) => {
                            for update in updates {
                                merge_latest(&mut pending, update);
                            }
                        }
                        Err(message) => {
                            warn!("{}", message);
                            if sink.send(SourceEvent::Error(message)).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                Ok(None) => {
                    info!("Delta stream reached end of input");
                    exhausted = true;
                }
                Err(e) => {
                    // the offending line has already been consumed
                    if e.kind() != io::ErrorKind::InvalidData {
                        exhausted = true;
                    }
                    let message = format!("Delta stream read failed: {e}");
                    warn!("{}", message);
                    if sink.send(SourceEvent::Error(message)).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

impl<R> SubscriptionSource for DeltaStreamSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    fn subscribe(
        &mut self,
        request: SubscriptionRequest,
        registry: &mut Vec<SubscriptionHandle>,
        sink: mpsc::Sender<SourceEvent>,
    ) -> BridgeResult<()> {
        let reader = self
            .reader
            .take()
            .ok_or_else(|| BridgeError::subscription("delta stream already subscribed"))?;

        info!(
            context = %request.context,
            path = %request.path,
            period_ms = request.period.as_millis() as u64,
            "Subscribing to delta stream"
        );

        let filter = ContextFilter {
            requested: request.context.clone(),
            self_alias: self.self_context.clone(),
        };
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let span = crate::subscription_span!(path = %request.path);
        let task = tokio::spawn(run_stream(reader, request, filter, sink, cancel_rx).instrument(span));

        registry.push(SubscriptionHandle::with_task(cancel_tx, task));
        Ok(())
    }
}
