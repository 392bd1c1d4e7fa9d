//! Request/response correlation over the shared TDLib event stream.
//!
//! TDLib answers requests through the same unordered stream that carries
//! updates, and replies are matched here by tag (or predicate) only. Two calls
//! expecting the same reply tag must therefore never overlap: every call holds
//! the single-flight guard from `send` until it returns.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::{
    config::PollingConfig,
    event::{Event, MatchSpec, TYPE_FIELD},
    transport::Transport,
    Result,
};

pub struct Correlator {
    transport: Arc<dyn Transport>,
    polling: PollingConfig,
    in_flight: Mutex<()>,
    cancel: CancellationToken,
}

impl Correlator {
    pub fn new(transport: Arc<dyn Transport>, polling: PollingConfig) -> Self {
        Self {
            transport,
            polling,
            in_flight: Mutex::new(()),
            cancel: CancellationToken::new(),
        }
    }

    /// Stop waiting once `cancel` fires. Checked between polls only.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn polling(&self) -> PollingConfig {
        self.polling
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Take exclusive use of the event stream.
    pub async fn exclusive(&self) -> Exclusive<'_> {
        Exclusive {
            correlator: self,
            _guard: self.in_flight.lock().await,
        }
    }

    /// Send `request` once and wait for the first event satisfying `spec`.
    ///
    /// Returns `None` when TDLib answers with an `error` event, when the
    /// transport fails, or when the call deadline or cancellation is reached.
    /// Events that match neither are discarded.
    pub async fn call(&self, request: Value, spec: &MatchSpec) -> Option<Event> {
        let method = request_type(&request).to_string();
        let stream = self.exclusive().await;

        if stream.is_cancelled() {
            warn!(method = %method, "cancelled before send");
            return None;
        }
        if let Err(e) = stream.send(request).await {
            error!(method = %method, "send failed: {e}");
            return None;
        }

        let deadline = self.polling.call_timeout.map(|t| Instant::now() + t);
        loop {
            if stream.is_cancelled() {
                warn!(method = %method, "cancelled while waiting for reply");
                return None;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(method = %method, "timed out waiting for reply");
                return None;
            }

            let event = match stream.poll().await {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    error!(method = %method, "receive failed: {e}");
                    return None;
                }
            };

            if let Some((code, message)) = event.error_details() {
                error!(method = %method, code, "request failed: {message}");
                return None;
            }
            if spec.matches(&event) {
                debug!(method = %method, reply = event.tag(), "reply received");
                return Some(event);
            }
            trace!(method = %method, tag = event.tag(), "discarding unrelated event");
        }
    }
}

/// Exclusive handle on the event stream, held for the length of one
/// correlated exchange (a call, or the whole authorization loop).
pub struct Exclusive<'a> {
    correlator: &'a Correlator,
    _guard: MutexGuard<'a, ()>,
}

impl Exclusive<'_> {
    pub async fn send(&self, request: Value) -> Result<()> {
        trace!(method = request_type(&request), "send");
        self.correlator.transport.send(request).await
    }

    /// One polling iteration. After an empty poll this sleeps for the idle
    /// interval (cut short by cancellation) before returning `None`.
    pub async fn poll(&self) -> Result<Option<Event>> {
        let polling = self.correlator.polling;
        let event = self.correlator.transport.receive(polling.poll_timeout).await?;
        if event.is_none() {
            tokio::select! {
                _ = self.correlator.cancel.cancelled() => {}
                _ = sleep(polling.idle_sleep) => {}
            }
        }
        Ok(event)
    }

    pub fn is_cancelled(&self) -> bool {
        self.correlator.cancel.is_cancelled()
    }
}

pub(crate) fn request_type(request: &Value) -> &str {
    request
        .get(TYPE_FIELD)
        .and_then(Value::as_str)
        .unwrap_or("<untyped>")
}
