use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::{event::Event, Result};

/// Hexagonal port for the TDLib JSON client.
///
/// `receive` pulls from a single shared, unordered stream: replies are not
/// tied to the request that caused them. See [`crate::correlator`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Enqueue a request for asynchronous delivery.
    async fn send(&self, request: Value) -> Result<()>;

    /// Next event from the stream, or `None` once `timeout` elapses.
    async fn receive(&self, timeout: Duration) -> Result<Option<Event>>;

    /// Synchronous request that bypasses the event queue.
    fn execute(&self, request: &Value) -> Result<Option<Event>>;

    /// Route transport log messages up to `max_verbosity` into our logs.
    ///
    /// A fatal (level 0) message terminates the process.
    fn install_log_handler(&self, max_verbosity: i32) -> Result<()>;
}
