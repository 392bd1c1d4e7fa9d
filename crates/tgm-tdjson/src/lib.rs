//! `libtdjson` adapter for the [`Transport`] port.
//!
//! Linking is gated behind the `link` feature so the workspace builds without
//! TDLib installed; without it [`TdJsonTransport::create`] returns a config
//! error.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tgm_core::{errors::Error, event::Event, transport::Transport, Result};

#[cfg(feature = "link")]
mod ffi;

/// One TDLib client instance.
#[derive(Debug)]
pub struct TdJsonTransport {
    client_id: i32,
}

impl TdJsonTransport {
    /// Create a new TDLib client. TDLib starts it lazily on the first request.
    pub fn create() -> Result<Self> {
        #[cfg(feature = "link")]
        {
            let client_id = ffi::create_client_id();
            tracing::debug!(client_id, "tdlib client created");
            Ok(Self { client_id })
        }
        #[cfg(not(feature = "link"))]
        {
            Err(Error::Config(
                "built without the `tdjson` feature; libtdjson is not linked".to_string(),
            ))
        }
    }

    pub fn client_id(&self) -> i32 {
        self.client_id
    }
}

#[async_trait]
impl Transport for TdJsonTransport {
    async fn send(&self, request: Value) -> Result<()> {
        let payload = serde_json::to_string(&request)?;
        #[cfg(feature = "link")]
        {
            ffi::send(self.client_id, &payload)
        }
        #[cfg(not(feature = "link"))]
        {
            let _ = payload;
            Err(not_linked())
        }
    }

    async fn receive(&self, timeout: Duration) -> Result<Option<Event>> {
        #[cfg(feature = "link")]
        {
            // td_receive blocks for up to `timeout`.
            let raw = tokio::task::spawn_blocking(move || ffi::receive(timeout.as_secs_f64()))
                .await
                .map_err(|e| Error::Transport(format!("receive task failed: {e}")))??;
            raw.map(|text| Event::parse(&text)).transpose()
        }
        #[cfg(not(feature = "link"))]
        {
            let _ = timeout;
            Err(not_linked())
        }
    }

    fn execute(&self, request: &Value) -> Result<Option<Event>> {
        let payload = serde_json::to_string(request)?;
        #[cfg(feature = "link")]
        {
            ffi::execute(&payload)?
                .map(|text| Event::parse(&text))
                .transpose()
        }
        #[cfg(not(feature = "link"))]
        {
            let _ = payload;
            Err(not_linked())
        }
    }

    fn install_log_handler(&self, max_verbosity: i32) -> Result<()> {
        #[cfg(feature = "link")]
        {
            ffi::set_log_message_callback(max_verbosity);
            Ok(())
        }
        #[cfg(not(feature = "link"))]
        {
            let _ = max_verbosity;
            Err(not_linked())
        }
    }
}

#[cfg(not(feature = "link"))]
fn not_linked() -> Error {
    Error::Transport("libtdjson is not linked".to_string())
}

/// How a TDLib log message is handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogDisposition {
    /// Level 0: TDLib's internal state is broken; the process must exit.
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
}

impl LogDisposition {
    pub fn for_level(verbosity_level: i32) -> Self {
        match verbosity_level {
            i32::MIN..=0 => Self::Fatal,
            1 => Self::Error,
            2 => Self::Warn,
            3 => Self::Info,
            _ => Self::Debug,
        }
    }
}

/// Forward one TDLib log line into `tracing`, exiting on fatal messages.
pub fn handle_log_message(verbosity_level: i32, message: &str) {
    match LogDisposition::for_level(verbosity_level) {
        LogDisposition::Fatal => {
            tracing::error!(target: "tdlib", "fatal: {message}");
            eprintln!("TDLib fatal error: {message}");
            std::process::exit(1);
        }
        LogDisposition::Error => tracing::error!(target: "tdlib", "{message}"),
        LogDisposition::Warn => tracing::warn!(target: "tdlib", "{message}"),
        LogDisposition::Info => tracing::info!(target: "tdlib", "{message}"),
        LogDisposition::Debug => tracing::debug!(target: "tdlib", "{message}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_levels_map_to_dispositions() {
        assert_eq!(LogDisposition::for_level(0), LogDisposition::Fatal);
        assert_eq!(LogDisposition::for_level(-1), LogDisposition::Fatal);
        assert_eq!(LogDisposition::for_level(1), LogDisposition::Error);
        assert_eq!(LogDisposition::for_level(2), LogDisposition::Warn);
        assert_eq!(LogDisposition::for_level(5), LogDisposition::Debug);
    }

    #[cfg(not(feature = "link"))]
    #[test]
    fn unlinked_build_reports_config_error() {
        assert!(matches!(TdJsonTransport::create(), Err(Error::Config(_))));
    }
}
