use std::time::Duration;

/// Core error type.
///
/// Adapter crates map their failures into this type. Expected query failures
/// (missing chat, rejected request) are not errors: they surface as `None`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("authorization failed: {0}")]
    Auth(String),

    #[error("session closed before authorization completed")]
    SessionClosed,

    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
