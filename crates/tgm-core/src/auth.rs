//! TDLib authorization state machine.
//!
//! [`transition`] is pure: it maps the current state and one event to the next
//! state and the step to take. [`Authenticator`] drives it against the live
//! event stream and turns steps into requests.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::{
    config::Config, correlator::Correlator, errors::Error, event::Event, Result,
};

/// Used when TDLib reports a rate limit without saying for how long.
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(30);

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    WaitParameters,
    WaitEncryptionKey,
    WaitPhoneNumber,
    WaitCode,
    WaitPassword,
    Ready,
    Closed,
    /// A state this client does not handle, by its TDLib tag.
    Unknown(String),
}

impl AuthState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Closed)
    }

    fn from_tag(tag: &str) -> Self {
        match tag {
            "authorizationStateWaitTdlibParameters" => Self::WaitParameters,
            "authorizationStateWaitEncryptionKey" => Self::WaitEncryptionKey,
            "authorizationStateWaitPhoneNumber" => Self::WaitPhoneNumber,
            "authorizationStateWaitCode" => Self::WaitCode,
            "authorizationStateWaitPassword" => Self::WaitPassword,
            "authorizationStateReady" => Self::Ready,
            "authorizationStateClosed" => Self::Closed,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// What the driver has to do after an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthStep {
    SendParameters,
    SendEncryptionKey,
    SendPhoneNumber,
    SendCode,
    SendPassword { hint: String },
    /// Authorization completed.
    Finish,
    /// The session closed before becoming ready.
    Abort,
    /// An unhandled state was reported; keep polling.
    Ignore { state: String },
    /// The last request was rejected with a rate limit.
    RetryAfter(Duration),
    /// The last request was rejected for any other reason.
    Fail { code: i64, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: AuthState,
    pub step: Option<AuthStep>,
}

/// Extract the authorization state carried by `event`, if any.
///
/// Accepts both `updateAuthorizationState` and the bare state object TDLib
/// returns for `getAuthorizationState`.
pub fn parse_auth_state(event: &Event) -> Option<(AuthState, &Value)> {
    let tag = event.tag();
    if tag == "updateAuthorizationState" {
        let inner = event.get("authorization_state")?;
        let inner_tag = inner.get("@type").and_then(Value::as_str)?;
        return Some((AuthState::from_tag(inner_tag), inner));
    }
    if tag.starts_with("authorizationState") {
        return Some((AuthState::from_tag(tag), event.raw()));
    }
    None
}

pub fn transition(state: &AuthState, event: &Event) -> Transition {
    let stay = |step| Transition {
        next: state.clone(),
        step,
    };

    if let Some((code, message)) = event.error_details() {
        return stay(Some(classify_error(code, message)));
    }

    let Some((next, payload)) = parse_auth_state(event) else {
        return stay(None);
    };

    // The reply to `getAuthorizationState` and the matching update can both
    // arrive; answering twice would be rejected by TDLib.
    if next == *state && !matches!(next, AuthState::Unknown(_)) {
        return stay(None);
    }

    let step = match &next {
        AuthState::Unknown(tag) => {
            return stay(Some(AuthStep::Ignore { state: tag.clone() }));
        }
        AuthState::WaitParameters => AuthStep::SendParameters,
        AuthState::WaitEncryptionKey => AuthStep::SendEncryptionKey,
        AuthState::WaitPhoneNumber => AuthStep::SendPhoneNumber,
        AuthState::WaitCode => AuthStep::SendCode,
        AuthState::WaitPassword => AuthStep::SendPassword {
            hint: payload
                .get("password_hint")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        AuthState::Ready => AuthStep::Finish,
        AuthState::Closed => AuthStep::Abort,
    };

    Transition {
        next,
        step: Some(step),
    }
}

fn classify_error(code: i64, message: &str) -> AuthStep {
    if code == 429 || message.starts_with("Too Many Requests") || message.starts_with("FLOOD_WAIT_") {
        return AuthStep::RetryAfter(parse_retry_after(message).unwrap_or(DEFAULT_RETRY_AFTER));
    }
    AuthStep::Fail {
        code,
        message: message.to_string(),
    }
}

/// Parse `"Too Many Requests: retry after 17"` (also `FLOOD_WAIT_17`).
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    let tail = message
        .rsplit_once("retry after ")
        .map(|(_, t)| t)
        .or_else(|| message.rsplit_once("FLOOD_WAIT_").map(|(_, t)| t))?;
    let digits: String = tail.chars().take_while(char::is_ascii_digit).collect();
    digits.parse::<u64>().ok().map(Duration::from_secs)
}

/// Source of the credentials TDLib asks for during login.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn encryption_key(&self) -> Result<String>;
    async fn phone_number(&self) -> Result<String>;
    async fn code(&self) -> Result<String>;
    async fn password(&self, hint: &str) -> Result<String>;
    /// Whether to wait `wait` and retry after a rate limit, or give up.
    async fn confirm_rate_limit_retry(&self, wait: Duration) -> Result<bool>;
}

pub struct Authenticator<'a> {
    correlator: &'a Correlator,
    config: &'a Config,
    credentials: &'a dyn CredentialProvider,
}

impl<'a> Authenticator<'a> {
    pub fn new(
        correlator: &'a Correlator,
        config: &'a Config,
        credentials: &'a dyn CredentialProvider,
    ) -> Self {
        Self {
            correlator,
            config,
            credentials,
        }
    }

    /// Drive the session to `Ready`.
    ///
    /// Blocks until a terminal state or a fatal error unless
    /// `Config::auth_timeout` is set.
    pub async fn run(&self) -> Result<()> {
        self.setup_logging()?;

        let stream = self.correlator.exclusive().await;
        let mut state = AuthState::Unknown(String::new());
        let mut last_request = json!({"@type": "getAuthorizationState"});
        stream.send(last_request.clone()).await?;

        let deadline = self.config.auth_timeout.map(|t| Instant::now() + t);
        loop {
            if stream.is_cancelled() {
                return Err(Error::Auth("cancelled".to_string()));
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(Error::Auth(format!(
                    "timed out in state {state:?} waiting for authorization"
                )));
            }

            let Some(event) = stream.poll().await? else {
                continue;
            };

            let Transition { next, step } = transition(&state, &event);
            if next != state {
                debug!(from = ?state, to = ?next, "authorization state changed");
                state = next;
            }

            match step {
                None => {}
                Some(AuthStep::Finish) => {
                    info!("authorized");
                    return Ok(());
                }
                Some(AuthStep::Abort) => return Err(Error::SessionClosed),
                Some(AuthStep::Ignore { state: unknown }) => {
                    warn!(state = %unknown, "unsupported authorization state, ignoring");
                }
                Some(AuthStep::RetryAfter(wait)) => {
                    warn!(wait_secs = wait.as_secs(), "rate limited during authorization");
                    if !self.credentials.confirm_rate_limit_retry(wait).await? {
                        return Err(Error::RateLimited { retry_after: wait });
                    }
                    tokio::select! {
                        _ = self.correlator.cancellation().cancelled() => {
                            return Err(Error::Auth("cancelled".to_string()));
                        }
                        _ = sleep(wait) => {}
                    }
                    stream.send(last_request.clone()).await?;
                }
                Some(AuthStep::Fail { code, message }) => {
                    return Err(Error::Auth(format!("{message} (code {code})")));
                }
                Some(step) => {
                    let request = self.build_request(&step).await?;
                    debug!(method = request["@type"].as_str().unwrap_or_default(), "auth request");
                    last_request = request.clone();
                    stream.send(request).await?;
                }
            }
        }
    }

    fn setup_logging(&self) -> Result<()> {
        let transport = self.correlator.transport();
        transport.execute(&json!({
            "@type": "setLogVerbosityLevel",
            "new_verbosity_level": self.config.log_verbosity,
        }))?;
        transport.install_log_handler(self.config.log_verbosity)
    }

    async fn build_request(&self, step: &AuthStep) -> Result<Value> {
        let request = match step {
            AuthStep::SendParameters => self.parameters(),
            AuthStep::SendEncryptionKey => {
                let key = match &self.config.database_encryption_key {
                    Some(k) => k.clone(),
                    None => self.credentials.encryption_key().await?,
                };
                json!({"@type": "checkDatabaseEncryptionKey", "encryption_key": key})
            }
            AuthStep::SendPhoneNumber => {
                let phone = match &self.config.phone_number {
                    Some(p) => p.clone(),
                    None => self.credentials.phone_number().await?,
                };
                json!({"@type": "setAuthenticationPhoneNumber", "phone_number": phone})
            }
            AuthStep::SendCode => {
                let code = self.credentials.code().await?;
                json!({"@type": "checkAuthenticationCode", "code": code.trim()})
            }
            AuthStep::SendPassword { hint } => {
                let password = self.credentials.password(hint).await?;
                json!({"@type": "checkAuthenticationPassword", "password": password})
            }
            other => {
                return Err(Error::Auth(format!("no request for step {other:?}")));
            }
        };
        Ok(request)
    }

    fn parameters(&self) -> Value {
        let p = &self.config.tdlib;
        let mut request = json!({
            "@type": "setTdlibParameters",
            "database_directory": p.database_directory.display().to_string(),
            "use_message_database": p.use_message_database,
            "use_secret_chats": p.use_secret_chats,
            "api_id": p.api_id,
            "api_hash": p.api_hash,
            "system_language_code": p.system_language_code,
            "device_model": p.device_model,
            "application_version": p.application_version,
        });
        if let Some(key) = &self.config.database_encryption_key {
            request["database_encryption_key"] = Value::String(key.clone());
        }
        request
    }
}
