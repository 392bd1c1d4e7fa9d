//! Test doubles shared by the unit tests in this crate.

use std::{
    collections::VecDeque,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{
    config::{Config, PollingConfig, QueryLimits, TdlibParameters},
    correlator::Correlator,
    event::Event,
    transport::Transport,
    Result,
};

type Responder = Box<dyn Fn(&Value) -> Vec<Value> + Send + Sync>;

#[derive(Default)]
struct ScriptState {
    queue: VecDeque<Value>,
    sent: Vec<Value>,
    executed: Vec<Value>,
    receive_calls: usize,
    log_handler: Option<i32>,
}

/// In-memory transport: every `send` is answered by the responder, whose
/// events are appended to the shared queue in order.
pub(crate) struct ScriptedTransport {
    state: Mutex<ScriptState>,
    responder: Responder,
}

impl ScriptedTransport {
    pub(crate) fn new(responder: impl Fn(&Value) -> Vec<Value> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ScriptState::default()),
            responder: Box::new(responder),
        })
    }

    /// Queue an event that is already waiting before anything is sent.
    pub(crate) fn push(&self, event: Value) {
        self.state.lock().unwrap().queue.push_back(event);
    }

    pub(crate) fn sent(&self) -> Vec<Value> {
        self.state.lock().unwrap().sent.clone()
    }

    pub(crate) fn sent_types(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|r| r["@type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub(crate) fn sent_of_type(&self, ty: &str) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter(|r| r["@type"] == ty)
            .collect()
    }

    pub(crate) fn executed(&self) -> Vec<Value> {
        self.state.lock().unwrap().executed.clone()
    }

    pub(crate) fn receive_calls(&self) -> usize {
        self.state.lock().unwrap().receive_calls
    }

    pub(crate) fn pending(&self) -> usize {
        self.state.lock().unwrap().queue.len()
    }

    pub(crate) fn log_handler(&self) -> Option<i32> {
        self.state.lock().unwrap().log_handler
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: Value) -> Result<()> {
        let replies = (self.responder)(&request);
        let mut state = self.state.lock().unwrap();
        state.sent.push(request);
        state.queue.extend(replies);
        Ok(())
    }

    async fn receive(&self, _timeout: Duration) -> Result<Option<Event>> {
        // Gives a concurrent caller the chance to interleave, as a real
        // blocking receive would.
        tokio::task::yield_now().await;
        let mut state = self.state.lock().unwrap();
        state.receive_calls += 1;
        Ok(state.queue.pop_front().map(Event::new))
    }

    fn execute(&self, request: &Value) -> Result<Option<Event>> {
        self.state.lock().unwrap().executed.push(request.clone());
        Ok(Some(Event::new(json!({"@type": "ok"}))))
    }

    fn install_log_handler(&self, max_verbosity: i32) -> Result<()> {
        self.state.lock().unwrap().log_handler = Some(max_verbosity);
        Ok(())
    }
}

/// Polling that never sleeps, with a short deadline so a broken script fails
/// the test instead of hanging it.
pub(crate) fn fast_polling() -> PollingConfig {
    PollingConfig {
        poll_timeout: Duration::from_millis(0),
        idle_sleep: Duration::from_millis(0),
        call_timeout: Some(Duration::from_millis(500)),
    }
}

pub(crate) fn correlator(transport: Arc<ScriptedTransport>) -> Arc<Correlator> {
    Arc::new(Correlator::new(transport, fast_polling()))
}

pub(crate) fn test_limits() -> QueryLimits {
    QueryLimits {
        resolve_member_names: false,
        ..QueryLimits::default()
    }
}

pub(crate) fn test_config() -> Config {
    Config {
        tdlib: TdlibParameters {
            api_id: 12345,
            api_hash: "hash".to_string(),
            database_directory: PathBuf::from("/tmp/tgm-test-db"),
            use_message_database: true,
            use_secret_chats: true,
            system_language_code: "en".to_string(),
            device_model: "Desktop".to_string(),
            application_version: "1.0".to_string(),
        },
        phone_number: None,
        database_encryption_key: None,
        log_verbosity: 2,
        polling: fast_polling(),
        auth_timeout: Some(Duration::from_secs(2)),
        limits: test_limits(),
        target_chat: None,
        rank_results: true,
        top_user: None,
        top_limit: 10,
    }
}

pub(crate) fn user_member(user_id: i64) -> Value {
    json!({
        "@type": "chatMember",
        "member_id": {"@type": "messageSenderUser", "user_id": user_id},
        "status": {"@type": "chatMemberStatusMember"}
    })
}

pub(crate) fn chat_event(id: i64, title: &str, kind: Value) -> Value {
    json!({"@type": "chat", "id": id, "title": title, "type": kind})
}

pub(crate) fn basic_group(basic_group_id: i64) -> Value {
    json!({"@type": "chatTypeBasicGroup", "basic_group_id": basic_group_id})
}

pub(crate) fn supergroup(supergroup_id: i64) -> Value {
    json!({"@type": "chatTypeSupergroup", "supergroup_id": supergroup_id, "is_channel": false})
}

pub(crate) fn error_event(code: i64, message: &str) -> Value {
    json!({"@type": "error", "code": code, "message": message})
}
