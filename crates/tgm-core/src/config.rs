use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// TDLib caps `getSupergroupMembers` pages at 200.
pub const MAX_SUPERGROUP_PAGE_SIZE: i32 = 200;

/// TDLib caps `getGroupsInCommon` pages at 100.
pub const MAX_COMMON_GROUPS_PAGE_LIMIT: i32 = 100;

/// Typed configuration, read from the environment (and `.env`, if present).
#[derive(Clone, Debug)]
pub struct Config {
    pub tdlib: TdlibParameters,

    // Credentials that would otherwise be prompted for.
    pub phone_number: Option<String>,
    pub database_encryption_key: Option<String>,

    pub log_verbosity: i32,

    pub polling: PollingConfig,
    pub auth_timeout: Option<Duration>,
    pub limits: QueryLimits,

    // Analysis run by the binary.
    pub target_chat: Option<String>,
    pub rank_results: bool,
    pub top_user: Option<i64>,
    pub top_limit: usize,
}

/// Fields of `setTdlibParameters`.
#[derive(Clone, Debug)]
pub struct TdlibParameters {
    pub api_id: i32,
    pub api_hash: String,
    pub database_directory: PathBuf,
    pub use_message_database: bool,
    pub use_secret_chats: bool,
    pub system_language_code: String,
    pub device_model: String,
    pub application_version: String,
}

/// Event-stream polling behaviour shared by the correlator and the auth loop.
#[derive(Clone, Copy, Debug)]
pub struct PollingConfig {
    /// Per-iteration `receive` timeout.
    pub poll_timeout: Duration,
    /// Sleep after a poll that returned nothing.
    pub idle_sleep: Duration,
    /// Outer deadline for a single correlated call. `None` waits forever.
    pub call_timeout: Option<Duration>,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_secs(1),
            idle_sleep: Duration::from_secs(5),
            call_timeout: None,
        }
    }
}

/// Page sizes and upper bounds used by the query operations.
#[derive(Clone, Copy, Debug)]
pub struct QueryLimits {
    /// `getChats` limit. A fixed bound standing in for "all chats".
    pub chats_limit: i32,
    pub supergroup_page_size: i32,
    pub common_groups_page_limit: i32,
    pub resolve_member_names: bool,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            chats_limit: 100_000,
            supergroup_page_size: MAX_SUPERGROUP_PAGE_SIZE,
            common_groups_page_limit: MAX_COMMON_GROUPS_PAGE_LIMIT,
            resolve_member_names: true,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let api_id = env_str("API_ID")
            .and_then(non_empty)
            .ok_or_else(|| Error::Config("API_ID environment variable is required".to_string()))?;
        let api_id = api_id
            .trim()
            .parse::<i32>()
            .map_err(|e| Error::Config(format!("API_ID must be an integer: {e}")))?;
        let api_hash = env_str("API_HASH").and_then(non_empty).ok_or_else(|| {
            Error::Config("API_HASH environment variable is required".to_string())
        })?;

        let tdlib = TdlibParameters {
            api_id,
            api_hash,
            database_directory: env_path("TDLIB_DATABASE_DIR")
                .unwrap_or_else(|| PathBuf::from("tdlib")),
            use_message_database: env_bool("TDLIB_USE_MESSAGE_DATABASE").unwrap_or(true),
            use_secret_chats: env_bool("TDLIB_USE_SECRET_CHATS").unwrap_or(true),
            system_language_code: env_str("TDLIB_SYSTEM_LANGUAGE")
                .and_then(non_empty)
                .unwrap_or_else(|| "en".to_string()),
            device_model: env_str("TDLIB_DEVICE_MODEL")
                .and_then(non_empty)
                .unwrap_or_else(|| "Desktop".to_string()),
            application_version: env_str("TDLIB_APP_VERSION")
                .and_then(non_empty)
                .unwrap_or_else(|| "1.0".to_string()),
        };

        let phone_number = env_str("TGM_PHONE_NUMBER").and_then(non_empty);
        let database_encryption_key = env_str("TDLIB_ENCRYPTION_KEY");

        let log_verbosity = env_i64("TDLIB_LOG_VERBOSITY").unwrap_or(2).clamp(0, 1024) as i32;

        let polling = PollingConfig {
            poll_timeout: env_millis("TGM_POLL_TIMEOUT_MS").unwrap_or(Duration::from_secs(1)),
            idle_sleep: env_millis("TGM_IDLE_SLEEP_MS").unwrap_or(Duration::from_secs(5)),
            call_timeout: env_millis("TGM_CALL_TIMEOUT_MS"),
        };
        let auth_timeout = env_millis("TGM_AUTH_TIMEOUT_MS");

        let defaults = QueryLimits::default();
        let limits = QueryLimits {
            chats_limit: env_i64("TGM_CHATS_LIMIT")
                .map(|v| v.clamp(1, i32::MAX as i64) as i32)
                .unwrap_or(defaults.chats_limit),
            supergroup_page_size: env_i64("TGM_SUPERGROUP_PAGE_SIZE")
                .map(|v| v.clamp(1, MAX_SUPERGROUP_PAGE_SIZE as i64) as i32)
                .unwrap_or(defaults.supergroup_page_size),
            common_groups_page_limit: env_i64("TGM_COMMON_GROUPS_PAGE_LIMIT")
                .map(|v| v.clamp(1, MAX_COMMON_GROUPS_PAGE_LIMIT as i64) as i32)
                .unwrap_or(defaults.common_groups_page_limit),
            resolve_member_names: env_bool("TGM_RESOLVE_NAMES").unwrap_or(true),
        };

        let target_chat = env_str("TGM_CHAT").and_then(non_empty);
        let rank_results = env_bool("TGM_RANK").unwrap_or(true);
        let top_user = env_i64("TGM_TOP_USER");
        let top_limit = env_i64("TGM_TOP_LIMIT").unwrap_or(10).max(1) as usize;

        Ok(Self {
            tdlib,
            phone_number,
            database_encryption_key,
            log_verbosity,
            polling,
            auth_timeout,
            limits,
            target_chat,
            rank_results,
            top_user,
            top_limit,
        })
    }
}

/// A chat reference given on the command line or in `TGM_CHAT`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatTarget {
    Id(i64),
    Username(String),
}

impl ChatTarget {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Username(raw.trim_start_matches('@').to_string()),
        }
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = &val[1..val.len() - 1];
        }

        out.push((key.to_string(), val.to_string()));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| parse_bool(&s))
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn env_i64(key: &str) -> Option<i64> {
    env_str(key).and_then(|s| s.trim().parse::<i64>().ok())
}

fn env_millis(key: &str) -> Option<Duration> {
    env_str(key)
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_millis)
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_lines_are_parsed() {
        let parsed = parse_dotenv(
            "# comment\n\nAPI_ID=123\nexport API_HASH=\"abc\"\nBAD_LINE\n=novalue\nTGM_CHAT='@team'\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("API_ID".to_string(), "123".to_string()),
                ("API_HASH".to_string(), "abc".to_string()),
                ("TGM_CHAT".to_string(), "@team".to_string()),
            ]
        );
    }

    #[test]
    fn bool_values() {
        for v in ["1", "true", "YES", " on "] {
            assert!(parse_bool(v), "{v}");
        }
        for v in ["0", "false", "off", ""] {
            assert!(!parse_bool(v), "{v}");
        }
    }

    #[test]
    fn chat_target_parses_ids_and_names() {
        assert_eq!(ChatTarget::parse("-1002401691915"), ChatTarget::Id(-1002401691915));
        assert_eq!(
            ChatTarget::parse("@some_group"),
            ChatTarget::Username("some_group".to_string())
        );
        assert_eq!(
            ChatTarget::parse(" plain "),
            ChatTarget::Username("plain".to_string())
        );
    }

    #[test]
    fn defaults_follow_platform_limits() {
        let limits = QueryLimits::default();
        assert_eq!(limits.supergroup_page_size, 200);
        assert_eq!(limits.common_groups_page_limit, 100);
        assert_eq!(limits.chats_limit, 100_000);

        let polling = PollingConfig::default();
        assert_eq!(polling.poll_timeout, Duration::from_secs(1));
        assert!(polling.call_timeout.is_none());
    }
}
