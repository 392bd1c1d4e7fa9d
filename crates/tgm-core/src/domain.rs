use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The `type` object of a TDLib `chat`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "@type")]
pub enum ChatKind {
    #[serde(rename = "chatTypePrivate")]
    Private { user_id: UserId },
    #[serde(rename = "chatTypeBasicGroup")]
    BasicGroup { basic_group_id: i64 },
    #[serde(rename = "chatTypeSupergroup")]
    Supergroup {
        supergroup_id: i64,
        #[serde(default)]
        is_channel: bool,
    },
    /// Secret chats and anything newer than this client knows about.
    #[serde(other)]
    Unsupported,
}

/// A TDLib `chat`, reduced to the fields we inspect. Identity is `id`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Chat {
    pub id: ChatId,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ChatKind,
}

/// `{id, name}` projection returned by chat listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChatSummary {
    pub id: ChatId,
    pub name: String,
}

/// Who a chat member is (`MessageSender` in TDLib terms).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(tag = "@type")]
pub enum MemberRef {
    #[serde(rename = "messageSenderUser")]
    User { user_id: UserId },
    #[serde(rename = "messageSenderChat")]
    Chat { chat_id: ChatId },
    #[serde(other)]
    Unknown,
}

impl MemberRef {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            Self::User { user_id } => Some(*user_id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ChatMember {
    pub member_id: MemberRef,
    /// Role/status object, kept raw.
    #[serde(default)]
    pub status: Value,
}

impl ChatMember {
    pub fn user(user_id: UserId) -> Self {
        Self {
            member_id: MemberRef::User { user_id },
            status: Value::Null,
        }
    }
}

/// A TDLib `chats` object: the reply to both `getChats` and `getGroupsInCommon`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct ChatList {
    #[serde(default)]
    pub chat_ids: Vec<ChatId>,
    #[serde(default)]
    pub total_count: i64,
}

/// Groups shared with a user. `chat_ids` may hold fewer than `total_count`
/// entries if paging stopped early.
pub type CommonGroups = ChatList;

/// A TDLib `user`, reduced to its name fields.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl UserProfile {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// Per-member result of the common-groups analysis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemberOverlap {
    pub user_id: UserId,
    pub name: Option<String>,
    pub common_group_count: usize,
}

/// How many of a user's common groups another user also belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CoMemberCount {
    pub user_id: UserId,
    pub shared_groups: usize,
}
