//! Typed queries over the correlator.
//!
//! Expected failures (unknown chat, rejected request) come back as `None`
//! rather than an error; callers decide whether that is fatal.

mod aggregate;
mod members;

use std::{collections::HashSet, sync::Arc};

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{
    config::QueryLimits,
    correlator::{request_type, Correlator},
    domain::{Chat, ChatId, ChatKind, ChatList, ChatSummary, CommonGroups, UserId, UserProfile},
    errors::Error,
    event::MatchSpec,
    Result,
};

pub use aggregate::rank_by_count;

pub struct ChatService {
    correlator: Arc<Correlator>,
    limits: QueryLimits,
    me: UserId,
}

impl ChatService {
    /// Build the service for an authorized session, resolving the current
    /// user once.
    pub async fn connect(correlator: Arc<Correlator>, limits: QueryLimits) -> Result<Self> {
        let me = correlator
            .call(json!({"@type": "getMe"}), &MatchSpec::tag("user"))
            .await
            .and_then(|e| e.decode::<UserProfile>().ok())
            .ok_or_else(|| Error::External("failed to retrieve current user info".to_string()))?;
        info!(user_id = %me.id, "session user resolved");

        Ok(Self {
            correlator,
            limits,
            me: me.id,
        })
    }

    /// The authenticated user.
    pub fn me(&self) -> UserId {
        self.me
    }

    pub fn limits(&self) -> &QueryLimits {
        &self.limits
    }

    /// `searchPublicChat`: chat id for a public username.
    pub async fn resolve_chat_by_name(&self, name: &str) -> Option<ChatId> {
        let username = name.trim().trim_start_matches('@');
        let event = self
            .correlator
            .call(
                json!({"@type": "searchPublicChat", "username": username}),
                &MatchSpec::tag("chat"),
            )
            .await?;
        event.i64_field("id").map(ChatId)
    }

    /// User behind a public username. A name that belongs to a group or
    /// channel resolves to that chat's id.
    pub async fn resolve_user_by_name(&self, name: &str) -> Option<UserId> {
        let username = name.trim().trim_start_matches('@');
        let chat: Chat = self
            .fetch(
                json!({"@type": "searchPublicChat", "username": username}),
                MatchSpec::tag("chat"),
            )
            .await?;
        match chat.kind {
            ChatKind::Private { user_id } => Some(user_id),
            _ => {
                debug!(username, chat_id = %chat.id, "public name is not a user, using chat id");
                Some(UserId(chat.id.0))
            }
        }
    }

    pub async fn chat_info(&self, chat_id: ChatId) -> Option<Chat> {
        self.fetch(
            json!({"@type": "getChat", "chat_id": chat_id}),
            MatchSpec::predicate(move |e| e.tag() == "chat" && e.i64_field("id") == Some(chat_id.0)),
        )
        .await
    }

    /// All basic groups in the main chat list, as `{id, name}`.
    ///
    /// `getChats` is bounded by `QueryLimits::chats_limit` rather than paged.
    /// Chats whose info cannot be fetched are skipped.
    pub async fn list_chats(&self) -> Option<Vec<ChatSummary>> {
        let list: ChatList = self
            .fetch(
                json!({"@type": "getChats", "limit": self.limits.chats_limit}),
                MatchSpec::tag("chats"),
            )
            .await?;

        let mut chats = Vec::new();
        for chat_id in list.chat_ids {
            let Some(chat) = self.chat_info(chat_id).await else {
                debug!(chat_id = %chat_id, "no chat info, skipping");
                continue;
            };
            if !matches!(chat.kind, ChatKind::BasicGroup { .. }) {
                continue;
            }
            chats.push(ChatSummary {
                id: chat_id,
                name: chat.title,
            });
        }
        Some(chats)
    }

    /// Groups shared with `user_id`, following `offset_chat_id` until TDLib's
    /// `total_count` is reached.
    ///
    /// `None` only if the first page fails; a later failure returns what was
    /// collected so far.
    pub async fn common_groups_with_user(&self, user_id: UserId) -> Option<CommonGroups> {
        let limit = self.limits.common_groups_page_limit.max(1);
        let mut chat_ids: Vec<ChatId> = Vec::new();
        let mut seen = HashSet::new();
        let mut total_count = 0;
        let mut offset_chat_id = ChatId(0);
        let mut pages = 0usize;

        loop {
            let request = json!({
                "@type": "getGroupsInCommon",
                "user_id": user_id,
                "offset_chat_id": offset_chat_id,
                "limit": limit,
            });
            let page: ChatList = match self.fetch(request, MatchSpec::tag("chats")).await {
                Some(page) => page,
                None if pages == 0 => return None,
                None => {
                    warn!(user_id = %user_id, collected = chat_ids.len(), "common groups truncated");
                    break;
                }
            };
            pages += 1;
            total_count = page.total_count;

            let before = chat_ids.len();
            chat_ids.extend(page.chat_ids.into_iter().filter(|id| seen.insert(*id)));

            let Some(&last) = chat_ids.last() else {
                break;
            };
            if chat_ids.len() == before || chat_ids.len() as i64 >= total_count {
                break;
            }
            offset_chat_id = last;
        }

        Some(CommonGroups {
            chat_ids,
            total_count,
        })
    }

    /// `"first last"`, with missing parts left out.
    pub async fn display_name(&self, user_id: UserId) -> Option<String> {
        let user: UserProfile = self
            .fetch(
                json!({"@type": "getUser", "user_id": user_id}),
                MatchSpec::predicate(move |e| e.tag() == "user" && e.i64_field("id") == Some(user_id.0)),
            )
            .await?;
        Some(user.display_name())
    }

    async fn fetch<T: DeserializeOwned>(&self, request: Value, spec: MatchSpec) -> Option<T> {
        let method = request_type(&request).to_string();
        let event = self.correlator.call(request, &spec).await?;
        match event.decode::<T>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(method = %method, reply = event.tag(), "malformed reply: {e}");
                None
            }
        }
    }
}
