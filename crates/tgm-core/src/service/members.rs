use std::collections::HashSet;

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use super::ChatService;
use crate::{
    domain::{ChatId, ChatKind, ChatMember, MemberRef},
    event::MatchSpec,
};

#[derive(Deserialize)]
struct BasicGroupFullInfo {
    #[serde(default)]
    members: Vec<ChatMember>,
}

#[derive(Deserialize)]
struct SupergroupMembers {
    #[serde(default)]
    members: Vec<ChatMember>,
}

impl ChatService {
    /// Members of any chat kind.
    ///
    /// - basic group: one `getBasicGroupFullInfo`
    /// - supergroup: `getSupergroupMembers` pages until a short page
    /// - private chat: the other participant, no request
    /// - anything else: empty
    pub async fn list_members(&self, chat_id: ChatId) -> Option<Vec<ChatMember>> {
        let chat = self.chat_info(chat_id).await?;
        match chat.kind {
            ChatKind::BasicGroup { basic_group_id } => {
                self.basic_group_members(basic_group_id).await
            }
            ChatKind::Supergroup { supergroup_id, .. } => {
                Some(self.supergroup_members(supergroup_id).await)
            }
            ChatKind::Private { user_id } => Some(vec![ChatMember::user(user_id)]),
            ChatKind::Unsupported => {
                warn!(chat_id = %chat_id, "unsupported chat kind, no members listed");
                Some(Vec::new())
            }
        }
    }

    async fn basic_group_members(&self, basic_group_id: i64) -> Option<Vec<ChatMember>> {
        let info: BasicGroupFullInfo = self
            .fetch(
                json!({"@type": "getBasicGroupFullInfo", "basic_group_id": basic_group_id}),
                MatchSpec::tag("basicGroupFullInfo"),
            )
            .await?;
        Some(info.members)
    }

    /// Pages are requested at increasing offsets until one comes back shorter
    /// than the page size, whatever `total_count` says. An error ends paging
    /// with the members collected so far.
    async fn supergroup_members(&self, supergroup_id: i64) -> Vec<ChatMember> {
        let page_size = self.limits.supergroup_page_size.max(1);
        let mut members = Vec::new();
        let mut seen: HashSet<MemberRef> = HashSet::new();
        let mut offset = 0i32;

        loop {
            let request = json!({
                "@type": "getSupergroupMembers",
                "supergroup_id": supergroup_id,
                "filter": {"@type": "supergroupMembersFilterRecent"},
                "offset": offset,
                "limit": page_size,
            });
            let Some(page) = self
                .fetch::<SupergroupMembers>(request, MatchSpec::tag("supergroupMembers"))
                .await
            else {
                warn!(supergroup_id, offset, collected = members.len(), "member listing stopped early");
                break;
            };

            let received = page.members.len();
            debug!(supergroup_id, offset, received, "member page");
            for member in page.members {
                if member.member_id == MemberRef::Unknown || seen.insert(member.member_id) {
                    members.push(member);
                }
            }

            if received < page_size as usize {
                break;
            }
            let Some(next) = next_offset(offset, page_size) else {
                warn!(supergroup_id, offset, "member offset out of range, stopping");
                break;
            };
            offset = next;
        }
        members
    }
}

/// TDLib takes the offset as an int32.
fn next_offset(offset: i32, page_size: i32) -> Option<i32> {
    offset.checked_add(page_size)
}
