use std::collections::{HashMap, HashSet};

use tracing::{debug, error, warn};

use super::ChatService;
use crate::domain::{ChatId, CoMemberCount, MemberOverlap, UserId};

impl ChatService {
    /// For every user in `chat_id` other than ourselves, how many groups we
    /// share with them.
    ///
    /// A member whose common groups cannot be fetched is skipped; the rest of
    /// the run continues. Output follows member order (see [`rank_by_count`]).
    pub async fn common_chat_counts(&self, chat_id: ChatId) -> Option<Vec<MemberOverlap>> {
        let Some(members) = self.list_members(chat_id).await else {
            error!(chat_id = %chat_id, "failed to get chat members");
            return None;
        };

        let mut results = Vec::new();
        for member in &members {
            let Some(user_id) = member.member_id.user_id() else {
                continue;
            };
            if user_id == self.me {
                continue;
            }

            let Some(groups) = self.common_groups_with_user(user_id).await else {
                warn!(user_id = %user_id, "failed to get common groups, skipping member");
                continue;
            };

            let name = if self.limits.resolve_member_names {
                self.display_name(user_id).await
            } else {
                None
            };
            results.push(MemberOverlap {
                user_id,
                name,
                common_group_count: groups.chat_ids.len(),
            });
        }
        debug!(chat_id = %chat_id, members = members.len(), results = results.len(), "overlap computed");
        Some(results)
    }

    /// Users that appear most often across the groups shared with `user_id`.
    ///
    /// Neither `user_id` nor ourselves are counted. Ties are ordered by user id.
    pub async fn top_co_members(&self, user_id: UserId, limit: usize) -> Option<Vec<CoMemberCount>> {
        let groups = self.common_groups_with_user(user_id).await?;

        let mut counts: HashMap<UserId, usize> = HashMap::new();
        for chat_id in groups.chat_ids {
            let Some(members) = self.list_members(chat_id).await else {
                warn!(chat_id = %chat_id, "failed to list members, skipping group");
                continue;
            };
            let present: HashSet<UserId> = members
                .iter()
                .filter_map(|m| m.member_id.user_id())
                .filter(|id| *id != user_id && *id != self.me)
                .collect();
            for other in present {
                *counts.entry(other).or_default() += 1;
            }
        }

        let mut ranked: Vec<CoMemberCount> = counts
            .into_iter()
            .map(|(user_id, shared_groups)| CoMemberCount {
                user_id,
                shared_groups,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.shared_groups
                .cmp(&a.shared_groups)
                .then(a.user_id.cmp(&b.user_id))
        });
        ranked.truncate(limit);
        Some(ranked)
    }
}

/// Highest common-group count first; equal counts keep their order.
pub fn rank_by_count(entries: &mut [MemberOverlap]) {
    entries.sort_by(|a, b| b.common_group_count.cmp(&a.common_group_count));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::tests::{service, with_me, ME};
    use crate::testing::{basic_group, chat_event, error_event, user_member, ScriptedTransport};
    use serde_json::{json, Value};

    fn groups(ids: &[i64]) -> Vec<Value> {
        vec![json!({"@type": "chats", "total_count": ids.len(), "chat_ids": ids})]
    }

    #[tokio::test]
    async fn counts_skip_self_and_report_others() {
        let other = 642169077;
        let transport = ScriptedTransport::new(with_me(move |req| match req["@type"].as_str() {
            Some("getChat") => vec![chat_event(-5, "Small", basic_group(42))],
            Some("getBasicGroupFullInfo") => vec![json!({
                "@type": "basicGroupFullInfo",
                "members": [user_member(ME), user_member(other)]
            })],
            Some("getGroupsInCommon") => groups(&[1, 2, 3]),
            _ => Vec::new(),
        }));
        let svc = service(transport.clone()).await;

        let result = svc.common_chat_counts(ChatId(-5)).await.unwrap();
        assert_eq!(
            result,
            vec![MemberOverlap {
                user_id: UserId(other),
                name: None,
                common_group_count: 3
            }]
        );
        let asked: Vec<_> = transport
            .sent_of_type("getGroupsInCommon")
            .iter()
            .map(|r| r["user_id"].as_i64().unwrap())
            .collect();
        assert_eq!(asked, vec![other]);
    }

    #[tokio::test]
    async fn self_is_excluded_however_often_it_appears() {
        let transport = ScriptedTransport::new(with_me(|req| match req["@type"].as_str() {
            Some("getChat") => vec![chat_event(-5, "Small", basic_group(42))],
            Some("getBasicGroupFullInfo") => vec![json!({
                "@type": "basicGroupFullInfo",
                "members": [user_member(ME), user_member(2), user_member(ME)]
            })],
            Some("getGroupsInCommon") => groups(&[1]),
            _ => Vec::new(),
        }));
        let svc = service(transport).await;

        let result = svc.common_chat_counts(ChatId(-5)).await.unwrap();
        assert!(result.iter().all(|e| e.user_id != UserId(ME)));
        assert_eq!(result.len(), 1);

        let only_self = ScriptedTransport::new(with_me(|req| match req["@type"].as_str() {
            Some("getChat") => vec![chat_event(-5, "Small", basic_group(42))],
            Some("getBasicGroupFullInfo") => {
                vec![json!({"@type": "basicGroupFullInfo", "members": [user_member(ME)]})]
            }
            _ => Vec::new(),
        }));
        let svc = service(only_self.clone()).await;
        assert_eq!(svc.common_chat_counts(ChatId(-5)).await, Some(Vec::new()));
        assert!(only_self.sent_of_type("getGroupsInCommon").is_empty());
    }

    #[tokio::test]
    async fn partial_failure_skips_only_the_failing_member() {
        let transport = ScriptedTransport::new(with_me(|req| match req["@type"].as_str() {
            Some("getChat") => vec![chat_event(-5, "Small", basic_group(42))],
            Some("getBasicGroupFullInfo") => vec![json!({
                "@type": "basicGroupFullInfo",
                "members": [
                    user_member(1),
                    user_member(2),
                    {"@type": "chatMember", "member_id": {"@type": "messageSenderChat", "chat_id": -9}},
                    user_member(3)
                ]
            })],
            Some("getGroupsInCommon") => match req["user_id"].as_i64() {
                Some(2) => vec![error_event(400, "USER_NOT_FOUND")],
                Some(id) => groups(&(1..=id).collect::<Vec<i64>>()),
                None => Vec::new(),
            },
            _ => Vec::new(),
        }));
        let svc = service(transport).await;

        let result = svc.common_chat_counts(ChatId(-5)).await.unwrap();
        let counts: Vec<_> = result
            .iter()
            .map(|e| (e.user_id, e.common_group_count))
            .collect();
        assert_eq!(counts, vec![(UserId(1), 1), (UserId(3), 3)]);
    }

    #[tokio::test]
    async fn names_are_attached_when_enabled() {
        let transport = ScriptedTransport::new(with_me(|req| match req["@type"].as_str() {
            Some("getChat") => vec![chat_event(-5, "Small", basic_group(42))],
            Some("getBasicGroupFullInfo") => vec![json!({
                "@type": "basicGroupFullInfo",
                "members": [user_member(7), user_member(8)]
            })],
            Some("getGroupsInCommon") => groups(&[1, 2]),
            Some("getUser") => match req["user_id"].as_i64() {
                Some(7) => vec![json!({"@type": "user", "id": 7, "first_name": "Ann", "last_name": "Lee"})],
                _ => vec![error_event(404, "Not Found")],
            },
            _ => Vec::new(),
        }));
        let mut svc = service(transport).await;
        svc.limits.resolve_member_names = true;

        let result = svc.common_chat_counts(ChatId(-5)).await.unwrap();
        assert_eq!(result[0].name.as_deref(), Some("Ann Lee"));
        assert_eq!(result[1].name, None);
        assert_eq!(result[1].common_group_count, 2);
    }

    #[tokio::test]
    async fn member_listing_failure_is_none() {
        let transport = ScriptedTransport::new(with_me(|_| vec![error_event(400, "CHAT_NOT_FOUND")]));
        let svc = service(transport).await;
        assert!(svc.common_chat_counts(ChatId(-5)).await.is_none());
    }

    #[test]
    fn ranking_is_descending_and_stable() {
        let entry = |id, count| MemberOverlap {
            user_id: UserId(id),
            name: None,
            common_group_count: count,
        };
        let mut entries = vec![entry(1, 2), entry(2, 5), entry(3, 2), entry(4, 9)];
        rank_by_count(&mut entries);
        let ids: Vec<_> = entries.iter().map(|e| e.user_id.0).collect();
        assert_eq!(ids, vec![4, 2, 1, 3]);
    }

    #[tokio::test]
    async fn top_co_members_counts_shared_groups() {
        let target = 500;
        let transport = ScriptedTransport::new(with_me(move |req| match req["@type"].as_str() {
            Some("getGroupsInCommon") => groups(&[-1, -2, -3]),
            Some("getChat") => {
                let id = req["chat_id"].as_i64().unwrap();
                vec![chat_event(id, "g", basic_group(-id))]
            }
            Some("getBasicGroupFullInfo") => {
                let members = match req["basic_group_id"].as_i64() {
                    Some(1) => vec![user_member(ME), user_member(target), user_member(10), user_member(11)],
                    Some(2) => vec![user_member(ME), user_member(target), user_member(10), user_member(12)],
                    _ => vec![user_member(target), user_member(10), user_member(11), user_member(11)],
                };
                vec![json!({"@type": "basicGroupFullInfo", "members": members})]
            }
            _ => Vec::new(),
        }));
        let svc = service(transport).await;

        let top = svc.top_co_members(UserId(target), 2).await.unwrap();
        assert_eq!(
            top,
            vec![
                CoMemberCount {
                    user_id: UserId(10),
                    shared_groups: 3
                },
                CoMemberCount {
                    user_id: UserId(11),
                    shared_groups: 2
                },
            ]
        );
    }
}
