use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tgm_core::{
    auth::Authenticator,
    config::{ChatTarget, Config},
    correlator::Correlator,
    domain::{ChatId, UserId},
    service::{rank_by_count, ChatService},
    transport::Transport,
};
use tgm_tdjson::TdJsonTransport;

mod prompt;

use prompt::TerminalPrompt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tgm_core::logging::init("tgm")?;

    let cfg = Config::load().context("failed to load configuration")?;

    let transport: Arc<dyn Transport> =
        Arc::new(TdJsonTransport::create().context("failed to create TDLib client")?);

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping");
                cancel.cancel();
            }
        }
    });

    let correlator = Arc::new(Correlator::new(transport, cfg.polling).with_cancellation(cancel));

    let prompt = TerminalPrompt::new();
    Authenticator::new(&correlator, &cfg, &prompt)
        .run()
        .await
        .context("authorization failed")?;

    let service = ChatService::connect(correlator, cfg.limits)
        .await
        .context("failed to fetch own user")?;

    match cfg.top_user {
        Some(user_id) => print_top_co_members(&service, UserId(user_id), cfg.top_limit).await,
        None => print_common_chat_counts(&service, &cfg).await,
    }
}

async fn print_top_co_members(
    service: &ChatService,
    user_id: UserId,
    limit: usize,
) -> anyhow::Result<()> {
    let top = service
        .top_co_members(user_id, limit)
        .await
        .ok_or_else(|| anyhow!("failed to get common groups with user {user_id}"))?;

    for entry in top {
        println!("{}\t{}", entry.user_id, entry.shared_groups);
    }
    Ok(())
}

async fn print_common_chat_counts(service: &ChatService, cfg: &Config) -> anyhow::Result<()> {
    let chat_id = pick_chat(service, cfg.target_chat.as_deref()).await?;
    info!(chat_id = %chat_id, "analyzing chat");

    let mut entries = service
        .common_chat_counts(chat_id)
        .await
        .ok_or_else(|| anyhow!("failed to get members of chat {chat_id}"))?;
    if cfg.rank_results {
        rank_by_count(&mut entries);
    }

    for entry in entries {
        match entry.name {
            Some(name) => println!("{}\t{}\t{}", entry.user_id, name, entry.common_group_count),
            None => println!("{}\t{}", entry.user_id, entry.common_group_count),
        }
    }
    Ok(())
}

/// The configured chat, or the first basic group in the chat list.
async fn pick_chat(service: &ChatService, target: Option<&str>) -> anyhow::Result<ChatId> {
    match target.map(ChatTarget::parse) {
        Some(ChatTarget::Id(id)) => Ok(ChatId(id)),
        Some(ChatTarget::Username(name)) => service
            .resolve_chat_by_name(&name)
            .await
            .ok_or_else(|| anyhow!("no public chat named @{name}")),
        None => {
            let chats = service
                .list_chats()
                .await
                .ok_or_else(|| anyhow!("failed to list chats"))?;
            chats
                .first()
                .map(|chat| {
                    info!(name = %chat.name, "no chat configured, using first basic group");
                    chat.id
                })
                .ok_or_else(|| anyhow!("no basic groups in the chat list; set TGM_CHAT"))
        }
    }
}
