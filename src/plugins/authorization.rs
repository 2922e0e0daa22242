//! Authorized-user commands.
//!
//! Authorized users may post links. Only the chat owner manages the list.

use teloxide::prelude::*;
use teloxide::types::MessageEntityKind;
use tracing::info;

use super::{deny, reply_html, require_owner};
use crate::bot::{AppState, ThrottledBot};
use crate::i18n::{DEFAULT_LOCALE, get_text};
use crate::utils::html_escape;

/// Get the target user of a command.
///
/// Resolution order:
/// 1. Reply message → use `reply.from`
/// 2. Numeric user id argument
/// 3. TextMention entity
fn resolve_target(msg: &Message, args: &str) -> Option<(u64, String)> {
    if let Some(reply) = msg.reply_to_message()
        && let Some(user) = &reply.from
    {
        return Some((user.id.0, user.first_name.clone()));
    }

    if let Some(id) = parse_user_id(args) {
        return Some((id, format!("User {}", id)));
    }

    msg.entities()?.iter().find_map(|entity| match &entity.kind {
        MessageEntityKind::TextMention { user } => Some((user.id.0, user.first_name.clone())),
        _ => None,
    })
}

fn parse_user_id(args: &str) -> Option<u64> {
    args.split_whitespace().next()?.parse().ok()
}

fn mention(key: &str, id: u64, name: &str) -> String {
    get_text(DEFAULT_LOCALE, key)
        .replace("{id}", &id.to_string())
        .replace("{name}", &html_escape(name))
}

/// Handle /authorize - allow a user to post links.
pub async fn authorize_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    let Some(owner) = require_owner(&bot, &msg, &state).await? else {
        return Ok(());
    };

    let Some((target_id, target_name)) = resolve_target(&msg, &args) else {
        return reply_html(&bot, &msg, get_text(DEFAULT_LOCALE, "commands.error_user_not_found")).await;
    };

    match state.engine.authorize(msg.chat.id.0, owner, target_id) {
        Ok(true) => {
            info!("User {} authorized in chat {} by {}", target_id, msg.chat.id, owner);
            reply_html(&bot, &msg, mention("commands.authorized", target_id, &target_name)).await
        }
        Ok(false) => {
            reply_html(&bot, &msg, mention("commands.already_authorized", target_id, &target_name)).await
        }
        Err(e) => deny(&bot, &msg, &e).await,
    }
}

/// Handle /unauthorize - revoke link permission.
pub async fn unauthorize_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    let Some(owner) = require_owner(&bot, &msg, &state).await? else {
        return Ok(());
    };

    let Some((target_id, target_name)) = resolve_target(&msg, &args) else {
        return reply_html(&bot, &msg, get_text(DEFAULT_LOCALE, "commands.error_user_not_found")).await;
    };

    match state.engine.unauthorize(msg.chat.id.0, owner, target_id) {
        Ok(true) => {
            info!("User {} unauthorized in chat {} by {}", target_id, msg.chat.id, owner);
            reply_html(&bot, &msg, mention("commands.unauthorized", target_id, &target_name)).await
        }
        Ok(false) => {
            reply_html(&bot, &msg, mention("commands.not_authorized", target_id, &target_name)).await
        }
        Err(e) => deny(&bot, &msg, &e).await,
    }
}

/// Handle /authorized - list authorized users.
pub async fn authorized_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
) -> anyhow::Result<()> {
    if require_owner(&bot, &msg, &state).await?.is_none() {
        return Ok(());
    }

    let users = state.engine.authorization().authorized(msg.chat.id.0);
    if users.is_empty() {
        return reply_html(&bot, &msg, get_text(DEFAULT_LOCALE, "commands.authorized_empty")).await;
    }

    let list = users
        .iter()
        .map(|id| format!("• <a href=\"tg://user?id={0}\">{0}</a>", id))
        .collect::<Vec<_>>()
        .join("\n");
    let text = get_text(DEFAULT_LOCALE, "commands.authorized_list")
        .replace("{count}", &users.len().to_string())
        .replace("{list}", &list);

    reply_html(&bot, &msg, text).await
}
