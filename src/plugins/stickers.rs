//! Sticker ban commands.

use teloxide::prelude::*;
use tracing::info;

use super::{deny, reply_html, require_owner};
use crate::bot::{AppState, ThrottledBot};
use crate::i18n::{DEFAULT_LOCALE, get_text};

/// Handle /bansticker - ban the sticker in the replied message.
pub async fn bansticker_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
) -> anyhow::Result<()> {
    let Some(owner) = require_owner(&bot, &msg, &state).await? else {
        return Ok(());
    };

    let Some(sticker) = msg.reply_to_message().and_then(|r| r.sticker()) else {
        return reply_html(&bot, &msg, get_text(DEFAULT_LOCALE, "commands.error_reply_sticker")).await;
    };

    match state
        .engine
        .ban_sticker(msg.chat.id.0, owner, &sticker.file.unique_id)
    {
        Ok(true) => {
            info!("Sticker {} banned in chat {} by {}", sticker.file.unique_id, msg.chat.id, owner);
            reply_html(&bot, &msg, get_text(DEFAULT_LOCALE, "commands.sticker_banned")).await
        }
        Ok(false) => {
            reply_html(&bot, &msg, get_text(DEFAULT_LOCALE, "commands.sticker_already_banned")).await
        }
        Err(e) => deny(&bot, &msg, &e).await,
    }
}

/// Handle /bannedstickers - count banned stickers.
pub async fn bannedstickers_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
) -> anyhow::Result<()> {
    if require_owner(&bot, &msg, &state).await?.is_none() {
        return Ok(());
    }

    let count = state.engine.stickers().banned_count(msg.chat.id.0);
    let text = get_text(DEFAULT_LOCALE, "commands.banned_stickers").replace("{count}", &count.to_string());
    reply_html(&bot, &msg, text).await
}
