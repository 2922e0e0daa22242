//! Plugin system for command handlers.
//!
//! Add new plugins by:
//! 1. Creating a new file in this directory
//! 2. Adding `pub mod your_plugin;` below
//! 3. Adding the handler to `command_handler()`

pub mod admin;
pub mod authorization;
pub mod start;
pub mod stickers;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::{ParseMode, ReplyParameters};
use teloxide::utils::command::BotCommands;

use crate::bot::{AppState, ThrottledBot};
use crate::error::CommandError;
use crate::i18n::{DEFAULT_LOCALE, get_text};

/// All bot commands.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,

    #[command(description = "Show help")]
    Help,

    // Owner commands
    #[command(description = "Allow a user to post links")]
    Authorize(String),

    #[command(description = "Revoke link permission")]
    Unauthorize(String),

    #[command(description = "List authorized users")]
    Authorized,

    #[command(description = "Ban the replied sticker")]
    Bansticker,

    #[command(description = "Count banned stickers")]
    Bannedstickers,

    #[command(description = "Reload the admin list")]
    Refreshadmins,

    #[command(description = "Show the moderation policy")]
    Policy,
}

/// Build the combined command handler.
pub fn command_handler() -> UpdateHandler<anyhow::Error> {
    use dptree::case;

    teloxide::filter_command::<Command, _>()
        .branch(case![Command::Start].endpoint(start::start_command))
        .branch(case![Command::Help].endpoint(start::help_command))
        // Authorization
        .branch(case![Command::Authorize(args)].endpoint(authorization::authorize_command))
        .branch(case![Command::Unauthorize(args)].endpoint(authorization::unauthorize_command))
        .branch(case![Command::Authorized].endpoint(authorization::authorized_command))
        // Stickers
        .branch(case![Command::Bansticker].endpoint(stickers::bansticker_command))
        .branch(case![Command::Bannedstickers].endpoint(stickers::bannedstickers_command))
        // Admin
        .branch(case![Command::Refreshadmins].endpoint(admin::refreshadmins_command))
        .branch(case![Command::Policy].endpoint(admin::policy_command))
}

/// Reply to `msg` with HTML text.
pub(crate) async fn reply_html(
    bot: &ThrottledBot,
    msg: &Message,
    text: impl Into<String>,
) -> anyhow::Result<()> {
    bot.send_message(msg.chat.id, text.into())
        .parse_mode(ParseMode::Html)
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?;
    Ok(())
}

/// Resolve the calling owner of a group command.
///
/// Loads the admin list first if it is stale, then rejects anyone who is not
/// the chat owner. Returns `None` once the caller has been told why.
pub(crate) async fn require_owner(
    bot: &ThrottledBot,
    msg: &Message,
    state: &AppState,
) -> anyhow::Result<Option<u64>> {
    let Some(caller) = msg.from.as_ref().map(|u| u.id.0) else {
        return Ok(None);
    };

    if !msg.chat.is_group() && !msg.chat.is_supergroup() {
        reply_html(bot, msg, get_text(DEFAULT_LOCALE, "commands.error_group_only")).await?;
        return Ok(None);
    }

    state.refresh_admins_if_stale(msg.chat.id.0).await;

    match state.engine.require_owner(msg.chat.id.0, caller) {
        Ok(()) => Ok(Some(caller)),
        Err(e) => {
            deny(bot, msg, &e).await?;
            Ok(None)
        }
    }
}

/// Tell the caller why a command was refused.
pub(crate) async fn deny(bot: &ThrottledBot, msg: &Message, error: &CommandError) -> anyhow::Result<()> {
    reply_html(bot, msg, get_text(DEFAULT_LOCALE, denial_key(error))).await
}

fn denial_key(error: &CommandError) -> &'static str {
    match error {
        CommandError::Unauthorized => "commands.error_owner_only",
        CommandError::UnknownChat(_) => "commands.error_unknown_chat",
    }
}
