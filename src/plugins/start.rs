//! /start and /help.

use teloxide::prelude::*;

use super::reply_html;
use crate::bot::ThrottledBot;
use crate::i18n::{DEFAULT_LOCALE, get_text};

pub async fn start_command(bot: ThrottledBot, msg: Message) -> anyhow::Result<()> {
    reply_html(&bot, &msg, get_text(DEFAULT_LOCALE, "start.text")).await
}

pub async fn help_command(bot: ThrottledBot, msg: Message) -> anyhow::Result<()> {
    reply_html(&bot, &msg, get_text(DEFAULT_LOCALE, "help.text")).await
}
