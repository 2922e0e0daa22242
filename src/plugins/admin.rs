//! Admin list and policy commands.

use teloxide::prelude::*;

use super::{reply_html, require_owner};
use crate::bot::{AppState, ThrottledBot};
use crate::config::ModerationPolicy;
use crate::i18n::{DEFAULT_LOCALE, get_text};
use crate::utils::{format_duration_full, html_escape};

/// Handle /refreshadmins - reload the admin list now.
///
/// Open to any current admin so a newly promoted owner is not locked out by
/// a stale list.
pub async fn refreshadmins_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
) -> anyhow::Result<()> {
    let Some(caller) = msg.from.as_ref().map(|u| u.id.0) else {
        return Ok(());
    };
    if !msg.chat.is_group() && !msg.chat.is_supergroup() {
        return reply_html(&bot, &msg, get_text(DEFAULT_LOCALE, "commands.error_group_only")).await;
    }

    let chat_id = msg.chat.id.0;
    let admins = match state.load_admins(chat_id).await {
        Ok(admins) => admins,
        Err(e) => {
            let text = get_text(DEFAULT_LOCALE, "commands.admins_refresh_failed")
                .replace("{error}", &html_escape(&e.to_string()));
            return reply_html(&bot, &msg, text).await;
        }
    };

    if caller != admins.owner_id && !admins.admin_ids.contains(&caller) {
        return reply_html(&bot, &msg, get_text(DEFAULT_LOCALE, "commands.error_owner_only")).await;
    }

    let count = state.store_admins(chat_id, admins);
    let text = get_text(DEFAULT_LOCALE, "commands.admins_refreshed").replace("{count}", &count.to_string());
    reply_html(&bot, &msg, text).await
}

/// Handle /policy - show the active moderation policy.
pub async fn policy_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
) -> anyhow::Result<()> {
    if require_owner(&bot, &msg, &state).await?.is_none() {
        return Ok(());
    }
    reply_html(&bot, &msg, render_policy(&state.policy)).await
}

fn render_policy(policy: &ModerationPolicy) -> String {
    let or_none = |items: Vec<String>| {
        if items.is_empty() {
            "none".to_string()
        } else {
            html_escape(&items.join(", "))
        }
    };

    get_text(DEFAULT_LOCALE, "commands.policy")
        .replace("{threshold}", &format!("{:.2}", policy.nsfw_threshold))
        .replace("{labels}", &or_none(policy.nsfw_labels.clone()))
        .replace("{ban}", &format_duration_full(policy.ban_duration_secs))
        .replace("{ttl}", &format_duration_full(policy.warning_ttl_secs))
        .replace("{frames}", &policy.max_frames.to_string())
        .replace("{whitelist}", &or_none(policy.link_whitelist.clone()))
        .replace("{keywords}", &policy.keywords.len().to_string())
        .replace("{scan_admins}", if policy.scan_admin_media { "yes" } else { "no" })
}
