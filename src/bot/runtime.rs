//! Bot runtime - Polling and Webhook runners.

use std::net::SocketAddr;

use anyhow::Context;
use teloxide::prelude::*;
use teloxide::update_listeners::webhooks::{self, Options};
use tracing::info;
use url::Url;

use super::dispatcher::{BotDispatcher, ThrottledBot};
use crate::config::{BotMode, Config};

/// Run the bot with the configured mode.
pub async fn run(config: &Config, bot: ThrottledBot, dispatcher: BotDispatcher) -> anyhow::Result<()> {
    match config.bot_mode {
        BotMode::Polling => {
            info!("Starting bot in polling mode...");
            let mut dispatcher = dispatcher;
            dispatcher.dispatch().await;
            Ok(())
        }
        BotMode::Webhook => {
            info!("Starting bot in webhook mode...");
            run_webhook(config, bot, dispatcher).await
        }
    }
}

/// Run the bot behind teloxide's axum webhook listener.
///
/// The listener registers the webhook on startup and removes it on shutdown.
async fn run_webhook(
    config: &Config,
    bot: ThrottledBot,
    mut dispatcher: BotDispatcher,
) -> anyhow::Result<()> {
    let webhook_url = config
        .webhook_url
        .as_deref()
        .context("WEBHOOK_URL must be set when using webhook mode")?;
    let url = Url::parse(webhook_url).context("Invalid WEBHOOK_URL format")?;

    let address = SocketAddr::from(([0, 0, 0, 0], config.webhook_port));
    let mut options = Options::new(address, url.clone());
    if let Some(secret) = &config.webhook_secret {
        options = options.secret_token(secret.clone());
        info!("Webhook secret token configured");
    }

    info!("Setting webhook URL: {}", url);
    info!("Listening on: {}", address);

    // Webhook setup only needs plain API access, not the throttled adaptor.
    let listener = webhooks::axum(bot.inner().clone(), options)
        .await
        .context("Failed to set up webhook")?;

    let error_handler = LoggingErrorHandler::with_custom_text("Error from update listener");
    dispatcher
        .dispatch_with_listener(listener, error_handler)
        .await;
    Ok(())
}
