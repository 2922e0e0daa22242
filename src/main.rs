//! Aegis - Telegram group moderation bot
//!
//! Deletes explicit media, banned keywords and unauthorized links.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration and moderation policy
//! - `moderation` - Platform-independent decision pipeline
//! - `cache` - TTL caches with Moka
//! - `bot` - Teloxide adapter (with Throttle for API rate limiting)
//! - `plugins` - Owner command handlers
//! - `events` - Message moderation handler
//! - `i18n` - User-visible strings
//! - `utils` - Utility functions

mod bot;
mod cache;
mod config;
mod error;
mod events;
mod i18n;
mod moderation;
mod plugins;
mod utils;

use std::sync::Arc;

use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bot::{AppState, FrameExtractor, TelegramGateway, TelegramMediaFetcher};
use config::Config;
use moderation::{HttpClassifier, ModerationEngine};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("aegis=info,teloxide=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Aegis bot...");
    i18n::init();

    let config = Config::from_env()?;
    info!("Configuration loaded successfully");
    info!("Bot mode: {:?}", config.bot_mode);
    info!(
        "NSFW threshold {} over {} labels, {} keywords, {} whitelisted hosts",
        config.policy.nsfw_threshold,
        config.policy.nsfw_labels.len(),
        config.policy.keywords.len(),
        config.policy.link_whitelist.len()
    );

    // Throttle respects Telegram's per-chat and global rate limits.
    let bot = Bot::new(&config.bot_token).throttle(Limits::default());
    let me = bot.get_me().await?;
    info!("Bot username: @{}", me.username());

    let classifier = Arc::new(HttpClassifier::new(config.classifier_url.clone()));
    info!("Classifier endpoint: {}", config.classifier_url);
    let fetcher = Arc::new(TelegramMediaFetcher::new(
        bot.inner().clone(),
        FrameExtractor::new(&config.ffmpeg_path),
    ));
    let engine = Arc::new(ModerationEngine::new(&config.policy, classifier, fetcher));
    let gateway = Arc::new(TelegramGateway::new(bot.clone()));

    let state = AppState::new(engine, gateway, Arc::new(config.policy.clone()));
    let dispatcher = bot::build_dispatcher(bot.clone(), state);

    bot::run(&config, bot, dispatcher).await
}
