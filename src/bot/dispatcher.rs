//! Message dispatcher setup.
//!
//! Builds the dispatcher with the command handlers and the moderation pass.

use std::sync::Arc;

use teloxide::adaptors::Throttle;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{debug, info, warn};

use crate::cache::{CacheConfig, TypedCache};
use crate::config::ModerationPolicy;
use crate::error::GatewayError;
use crate::events;
use crate::moderation::{ActionExecutor, AdminList, ChatGateway, ModerationEngine};
use crate::plugins;

/// Bot type with Throttle adaptor for automatic rate limiting.
pub type ThrottledBot = Throttle<Bot>;

/// Dispatcher type used by the runtime.
pub type BotDispatcher = Dispatcher<ThrottledBot, anyhow::Error, ()>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Moderation pipeline and per-chat security state.
    pub engine: Arc<ModerationEngine>,

    gateway: Arc<dyn ChatGateway>,

    /// Applies verdicts through the gateway.
    pub executor: Arc<ActionExecutor<dyn ChatGateway>>,

    /// Chats whose admin list was loaded recently.
    admin_freshness: TypedCache<i64, ()>,

    pub policy: Arc<ModerationPolicy>,
}

impl AppState {
    pub fn new(
        engine: Arc<ModerationEngine>,
        gateway: Arc<dyn ChatGateway>,
        policy: Arc<ModerationPolicy>,
    ) -> Self {
        let executor = Arc::new(ActionExecutor::new(gateway.clone(), policy.warning_ttl()));
        let admin_freshness = TypedCache::new(
            "admin_freshness",
            CacheConfig::with_capacity(10_000).ttl(policy.admin_refresh_ttl()),
        );

        Self {
            engine,
            gateway,
            executor,
            admin_freshness,
            policy,
        }
    }

    /// Fetch the admin list of a chat without storing it.
    ///
    /// A failed load drops the freshness mark so the next message retries.
    pub async fn load_admins(&self, chat_id: i64) -> Result<AdminList, GatewayError> {
        let result = self.gateway.admin_list(chat_id).await;
        if result.is_err() {
            self.admin_freshness.invalidate(&chat_id);
        }
        result
    }

    /// Store a fetched admin list. Returns the number of admins.
    pub fn store_admins(&self, chat_id: i64, admins: AdminList) -> usize {
        let count = admins.admin_ids.len();
        self.engine.refresh_admins(chat_id, admins);
        self.admin_freshness.insert(chat_id, ());
        info!("Refreshed {} admins for chat {}", count, chat_id);
        count
    }

    /// Reload the admin list of a chat from the platform.
    pub async fn refresh_admins(&self, chat_id: i64) -> Result<usize, GatewayError> {
        let admins = self.load_admins(chat_id).await?;
        Ok(self.store_admins(chat_id, admins))
    }

    /// Reload the admin list only if the cached one has expired.
    pub async fn refresh_admins_if_stale(&self, chat_id: i64) {
        if self.admin_freshness.contains(&chat_id) {
            return;
        }
        debug!("{} miss for chat {}", self.admin_freshness.name(), chat_id);
        if let Err(e) = self.refresh_admins(chat_id).await {
            // Keep the previous state; an unknown chat stays fail-closed.
            warn!("Admin refresh failed for chat {}: {}", chat_id, e);
        }
    }
}

/// Build the dispatcher with all handlers.
///
/// Updates are processed fully concurrently: a slow classifier call for one
/// message never holds back the rest of the chat.
pub fn build_dispatcher(bot: ThrottledBot, state: AppState) -> BotDispatcher {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .distribution_function(|_| None::<()>)
        .enable_ctrlc_handler()
        .build()
}

/// Build the handler schema.
///
/// Moderation runs first, so a command carrying a violation is handled like
/// any other message.
fn schema() -> UpdateHandler<anyhow::Error> {
    dptree::entry().branch(events::moderated(plugins::command_handler()))
}
