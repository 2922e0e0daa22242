//! Applies verdicts through the chat platform.
//!
//! Platform calls are independent: a failed delete does not stop the ban,
//! and no failure is raised to the caller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::GatewayError;
use crate::i18n::{DEFAULT_LOCALE, get_text};
use crate::utils::{format_duration_full, html_escape};

use super::types::{Message, MessageHandle, Verdict};

/// Owner and admins of a chat as reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminList {
    pub owner_id: u64,
    pub admin_ids: Vec<u64>,
}

/// Chat platform operations the moderation core depends on.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn admin_list(&self, chat_id: i64) -> Result<AdminList, GatewayError>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), GatewayError>;

    async fn ban_user(
        &self,
        chat_id: i64,
        user_id: u64,
        until: DateTime<Utc>,
    ) -> Result<(), GatewayError>;

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<MessageHandle, GatewayError>;

    /// Ask the platform's scheduler to delete a message after `delay`.
    ///
    /// Fire-and-forget. The deletion must tolerate the message being gone.
    fn schedule_delete(&self, handle: MessageHandle, delay: Duration);
}

/// What actually happened while applying a verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub deleted: bool,
    pub warning: Option<MessageHandle>,
    pub banned: bool,
    pub notice: Option<MessageHandle>,
}

pub struct ActionExecutor<G: ?Sized> {
    gateway: Arc<G>,
    warning_ttl: Duration,
}

impl<G: ChatGateway + ?Sized> ActionExecutor<G> {
    pub fn new(gateway: Arc<G>, warning_ttl: Duration) -> Self {
        Self {
            gateway,
            warning_ttl,
        }
    }

    pub async fn apply(&self, verdict: &Verdict, message: &Message) -> ApplyReport {
        let mut report = ApplyReport::default();

        match verdict {
            Verdict::Allow => {}

            Verdict::DeleteOnly { reason } => {
                report.deleted = self.delete(message).await;
                info!(
                    "Deleted message {} from user {} in chat {}: {}",
                    message.message_id, message.sender_id, message.chat_id, reason
                );
            }

            Verdict::DeleteAndWarn {
                reason,
                warning_text,
            } => {
                let (deleted, warning) =
                    futures::join!(self.delete(message), self.send(message.chat_id, warning_text));
                report.deleted = deleted;

                if let Some(handle) = warning {
                    self.gateway.schedule_delete(handle, self.warning_ttl);
                    report.warning = Some(handle);
                }

                info!(
                    "Warned user {} in chat {}: {}",
                    message.sender_id, message.chat_id, reason
                );
            }

            Verdict::DeleteAndBan {
                reason,
                ban_duration,
            } => {
                let (deleted, banned) =
                    futures::join!(self.delete(message), self.ban(message, *ban_duration));
                report.deleted = deleted;
                report.banned = banned;

                // The notice only claims a ban the platform accepted.
                let key = if banned {
                    "moderation.ban_notice"
                } else {
                    "moderation.removed_notice"
                };
                let notice = get_text(DEFAULT_LOCALE, key)
                    .replace("{id}", &message.sender_id.to_string())
                    .replace("{name}", &html_escape(&message.display_name()))
                    .replace("{reason}", &html_escape(reason))
                    .replace("{duration}", &format_duration_full(ban_duration.as_secs()));
                report.notice = self.send(message.chat_id, &notice).await;

                if banned {
                    info!(
                        "Banned user {} in chat {} for {:?}: {}",
                        message.sender_id, message.chat_id, ban_duration, reason
                    );
                } else {
                    info!(
                        "Removed message from user {} in chat {} without a ban: {}",
                        message.sender_id, message.chat_id, reason
                    );
                }
            }
        }

        report
    }

    async fn delete(&self, message: &Message) -> bool {
        match self
            .gateway
            .delete_message(message.chat_id, message.message_id)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "delete_message failed for message {} in chat {}: {}",
                    message.message_id, message.chat_id, e
                );
                false
            }
        }
    }

    async fn ban(&self, message: &Message, duration: Duration) -> bool {
        let until = match chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| Utc::now().checked_add_signed(d))
        {
            Some(until) => until,
            None => {
                warn!(
                    "Ban duration {:?} out of range for user {} in chat {}",
                    duration, message.sender_id, message.chat_id
                );
                return false;
            }
        };

        match self
            .gateway
            .ban_user(message.chat_id, message.sender_id, until)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    "ban_user failed for user {} in chat {}: {}",
                    message.sender_id, message.chat_id, e
                );
                false
            }
        }
    }

    async fn send(&self, chat_id: i64, text: &str) -> Option<MessageHandle> {
        match self.gateway.send_message(chat_id, text).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                warn!("send_message failed in chat {}: {}", chat_id, e);
                None
            }
        }
    }
}
