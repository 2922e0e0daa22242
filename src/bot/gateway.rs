//! Telegram implementation of the moderation seams.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use teloxide::ApiError;
use teloxide::RequestError;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{ChatMemberKind, MessageId, ParseMode};
use tracing::{debug, warn};

use super::dispatcher::ThrottledBot;
use super::frames::FrameExtractor;
use super::scheduler::DeletionScheduler;
use crate::error::{FetchError, GatewayError};
use crate::moderation::{
    AdminList, Attachment, ChatGateway, MediaContent, MediaFetcher, MessageHandle,
};

fn gateway_error(e: RequestError) -> GatewayError {
    match e {
        RequestError::Api(ApiError::MessageToDeleteNotFound | ApiError::ChatNotFound) => {
            GatewayError::NotFound
        }
        other => GatewayError::Request(other.to_string()),
    }
}

/// Chat platform gateway over the throttled bot.
#[derive(Clone)]
pub struct TelegramGateway {
    bot: ThrottledBot,
    scheduler: DeletionScheduler,
}

impl TelegramGateway {
    /// Create the gateway and spawn its deletion scheduler.
    pub fn new(bot: ThrottledBot) -> Self {
        let deleter = bot.clone();
        let scheduler = DeletionScheduler::spawn(move |handle: MessageHandle| {
            let bot = deleter.clone();
            async move {
                bot.delete_message(ChatId(handle.chat_id), MessageId(handle.message_id))
                    .await
                    .map(|_| ())
                    .map_err(gateway_error)
            }
        });

        Self { bot, scheduler }
    }
}

#[async_trait]
impl ChatGateway for TelegramGateway {
    async fn admin_list(&self, chat_id: i64) -> Result<AdminList, GatewayError> {
        let members = self
            .bot
            .get_chat_administrators(ChatId(chat_id))
            .await
            .map_err(gateway_error)?;

        let mut owner_id = None;
        let mut admin_ids = Vec::with_capacity(members.len());
        for member in &members {
            match &member.kind {
                ChatMemberKind::Owner(_) => owner_id = Some(member.user.id.0),
                ChatMemberKind::Administrator(_) => admin_ids.push(member.user.id.0),
                _ => {}
            }
        }

        let owner_id = owner_id.ok_or_else(|| {
            GatewayError::Request(format!("no owner listed for chat {}", chat_id))
        })?;

        debug!(
            "Loaded {} admins for chat {} (owner {})",
            admin_ids.len(),
            chat_id,
            owner_id
        );
        Ok(AdminList {
            owner_id,
            admin_ids,
        })
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), GatewayError> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await
            .map(|_| ())
            .map_err(gateway_error)
    }

    async fn ban_user(
        &self,
        chat_id: i64,
        user_id: u64,
        until: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        self.bot
            .ban_chat_member(ChatId(chat_id), UserId(user_id))
            .until_date(until)
            .await
            .map(|_| ())
            .map_err(gateway_error)
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<MessageHandle, GatewayError> {
        let sent = self
            .bot
            .send_message(ChatId(chat_id), text)
            .parse_mode(ParseMode::Html)
            .await
            .map_err(gateway_error)?;

        Ok(MessageHandle {
            chat_id: sent.chat.id.0,
            message_id: sent.id.0,
        })
    }

    fn schedule_delete(&self, handle: MessageHandle, delay: Duration) {
        self.scheduler.schedule(handle, delay);
    }
}

/// Downloads attachments through the Bot API file endpoint.
///
/// Multi-frame media is decoded into stills with ffmpeg. When decoding fails
/// the platform thumbnail stands in as a single frame.
pub struct TelegramMediaFetcher {
    bot: Bot,
    frames: FrameExtractor,
}

impl TelegramMediaFetcher {
    pub fn new(bot: Bot, frames: FrameExtractor) -> Self {
        Self { bot, frames }
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, FetchError> {
        let file = self.bot.get_file(file_id.to_string()).await.map_err(|e| match e {
            RequestError::Api(ApiError::WrongFileId) => FetchError::Expired,
            other => FetchError::Transport(other.to_string()),
        })?;

        let mut buf = Vec::new();
        self.bot
            .download_file(&file.path, &mut buf)
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        if buf.is_empty() {
            return Err(FetchError::NotFound);
        }
        Ok(buf)
    }

    async fn decode(&self, attachment: &Attachment) -> Result<Vec<Vec<u8>>, FetchError> {
        let media = self.download(&attachment.file_id).await?;
        self.frames.extract(&media).await
    }
}

#[async_trait]
impl MediaFetcher for TelegramMediaFetcher {
    async fn resolve(&self, attachment: &Attachment) -> Result<MediaContent, FetchError> {
        if !attachment.is_multi_frame() {
            let bytes = self.download(&attachment.file_id).await?;
            return Ok(MediaContent::Still(bytes));
        }

        match self.decode(attachment).await {
            Ok(frames) => Ok(MediaContent::Frames(frames)),
            Err(e) => {
                let Some(thumb) = attachment.thumbnail_file_id.as_deref() else {
                    return Err(e);
                };
                warn!(
                    "Decoding {} {} failed, using its thumbnail: {}",
                    attachment.kind, attachment.file_id, e
                );
                let frame = self.download(thumb).await?;
                Ok(MediaContent::Frames(vec![frame]))
            }
        }
    }
}
