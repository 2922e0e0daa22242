//! Group message moderation.
//!
//! Converts platform messages into the moderation model, asks the engine for
//! a verdict and applies it before any command handler sees the message.

use teloxide::prelude::*;
use teloxide::types::{MessageEntityKind, PhotoSize};
use tracing::debug;

use crate::bot::AppState;
use crate::moderation::{self as model, Attachment, AttachmentKind};

/// Moderate one message. Returns `false` when a verdict was applied and the
/// message must not reach any other handler.
///
/// Only group chats are moderated. Everything else passes.
pub async fn passes_moderation(msg: Message, state: AppState) -> bool {
    if !(msg.chat.is_group() || msg.chat.is_supergroup()) {
        return true;
    }
    let Some(incoming) = ingest(&msg) else {
        return true;
    };

    state.refresh_admins_if_stale(incoming.chat_id).await;

    let verdict = state.engine.evaluate(&incoming).await;
    if verdict.is_allow() {
        return true;
    }

    let report = state.executor.apply(&verdict, &incoming).await;
    debug!(
        "Applied {:?} to message {} in chat {}: deleted={} warned={} banned={} noticed={}",
        verdict.reason(),
        incoming.message_id,
        incoming.chat_id,
        report.deleted,
        report.warning.is_some(),
        report.banned,
        report.notice.is_some()
    );
    false
}

/// Build the moderation view of a platform message.
///
/// Returns `None` for messages without a user sender, such as channel posts.
pub fn ingest(msg: &Message) -> Option<model::Message> {
    let user = msg.from.as_ref()?;

    let mut incoming = model::Message::new(msg.chat.id.0, msg.id.0, user.id.0);
    incoming = match &user.username {
        Some(username) => incoming.sender_handle(format!("@{}", username)),
        None => incoming.sender_handle(user.first_name.clone()),
    };

    if let Some(text) = msg.text().or(msg.caption()) {
        incoming = incoming.text(text);
    }

    let entities = msg
        .parse_entities()
        .or_else(|| msg.parse_caption_entities())
        .unwrap_or_default();
    for entity in &entities {
        match entity.kind() {
            MessageEntityKind::Url => incoming = incoming.url_span(entity.text()),
            MessageEntityKind::TextLink { url } => incoming = incoming.url_span(url.as_str()),
            _ => {}
        }
    }

    if let Some(attachment) = extract_attachment(msg) {
        incoming = incoming.attachment(attachment);
    }

    Some(incoming)
}

fn largest(photos: &[PhotoSize]) -> Option<&PhotoSize> {
    photos.iter().max_by_key(|p| p.width * p.height)
}

/// Pick the attachment to scan. Photos take the largest size.
fn extract_attachment(msg: &Message) -> Option<Attachment> {
    if let Some(photo) = msg.photo() {
        return largest(photo).map(|p| Attachment::photo(p.file.id.clone()));
    }

    if let Some(sticker) = msg.sticker() {
        let mut attachment = Attachment::sticker(sticker.file.id.clone(), sticker.file.unique_id.clone());
        if sticker.is_animated() {
            attachment = attachment.animated_vector(true);
        } else if sticker.is_video() {
            attachment = attachment.mime_type("video/webm");
        } else {
            attachment = attachment.mime_type("image/webp");
        }
        if let Some(thumb) = &sticker.thumbnail {
            attachment = attachment.thumbnail(thumb.file.id.clone());
        }
        return Some(attachment);
    }

    if let Some(video) = msg.video() {
        let mut attachment = Attachment::new(AttachmentKind::Video, video.file.id.clone());
        if let Some(mime) = &video.mime_type {
            attachment = attachment.mime_type(mime.to_string());
        }
        if let Some(thumb) = &video.thumbnail {
            attachment = attachment.thumbnail(thumb.file.id.clone());
        }
        return Some(attachment);
    }

    if let Some(animation) = msg.animation() {
        let mut attachment = Attachment::new(AttachmentKind::Animation, animation.file.id.clone());
        if let Some(thumb) = &animation.thumbnail {
            attachment = attachment.thumbnail(thumb.file.id.clone());
        }
        return Some(attachment);
    }

    if let Some(document) = msg.document() {
        let mut attachment = Attachment::new(AttachmentKind::Document, document.file.id.clone());
        if let Some(mime) = &document.mime_type {
            attachment = attachment.mime_type(mime.to_string());
        }
        if let Some(thumb) = &document.thumbnail {
            attachment = attachment.thumbnail(thumb.file.id.clone());
        }
        return Some(attachment);
    }

    None
}
