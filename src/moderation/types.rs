//! Data model shared by every moderation component.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const REASON_BANNED_STICKER: &str = "banned sticker";
pub const REASON_UNAUTHORIZED_LINK: &str = "unauthorized link";
pub const REASON_EXPLICIT_MEDIA: &str = "explicit media";

/// Kind of media attached to a message, resolved once at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Photo,
    Document,
    Video,
    Animation,
    Sticker,
}

impl AttachmentKind {
    /// Kinds that carry more than one frame and are sampled.
    pub fn is_multi_frame(self) -> bool {
        matches!(self, Self::Video | Self::Animation)
    }
}

impl fmt::Display for AttachmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Photo => "photo",
            Self::Document => "document",
            Self::Video => "video",
            Self::Animation => "animation",
            Self::Sticker => "sticker",
        };
        f.write_str(name)
    }
}

/// Reference to a message's attachment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub kind: AttachmentKind,

    /// Platform file reference handed to the media fetcher.
    pub file_id: String,

    pub mime_type: Option<String>,

    /// Stable sticker identity. Present only for stickers.
    pub sticker_id: Option<String>,

    /// Vector/animated stickers that cannot be rasterized.
    pub is_animated_vector: bool,

    /// Still preview of multi-frame media, when the platform provides one.
    pub thumbnail_file_id: Option<String>,
}

impl Attachment {
    pub fn new(kind: AttachmentKind, file_id: impl Into<String>) -> Self {
        Self {
            kind,
            file_id: file_id.into(),
            mime_type: None,
            sticker_id: None,
            is_animated_vector: false,
            thumbnail_file_id: None,
        }
    }

    pub fn photo(file_id: impl Into<String>) -> Self {
        Self::new(AttachmentKind::Photo, file_id)
    }

    pub fn sticker(file_id: impl Into<String>, sticker_id: impl Into<String>) -> Self {
        Self {
            sticker_id: Some(sticker_id.into()),
            ..Self::new(AttachmentKind::Sticker, file_id)
        }
    }

    #[must_use]
    pub fn mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    #[must_use]
    pub fn animated_vector(mut self, vector: bool) -> Self {
        self.is_animated_vector = vector;
        self
    }

    #[must_use]
    pub fn thumbnail(mut self, file_id: impl Into<String>) -> Self {
        self.thumbnail_file_id = Some(file_id.into());
        self
    }

    /// Whether a classifier can look at this attachment at all.
    ///
    /// Documents are only scanned when they declare an image or video MIME type.
    pub fn is_rasterizable(&self) -> bool {
        if self.is_animated_vector {
            return false;
        }
        match self.kind {
            AttachmentKind::Document => self
                .mime_type
                .as_deref()
                .map(|m| m.starts_with("image/") || m.starts_with("video/"))
                .unwrap_or(false),
            _ => true,
        }
    }

    /// Whether the attachment should be sampled as a frame sequence.
    pub fn is_multi_frame(&self) -> bool {
        if self.kind.is_multi_frame() {
            return true;
        }
        match self.kind {
            AttachmentKind::Document => self
                .mime_type
                .as_deref()
                .map(|m| m.starts_with("video/") || m == "image/gif")
                .unwrap_or(false),
            AttachmentKind::Sticker => self
                .mime_type
                .as_deref()
                .map(|m| m.starts_with("video/"))
                .unwrap_or(false),
            _ => false,
        }
    }
}

/// Inbound message, immutable for the duration of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub chat_id: i64,
    pub message_id: i32,
    pub sender_id: u64,
    pub sender_handle: Option<String>,

    /// Body or caption.
    pub text: Option<String>,

    /// Substrings the platform flagged as URLs, in message order.
    pub url_spans: Vec<String>,

    pub attachment: Option<Attachment>,
}

impl Message {
    pub fn new(chat_id: i64, message_id: i32, sender_id: u64) -> Self {
        Self {
            chat_id,
            message_id,
            sender_id,
            sender_handle: None,
            text: None,
            url_spans: Vec::new(),
            attachment: None,
        }
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn sender_handle(mut self, handle: impl Into<String>) -> Self {
        self.sender_handle = Some(handle.into());
        self
    }

    #[must_use]
    pub fn url_span(mut self, span: impl Into<String>) -> Self {
        self.url_spans.push(span.into());
        self
    }

    #[must_use]
    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    /// Name used in in-chat notices. Falls back to the numeric id.
    pub fn display_name(&self) -> String {
        self.sender_handle
            .clone()
            .unwrap_or_else(|| format!("User {}", self.sender_id))
    }

    pub fn sticker_id(&self) -> Option<&str> {
        self.attachment
            .as_ref()
            .filter(|a| a.kind == AttachmentKind::Sticker)
            .and_then(|a| a.sticker_id.as_deref())
    }
}

/// Keyword categories. Each keyword in the policy maps to one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationCategory {
    Promotional,
    Contraband,
    Weapons,
    Explicit,
}

impl fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Promotional => "promotional",
            Self::Contraband => "contraband",
            Self::Weapons => "weapons",
            Self::Explicit => "explicit",
        };
        f.write_str(name)
    }
}

/// The engine's single decision for a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    DeleteOnly {
        reason: String,
    },
    DeleteAndWarn {
        reason: String,
        warning_text: String,
    },
    DeleteAndBan {
        reason: String,
        ban_duration: Duration,
    },
}

impl Verdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Allow => None,
            Self::DeleteOnly { reason }
            | Self::DeleteAndWarn { reason, .. }
            | Self::DeleteAndBan { reason, .. } => Some(reason),
        }
    }
}

/// A sent message that can later be deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    pub chat_id: i64,
    pub message_id: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_need_media_mime() {
        let pdf = Attachment::new(AttachmentKind::Document, "f").mime_type("application/pdf");
        let png = Attachment::new(AttachmentKind::Document, "f").mime_type("image/png");
        let bare = Attachment::new(AttachmentKind::Document, "f");

        assert!(!pdf.is_rasterizable());
        assert!(png.is_rasterizable());
        assert!(!bare.is_rasterizable());
    }

    #[test]
    fn vector_stickers_are_not_rasterizable() {
        let tgs = Attachment::sticker("f", "S1").animated_vector(true);
        assert!(!tgs.is_rasterizable());
        assert!(Attachment::sticker("f", "S2").is_rasterizable());
    }

    #[test]
    fn multi_frame_detection() {
        assert!(Attachment::new(AttachmentKind::Video, "f").is_multi_frame());
        assert!(Attachment::new(AttachmentKind::Animation, "f").is_multi_frame());
        assert!(!Attachment::photo("f").is_multi_frame());
        assert!(
            Attachment::sticker("f", "S")
                .mime_type("video/webm")
                .is_multi_frame()
        );
        assert!(
            Attachment::new(AttachmentKind::Document, "f")
                .mime_type("image/gif")
                .is_multi_frame()
        );
    }

    #[test]
    fn sticker_id_only_for_stickers() {
        let msg = Message::new(1, 1, 1).attachment(Attachment::sticker("f", "S1"));
        assert_eq!(msg.sticker_id(), Some("S1"));

        let mut photo = Attachment::photo("f");
        photo.sticker_id = Some("bogus".into());
        let msg = Message::new(1, 1, 1).attachment(photo);
        assert_eq!(msg.sticker_id(), None);
    }

    #[test]
    fn display_name_falls_back_to_id() {
        assert_eq!(Message::new(1, 1, 42).display_name(), "User 42");
        assert_eq!(
            Message::new(1, 1, 42).sender_handle("alice").display_name(),
            "alice"
        );
    }

    #[test]
    fn verdict_reason() {
        assert_eq!(Verdict::Allow.reason(), None);
        let v = Verdict::DeleteOnly {
            reason: "x".into(),
        };
        assert_eq!(v.reason(), Some("x"));
    }
}
