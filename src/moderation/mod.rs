//! Moderation core.
//!
//! One inbound message flows through the pipeline like this:
//!
//! ```text
//! Message → ModerationEngine::evaluate → Verdict → ActionExecutor::apply
//! ```
//!
//! - `authorization` - Per-chat owner/admin/authorized state
//! - `stickers` - Memo of stickers already confirmed explicit
//! - `text_rules` - Keyword and link checks
//! - `classifier` - NSFW gate over the content classifier
//! - `engine` - Rule ordering and owner commands
//! - `executor` - Platform actions for a verdict

pub mod authorization;
pub mod classifier;
pub mod engine;
pub mod executor;
pub mod media;
pub mod stickers;
pub mod text_rules;
pub mod types;

pub use classifier::HttpClassifier;
pub use engine::ModerationEngine;
pub use executor::{ActionExecutor, AdminList, ChatGateway};
pub use media::{MediaContent, MediaFetcher};
pub use types::{Attachment, AttachmentKind, Message, MessageHandle, ViolationCategory};
