//! Per-chat memo of stickers already confirmed explicit.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

/// Append-only set of banned sticker ids per chat.
#[derive(Clone, Default)]
pub struct StickerBanCache {
    chats: Arc<DashMap<i64, HashSet<String>>>,
}

impl StickerBanCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_banned(&self, chat_id: i64, sticker_id: &str) -> bool {
        self.chats
            .get(&chat_id)
            .map(|set| set.contains(sticker_id))
            .unwrap_or(false)
    }

    /// Idempotent insert. Returns `true` if the sticker was not banned before.
    pub fn ban(&self, chat_id: i64, sticker_id: &str) -> bool {
        let inserted = self
            .chats
            .entry(chat_id)
            .or_default()
            .insert(sticker_id.to_string());
        if inserted {
            info!("Banned sticker {} in chat {}", sticker_id, chat_id);
        }
        inserted
    }

    pub fn banned_count(&self, chat_id: i64) -> usize {
        self.chats.get(&chat_id).map(|set| set.len()).unwrap_or(0)
    }
}

impl std::fmt::Debug for StickerBanCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StickerBanCache")
            .field("chats", &self.chats.len())
            .finish()
    }
}
