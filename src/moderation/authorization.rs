//! Per-chat authorization state.
//!
//! Tracks the chat owner, the admin list from the last refresh, and the users
//! explicitly allowed to post links. Each chat has its own lock, so a refresh
//! in one chat never blocks readers in another.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::debug;

/// How a user relates to a chat's moderation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Privilege {
    None,
    Authorized,
    Admin,
    Owner,
}

impl Privilege {
    pub fn is_privileged(self) -> bool {
        self != Self::None
    }
}

/// Security state of one chat.
#[derive(Debug, Clone, Default)]
pub struct ChatSecurityState {
    pub owner_id: Option<u64>,
    pub admin_ids: HashSet<u64>,
    pub authorized_ids: HashSet<u64>,

    /// Time of the last admin refresh. `None` until the first one.
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl ChatSecurityState {
    /// A chat that has never been refreshed has no privileged users, even if
    /// users were authorized before the first refresh.
    fn privilege(&self, user_id: u64) -> Privilege {
        if self.refreshed_at.is_none() {
            Privilege::None
        } else if self.owner_id == Some(user_id) {
            Privilege::Owner
        } else if self.admin_ids.contains(&user_id) {
            Privilege::Admin
        } else if self.authorized_ids.contains(&user_id) {
            Privilege::Authorized
        } else {
            Privilege::None
        }
    }
}

/// Store of [`ChatSecurityState`] keyed by chat id.
#[derive(Clone, Default)]
pub struct AuthorizationStore {
    chats: Arc<DashMap<i64, Arc<RwLock<ChatSecurityState>>>>,
}

impl AuthorizationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the chat's state, creating an empty one on first reference.
    fn chat(&self, chat_id: i64) -> Arc<RwLock<ChatSecurityState>> {
        self.chats.entry(chat_id).or_default().clone()
    }

    fn existing(&self, chat_id: i64) -> Option<Arc<RwLock<ChatSecurityState>>> {
        self.chats.get(&chat_id).map(|c| c.clone())
    }

    /// Replace the admin list and owner of a chat.
    ///
    /// The first refresh seeds the authorized set with the admins. Later
    /// refreshes leave the authorized set untouched.
    pub fn refresh_admins(
        &self,
        chat_id: i64,
        admins: impl IntoIterator<Item = u64>,
        owner_id: u64,
    ) {
        let admins: HashSet<u64> = admins.into_iter().collect();
        let chat = self.chat(chat_id);
        let mut state = chat.write();

        if state.refreshed_at.is_none() {
            state.authorized_ids.extend(admins.iter().copied());
        }
        state.admin_ids = admins;
        state.owner_id = Some(owner_id);
        state.refreshed_at = Some(Utc::now());

        debug!(
            "Refreshed admins for chat {}: owner={}, admins={}, authorized={}",
            chat_id,
            owner_id,
            state.admin_ids.len(),
            state.authorized_ids.len()
        );
    }

    /// Allow a user to post links. Returns `false` if already authorized.
    pub fn authorize(&self, chat_id: i64, user_id: u64) -> bool {
        let changed = self.chat(chat_id).write().authorized_ids.insert(user_id);
        debug!(
            "Authorize user {} in chat {}: changed={}",
            user_id, chat_id, changed
        );
        changed
    }

    /// Revoke link permission. Returns `false` if the user was not authorized.
    pub fn unauthorize(&self, chat_id: i64, user_id: u64) -> bool {
        let changed = self
            .existing(chat_id)
            .map(|chat| chat.write().authorized_ids.remove(&user_id))
            .unwrap_or(false);
        debug!(
            "Unauthorize user {} in chat {}: changed={}",
            user_id, chat_id, changed
        );
        changed
    }

    /// Strongest privilege the user holds. Unknown chats have no privileged users.
    pub fn privilege(&self, chat_id: i64, user_id: u64) -> Privilege {
        self.existing(chat_id)
            .map(|chat| chat.read().privilege(user_id))
            .unwrap_or(Privilege::None)
    }

    pub fn is_privileged(&self, chat_id: i64, user_id: u64) -> bool {
        self.privilege(chat_id, user_id).is_privileged()
    }

    pub fn is_owner(&self, chat_id: i64, user_id: u64) -> bool {
        self.owner(chat_id) == Some(user_id)
    }

    pub fn owner(&self, chat_id: i64) -> Option<u64> {
        self.existing(chat_id).and_then(|chat| chat.read().owner_id)
    }

    /// Whether the chat has had at least one admin refresh.
    pub fn is_known(&self, chat_id: i64) -> bool {
        self.existing(chat_id)
            .map(|chat| chat.read().refreshed_at.is_some())
            .unwrap_or(false)
    }

    /// Explicitly authorized users, sorted.
    pub fn authorized(&self, chat_id: i64) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .existing(chat_id)
            .map(|chat| chat.read().authorized_ids.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }
}

impl std::fmt::Debug for AuthorizationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationStore")
            .field("chats", &self.chats.len())
            .finish()
    }
}
