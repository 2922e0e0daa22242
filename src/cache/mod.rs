//! Cache module - Moka-backed caches.
//!
//! Used for data that is allowed to go stale and be fetched again, such as
//! the time a chat's admin list was last loaded.
//!
//! ## Usage
//!
//! ```rust
//! let fresh = TypedCache::<i64, ()>::new("admin_freshness", CacheConfig::with_capacity(10_000));
//! fresh.insert(chat_id, ());
//! if !fresh.contains(&chat_id) { /* refresh */ }
//! ```

mod config;
mod typed;

pub use config::CacheConfig;
pub use typed::TypedCache;
