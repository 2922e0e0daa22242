//! Moderation policy values.
//!
//! Everything here is a policy parameter, not engine structure. Defaults can
//! be overridden by a JSON file and then by individual environment variables.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::moderation::ViolationCategory;
use crate::utils::parse_duration;

/// Labels reported by the nudity detector that count as explicit.
const DEFAULT_NSFW_LABELS: &[&str] = &[
    "FEMALE_GENITALIA_EXPOSED",
    "FEMALE_BREAST_EXPOSED",
    "MALE_GENITALIA_EXPOSED",
    "ANUS_EXPOSED",
    "BUTTOCKS_EXPOSED",
    "BELLY_EXPOSED",
    "ARMPITS_EXPOSED",
];

const DEFAULT_LINK_WHITELIST: &[&str] = &["github.com", "docs.rs", "rust-lang.org"];

const DEFAULT_KEYWORDS: &[(&str, ViolationCategory)] = &[
    ("buy followers", ViolationCategory::Promotional),
    ("free crypto", ViolationCategory::Promotional),
    ("join my channel", ViolationCategory::Promotional),
    ("promo code", ViolationCategory::Promotional),
    ("cocaine", ViolationCategory::Contraband),
    ("heroin", ViolationCategory::Contraband),
    ("fake passport", ViolationCategory::Contraband),
    ("buy guns", ViolationCategory::Weapons),
    ("ammo for sale", ViolationCategory::Weapons),
    ("onlyfans", ViolationCategory::Explicit),
    ("porn", ViolationCategory::Explicit),
    ("nudes", ViolationCategory::Explicit),
];

/// Telegram treats bans shorter than 30 seconds or longer than 366 days as
/// permanent.
pub const MIN_BAN_SECS: u64 = 30;
pub const MAX_BAN_SECS: u64 = 366 * 86_400;

/// Moderation policy loaded at startup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationPolicy {
    /// Classifier labels treated as explicit.
    pub nsfw_labels: Vec<String>,

    /// A label counts only when its score is strictly above this.
    pub nsfw_threshold: f32,

    /// Banned keyword (matched case-insensitively as a substring) to category.
    pub keywords: BTreeMap<String, ViolationCategory>,

    /// Hosts (and their subdomains) anyone may link to.
    pub link_whitelist: Vec<String>,

    pub ban_duration_secs: u64,
    pub warning_ttl_secs: u64,

    /// Cap on frames sampled from videos and animations.
    pub max_frames: usize,

    pub classify_timeout_secs: u64,
    pub fetch_timeout_secs: u64,

    /// Warn on unauthorized links. When off, links are deleted silently.
    pub warn_on_link: bool,

    /// Scan media from admins and authorized users. The owner is never scanned.
    pub scan_admin_media: bool,

    /// How long an admin list is trusted before it is fetched again.
    pub admin_refresh_ttl_secs: u64,
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            nsfw_labels: DEFAULT_NSFW_LABELS.iter().map(|s| s.to_string()).collect(),
            nsfw_threshold: 0.6,
            keywords: DEFAULT_KEYWORDS
                .iter()
                .map(|(k, c)| (k.to_string(), *c))
                .collect(),
            link_whitelist: DEFAULT_LINK_WHITELIST
                .iter()
                .map(|s| s.to_string())
                .collect(),
            ban_duration_secs: 86_400,
            warning_ttl_secs: 10,
            max_frames: 8,
            classify_timeout_secs: 15,
            fetch_timeout_secs: 20,
            warn_on_link: true,
            scan_admin_media: true,
            admin_refresh_ttl_secs: 300,
        }
    }
}

impl ModerationPolicy {
    /// Load a policy from a JSON file. Missing fields keep their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let policy: Self = serde_json::from_str(&raw)?;
        policy.validate()?;
        Ok(policy)
    }

    /// Apply environment overrides through a lookup function.
    pub fn apply_overrides<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("NSFW_THRESHOLD") {
            self.nsfw_threshold = parse_value("NSFW_THRESHOLD", &v)?;
        }
        if let Some(v) = get("BAN_DURATION") {
            self.ban_duration_secs = parse_duration(&v)
                .ok_or(ConfigError::Invalid {
                    key: "BAN_DURATION",
                    value: v.clone(),
                })?
                .as_secs();
        }
        if let Some(v) = get("WARNING_TTL") {
            self.warning_ttl_secs = parse_value("WARNING_TTL", &v)?;
        }
        if let Some(v) = get("MAX_FRAMES") {
            self.max_frames = parse_value("MAX_FRAMES", &v)?;
        }
        if let Some(v) = get("CLASSIFY_TIMEOUT") {
            self.classify_timeout_secs = parse_value("CLASSIFY_TIMEOUT", &v)?;
        }
        if let Some(v) = get("FETCH_TIMEOUT") {
            self.fetch_timeout_secs = parse_value("FETCH_TIMEOUT", &v)?;
        }
        if let Some(v) = get("ADMIN_REFRESH_TTL") {
            self.admin_refresh_ttl_secs = parse_value("ADMIN_REFRESH_TTL", &v)?;
        }
        if let Some(v) = get("LINK_WHITELIST") {
            self.link_whitelist = v
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.nsfw_threshold) {
            return Err(ConfigError::Policy(format!(
                "nsfw_threshold must be within [0, 1], got {}",
                self.nsfw_threshold
            )));
        }
        if self.max_frames == 0 {
            return Err(ConfigError::Policy("max_frames must be at least 1".into()));
        }
        if !(MIN_BAN_SECS..=MAX_BAN_SECS).contains(&self.ban_duration_secs) {
            return Err(ConfigError::Policy(format!(
                "ban_duration_secs must be within [{}, {}], got {}",
                MIN_BAN_SECS, MAX_BAN_SECS, self.ban_duration_secs
            )));
        }
        if self.keywords.keys().any(|k| k.trim().is_empty()) {
            return Err(ConfigError::Policy("keywords must not be blank".into()));
        }
        Ok(())
    }

    pub fn ban_duration(&self) -> Duration {
        Duration::from_secs(self.ban_duration_secs)
    }

    pub fn warning_ttl(&self) -> Duration {
        Duration::from_secs(self.warning_ttl_secs)
    }

    pub fn classify_timeout(&self) -> Duration {
        Duration::from_secs(self.classify_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn admin_refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.admin_refresh_ttl_secs)
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
