//! Configuration module for the Aegis bot.
//!
//! Loads configuration from environment variables.

mod policy;

pub use policy::ModerationPolicy;

use std::env;

use serde::Deserialize;
use tracing::info;

use crate::error::ConfigError;

/// Bot running mode
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    #[default]
    Polling,
    Webhook,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub bot_token: String,
    pub bot_mode: BotMode,
    pub webhook_url: Option<String>,
    pub webhook_port: u16,
    pub webhook_secret: Option<String>,

    /// Endpoint of the content classifier service.
    pub classifier_url: String,

    /// ffmpeg binary used to decode video and animation frames.
    pub ffmpeg_path: String,

    pub policy: ModerationPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_mode = match get("BOT_MODE")
            .unwrap_or_else(|| "polling".to_string())
            .to_lowercase()
            .as_str()
        {
            "webhook" => BotMode::Webhook,
            _ => BotMode::Polling,
        };

        let webhook_url = get("WEBHOOK_URL").filter(|s| !s.is_empty());
        if bot_mode == BotMode::Webhook && webhook_url.is_none() {
            return Err(ConfigError::Missing("WEBHOOK_URL"));
        }

        let webhook_port = match get("WEBHOOK_PORT") {
            Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: "WEBHOOK_PORT",
                value: v.clone(),
            })?,
            None => 8443,
        };

        let bot_token = get("BOT_TOKEN")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let classifier_url = get("CLASSIFIER_URL")
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::Missing("CLASSIFIER_URL"))?;
        url::Url::parse(&classifier_url).map_err(|_| ConfigError::Invalid {
            key: "CLASSIFIER_URL",
            value: classifier_url.clone(),
        })?;

        let mut policy = match get("MODERATION_POLICY").filter(|s| !s.is_empty()) {
            Some(path) => {
                info!("Loading moderation policy from {}", path);
                ModerationPolicy::from_file(&path)?
            }
            None => ModerationPolicy::default(),
        };
        policy.apply_overrides(&get)?;

        Ok(Self {
            bot_token,
            bot_mode,
            webhook_url,
            webhook_port,
            webhook_secret: get("WEBHOOK_SECRET").filter(|s| !s.is_empty()),
            classifier_url,
            ffmpeg_path: get("FFMPEG_PATH")
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "ffmpeg".to_string()),
            policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        Config::from_lookup(|k| map.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn minimal_config() {
        let cfg = config(&[
            ("BOT_TOKEN", "123:abc"),
            ("CLASSIFIER_URL", "http://localhost:8000/detect"),
        ])
        .unwrap();

        assert_eq!(cfg.bot_mode, BotMode::Polling);
        assert_eq!(cfg.webhook_port, 8443);
        assert_eq!(cfg.ffmpeg_path, "ffmpeg");
        assert_eq!(cfg.policy, ModerationPolicy::default());
    }

    #[test]
    fn missing_classifier_is_fatal() {
        let err = config(&[("BOT_TOKEN", "123:abc")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("CLASSIFIER_URL")));
    }

    #[test]
    fn missing_token_is_fatal() {
        let err = config(&[("CLASSIFIER_URL", "http://localhost/detect")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("BOT_TOKEN")));
    }

    #[test]
    fn webhook_requires_url() {
        let err = config(&[
            ("BOT_TOKEN", "t"),
            ("CLASSIFIER_URL", "http://localhost/detect"),
            ("BOT_MODE", "webhook"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("WEBHOOK_URL")));
    }

    #[test]
    fn policy_overrides_flow_through() {
        let cfg = config(&[
            ("BOT_TOKEN", "t"),
            ("CLASSIFIER_URL", "http://localhost/detect"),
            ("WARNING_TTL", "30"),
        ])
        .unwrap();
        assert_eq!(cfg.policy.warning_ttl_secs, 30);
    }
}
