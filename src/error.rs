//! Error types for the moderation pipeline.
//!
//! Every per-message error stays inside that message's evaluation.
//! Only [`ConfigError`] is allowed to stop the process.

use std::time::Duration;

use thiserror::Error;

/// A chat-platform call failed (delete, ban, send, admin query).
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("platform request failed: {0}")]
    Request(String),

    /// The target message or chat no longer exists.
    #[error("target not found")]
    NotFound,
}

/// Media could not be resolved to bytes.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("media not found")]
    NotFound,

    #[error("media reference expired")]
    Expired,

    #[error("media transport failed: {0}")]
    Transport(String),

    /// Frames could not be decoded from a downloaded video or animation.
    #[error("frame decoding failed: {0}")]
    Decode(String),
}

/// Classification did not produce a verdict. Always treated as non-explicit.
#[derive(Debug, Clone, Error)]
pub enum ClassificationError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("classifier failed: {0}")]
    Classifier(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("media format cannot be rasterized")]
    Unsupported,
}

/// Rejection of an owner-only command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("caller is not the chat owner")]
    Unauthorized,

    #[error("no admin refresh recorded for chat {0}")]
    UnknownChat(i64),
}

/// Startup configuration problems. These are fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },

    #[error("invalid moderation policy: {0}")]
    Policy(String),

    #[error("failed to read policy file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse policy file: {0}")]
    Parse(#[from] serde_json::Error),
}
