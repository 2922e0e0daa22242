//! Utility functions.
//!
//! Collection of helper functions used across the bot.

mod format;

pub use format::{format_duration_full, html_escape, parse_duration};
