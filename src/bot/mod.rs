//! Bot module - Telegram adapter around the moderation core.

pub mod dispatcher;
pub mod frames;
pub mod gateway;
mod runtime;
pub mod scheduler;

pub use dispatcher::{AppState, ThrottledBot, build_dispatcher};
pub use frames::FrameExtractor;
pub use gateway::{TelegramGateway, TelegramMediaFetcher};
pub use runtime::run;
