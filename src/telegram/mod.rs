pub mod bot;
pub mod callbacks;
pub mod channel;
pub mod commands;
pub mod conversation;
pub mod diagnostics;
pub mod formatters;

pub use bot::run_telegram_bot;
pub use diagnostics::check_channel;
