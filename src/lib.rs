pub mod config;
pub mod error;
pub mod export;
pub mod listing;
pub mod server;
pub mod storage;
pub mod telegram;
pub mod utils;

pub use config::Config;
pub use error::{RedistError, Result};
