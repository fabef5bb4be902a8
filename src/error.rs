use thiserror::Error;

use crate::listing::ClaimError;

#[derive(Error, Debug)]
pub enum RedistError {
    #[error("Telegram request error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote database returned {status}: {body}")]
    RemoteStatus { status: u16, body: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Dialogue storage error: {0}")]
    Dialogue(#[from] teloxide::dispatching::dialogue::InMemStorageError),

    #[error("Listing not found: {0}")]
    ListingNotFound(String),

    #[error(transparent)]
    Claim(#[from] ClaimError),

    #[error("Listing {0} kept changing underneath us, giving up")]
    Conflict(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, RedistError>;
