pub mod lifecycle;
pub mod parse;

pub use lifecycle::ClaimError;
pub use parse::{extract_quantity, normalize_size, parse_expiry, InputError};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::storage::models::{Listing, ListingStatus};

/// Answers collected by the new item conversation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingDraft {
    pub item: String,
    pub qty: u32,
    pub qty_display: String,
    pub size: String,
    pub expiry: String,
    pub location: String,
    pub photo_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Poster {
    pub user_id: u64,
    pub full_name: String,
    pub username: Option<String>,
}

impl ListingDraft {
    pub fn into_listing(self, poster: &Poster, now: DateTime<Utc>) -> Listing {
        let qty_display = if self.qty_display.trim().is_empty() {
            self.qty.to_string()
        } else {
            self.qty_display
        };

        Listing {
            user_id: poster.user_id,
            user_name: poster.full_name.clone(),
            user_username: poster.username.clone(),
            item: self.item,
            qty: self.qty,
            qty_display,
            size: self.size,
            expiry: self.expiry,
            location: self.location,
            photo_id: self.photo_id,
            created_at: now.timestamp(),
            status: ListingStatus::Available,
            remaining: self.qty,
            channel_message_id: None,
            claims: BTreeMap::new(),
        }
    }
}
