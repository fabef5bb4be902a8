//! Everything that touches the listings channel.

use chrono::{DateTime, Duration, Utc};
use teloxide::{
    prelude::*,
    types::{InputFile, MessageId, ParseMode},
    ApiError, RequestError,
};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::listing::{ListingDraft, Poster};
use crate::storage::{expire_stale, update_listing, Listing, ListingStore};
use crate::telegram::bot::BotState;
use crate::telegram::formatters;

/// Stores a new listing and posts it to the channel. Returns the listing id.
pub async fn publish_listing(bot: &Bot, state: &BotState, poster: &Poster, draft: ListingDraft) -> Result<String> {
    let listing = draft.into_listing(poster, Utc::now());
    let listing_id = state.store.insert(&listing).await?;
    debug!("Stored listing {} for {}", listing_id, poster.user_id);

    let text = formatters::new_listing_post(&listing);
    let keyboard = formatters::claim_keyboard(&state.bot_username, &listing_id);

    let posted = match &listing.photo_id {
        Some(photo_id) => {
            let mut request = bot
                .send_photo(state.channel.clone(), InputFile::file_id(photo_id.clone()))
                .caption(text)
                .parse_mode(ParseMode::Html);
            if let Some(keyboard) = keyboard {
                request = request.reply_markup(keyboard);
            }
            request.await
        }
        None => {
            let mut request = bot
                .send_message(state.channel.clone(), text)
                .parse_mode(ParseMode::Html);
            if let Some(keyboard) = keyboard {
                request = request.reply_markup(keyboard);
            }
            request.await
        }
    };

    let message = match posted {
        Ok(message) => message,
        Err(e) => {
            // Unposted listings are unreachable, close them.
            let closed = update_listing(state.store.as_ref(), &listing_id, state.retries(), |l| Ok(l.expire())).await;
            if let Err(cleanup) = closed {
                warn!("Could not close unposted listing {}: {}", listing_id, cleanup);
            }
            return Err(e.into());
        }
    };

    record_channel_post(state.store.as_ref(), &listing_id, message.id.0, state.retries()).await;
    Ok(listing_id)
}

/// Remembers which channel message shows the listing. Failures are logged, not returned.
pub async fn record_channel_post(store: &dyn ListingStore, listing_id: &str, message_id: i32, retries: u32) -> bool {
    let saved = update_listing(store, listing_id, retries, |l| {
        l.channel_message_id = Some(message_id);
        Ok(())
    })
    .await;

    match saved {
        Ok(_) => true,
        Err(e) => {
            error!(
                "Listing {} is posted as message {} but the id could not be saved: {}",
                listing_id, message_id, e
            );
            false
        }
    }
}

/// Whether the post should still carry the Claim button.
pub fn accepts_claims(listing: &Listing, now: DateTime<Utc>, max_age: Duration) -> bool {
    listing.open_for_claims(now, max_age).is_ok()
}

/// Rewrites the channel post to reflect the listing's current stock and status.
/// Failures are logged, not returned.
pub async fn refresh_post(bot: &Bot, state: &BotState, listing_id: &str, listing: &Listing) {
    let Some(message_id) = listing.channel_message_id else {
        debug!("Listing {} has no channel post to refresh", listing_id);
        return;
    };
    let message_id = MessageId(message_id);
    let text = formatters::channel_status_text(listing);
    let keyboard = if accepts_claims(listing, Utc::now(), state.max_age()) {
        formatters::claim_keyboard(&state.bot_username, listing_id)
    } else {
        None
    };

    let edited = if listing.photo_id.is_some() {
        let mut request = bot
            .edit_message_caption(state.channel.clone(), message_id)
            .caption(text)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard);
        }
        request.await.map(|_| ())
    } else {
        let mut request = bot
            .edit_message_text(state.channel.clone(), message_id, text)
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard);
        }
        request.await.map(|_| ())
    };

    match edited {
        Ok(()) | Err(RequestError::Api(ApiError::MessageNotModified)) => {}
        Err(e) => error!("Failed to update channel post for {}: {}", listing_id, e),
    }
}

/// Posts a reminder for each open listing. Returns how many were bumped.
pub async fn bump_open_listings(bot: &Bot, state: &BotState) -> Result<usize> {
    let now = Utc::now();
    let max_age = state.max_age();
    let mut bumped = 0;

    for (listing_id, listing) in state.store.all().await? {
        if !listing.is_open() || listing.is_stale(now, max_age) {
            continue;
        }
        let keyboard = listing
            .channel_message_id
            .and_then(|mid| formatters::bump_keyboard(state.config.channel_username(), mid))
            .or_else(|| formatters::claim_keyboard(&state.bot_username, &listing_id));

        let mut request = bot
            .send_message(state.channel.clone(), formatters::bump_text(&listing))
            .parse_mode(ParseMode::Html);
        if let Some(keyboard) = keyboard {
            request = request.reply_markup(keyboard);
        }

        match request.await {
            Ok(_) => bumped += 1,
            Err(e) => error!("Failed to bump listing {}: {}", listing_id, e),
        }
    }

    info!("Bumped {} listing(s)", bumped);
    Ok(bumped)
}

/// Marks available listings past the age limit as expired and updates their posts.
pub async fn expire_stale_listings(bot: &Bot, state: &BotState) -> Result<usize> {
    let expired = expire_stale(state.store.as_ref(), Utc::now(), state.max_age(), state.retries()).await?;
    for (listing_id, listing) in &expired {
        refresh_post(bot, state, listing_id, listing).await;
    }
    Ok(expired.len())
}
