//! Free-text steps of the private chat conversations: the new item form,
//! the requester's claim questions and the donor's reschedule answer.

use chrono::Utc;
use std::sync::Arc;
use teloxide::{prelude::*, types::ParseMode};
use tracing::{error, info};

use crate::error::RedistError;
use crate::listing::{self, ClaimError, ListingDraft};
use crate::storage::update_listing;
use crate::telegram::bot::{BotState, HandlerResult, PendingClaim, PendingReschedule, RedistDialogue, State};
use crate::telegram::formatters;

fn answer_text(msg: &Message) -> Option<String> {
    msg.text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Slash-prefixed text that didn't parse as one of our commands.
pub fn looks_like_command(text: &str) -> bool {
    text.trim_start().starts_with('/')
}

async fn ask_for_text(bot: &Bot, msg: &Message) -> HandlerResult {
    bot.send_message(msg.chat.id, "✏️ Please answer with a text message.").await?;
    Ok(())
}

pub async fn start_new_item(bot: &Bot, chat_id: ChatId, dialogue: &RedistDialogue) -> HandlerResult {
    dialogue.update(State::ReceiveItem).await?;
    bot.send_message(
        chat_id,
        "🧾 What item are you donating?\nExample: 'Gloves' or 'Hand Sanitiser'.",
    )
    .await?;
    Ok(())
}

pub async fn receive_item(bot: Bot, dialogue: RedistDialogue, msg: Message) -> HandlerResult {
    let Some(item) = answer_text(&msg) else {
        return ask_for_text(&bot, &msg).await;
    };

    let draft = ListingDraft {
        item,
        ..Default::default()
    };
    bot.send_message(
        msg.chat.id,
        "📦 How many boxes or units are available?\n\
         You can type e.g. '10', '10 boxes', '10 bottles'.",
    )
    .await?;
    dialogue.update(State::ReceiveQuantity(draft)).await?;
    Ok(())
}

pub async fn receive_quantity(
    bot: Bot,
    dialogue: RedistDialogue,
    msg: Message,
    mut draft: ListingDraft,
) -> HandlerResult {
    let Some(text) = answer_text(&msg) else {
        return ask_for_text(&bot, &msg).await;
    };

    match listing::extract_quantity(&text) {
        Ok(qty) => {
            draft.qty = qty;
            draft.qty_display = text;
            bot.send_message(msg.chat.id, "📏 What is the size/volume?\nType 'na' if not applicable.")
                .await?;
            dialogue.update(State::ReceiveSize(draft)).await?;
        }
        Err(_) => {
            bot.send_message(
                msg.chat.id,
                "❌ Please include a positive number in your answer.\n\
                 Examples: '10', '10 boxes', '5 bottles'.",
            )
            .await?;
        }
    }
    Ok(())
}

pub async fn receive_size(bot: Bot, dialogue: RedistDialogue, msg: Message, mut draft: ListingDraft) -> HandlerResult {
    let Some(text) = answer_text(&msg) else {
        return ask_for_text(&bot, &msg).await;
    };

    draft.size = listing::normalize_size(&text);
    bot.send_message(
        msg.chat.id,
        "⏰ Enter expiry date (DD/MM/YYYY) or type 'na' if not applicable.",
    )
    .await?;
    dialogue.update(State::ReceiveExpiry(draft)).await?;
    Ok(())
}

pub async fn receive_expiry(
    bot: Bot,
    dialogue: RedistDialogue,
    msg: Message,
    mut draft: ListingDraft,
) -> HandlerResult {
    let Some(text) = answer_text(&msg) else {
        return ask_for_text(&bot, &msg).await;
    };

    match listing::parse_expiry(&text) {
        Ok(expiry) => {
            draft.expiry = expiry;
            bot.send_message(msg.chat.id, "📍 Where is the pickup location?").await?;
            dialogue.update(State::ReceiveLocation(draft)).await?;
        }
        Err(e) => {
            bot.send_message(msg.chat.id, format!("❌ {}", e)).await?;
        }
    }
    Ok(())
}

pub async fn receive_location(
    bot: Bot,
    dialogue: RedistDialogue,
    msg: Message,
    mut draft: ListingDraft,
) -> HandlerResult {
    let Some(location) = answer_text(&msg) else {
        return ask_for_text(&bot, &msg).await;
    };

    draft.location = location;
    bot.send_message(
        msg.chat.id,
        "📸 Please send a photo of the item, or type 'skip' to continue without a photo.",
    )
    .await?;
    dialogue.update(State::ReceivePhoto(draft)).await?;
    Ok(())
}

pub async fn receive_photo(bot: Bot, dialogue: RedistDialogue, msg: Message, mut draft: ListingDraft) -> HandlerResult {
    if let Some(largest) = msg.photo().and_then(|sizes| sizes.last()) {
        draft.photo_id = Some(largest.file.id.clone());
    } else if msg.text().map_or(false, listing::parse::is_skip) {
        draft.photo_id = None;
    } else {
        bot.send_message(msg.chat.id, "📸 Send a photo, or type 'skip'.").await?;
        return Ok(());
    }

    bot.send_message(msg.chat.id, formatters::confirm_text(&draft))
        .parse_mode(ParseMode::Html)
        .reply_markup(formatters::confirm_keyboard())
        .await?;
    dialogue.update(State::Confirm(draft)).await?;
    Ok(())
}

pub async fn awaiting_confirmation(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "👆 Please tap ✅ Post or ❌ Cancel above, or /cancel to start over.",
    )
    .await?;
    Ok(())
}

pub async fn receive_claim_quantity(
    bot: Bot,
    dialogue: RedistDialogue,
    msg: Message,
    mut claim: PendingClaim,
) -> HandlerResult {
    let Some(text) = answer_text(&msg) else {
        return ask_for_text(&bot, &msg).await;
    };

    let qty = match listing::extract_quantity(&text) {
        Ok(qty) => qty,
        Err(_) => {
            bot.send_message(
                msg.chat.id,
                "❌ Please include a positive number for the quantity.\n\
                 Example: '2', '2 boxes', '3 bottles'.",
            )
            .await?;
            return Ok(());
        }
    };

    if qty > claim.max_qty {
        bot.send_message(
            msg.chat.id,
            format!(
                "❌ Only {max} units are available. Please enter a number between 1 and {max}.",
                max = claim.max_qty
            ),
        )
        .await?;
        return Ok(());
    }

    claim.qty = qty;
    bot.send_message(
        msg.chat.id,
        "🕓 When can you collect?\nExample: 'Tomorrow 3–5 pm' or '25 Nov, 10 am'.",
    )
    .await?;
    dialogue.update(State::ClaimPickup(claim)).await?;
    Ok(())
}

pub async fn receive_pickup_time(
    bot: Bot,
    dialogue: RedistDialogue,
    msg: Message,
    claim: PendingClaim,
    state: Arc<BotState>,
) -> HandlerResult {
    let Some(pickup_time) = answer_text(&msg) else {
        return ask_for_text(&bot, &msg).await;
    };
    let Some(requester) = msg.from() else {
        return Ok(());
    };

    let requester_id = requester.id.0;
    let handle = formatters::user_handle(requester);
    let username = requester.username.clone().unwrap_or_else(|| requester.full_name());
    let now = Utc::now();
    let max_age = state.max_age();

    let result = update_listing(state.store.as_ref(), &claim.listing_id, state.retries(), |listing| {
        Ok(listing.submit_claim(requester_id, &username, claim.qty, &pickup_time, now, max_age)?)
    })
    .await;
    dialogue.exit().await?;

    let (listing, claim_id) = match result {
        Ok(done) => done,
        Err(e) => {
            let reply = match &e {
                RedistError::ListingNotFound(_) => {
                    "❌ This listing is no longer available. Please try another item."
                }
                RedistError::Claim(ClaimError::Expired) => "⌛ This listing has expired.",
                RedistError::Claim(_) => "❌ Not enough remaining stock to fulfil your request.",
                _ => {
                    error!("Failed to record claim on {}: {}", claim.listing_id, e);
                    "❌ Could not record your request. Please try again later."
                }
            };
            bot.send_message(msg.chat.id, reply).await?;
            return Ok(());
        }
    };
    info!("Claim {} recorded on listing {}", claim_id, claim.listing_id);

    if let Some(recorded) = listing.claims.get(&claim_id) {
        let notified = bot
            .send_message(
                ChatId(listing.user_id as i64),
                formatters::claim_request_text(&listing.item, recorded, &handle),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(formatters::decision_keyboard(&claim.listing_id, &claim_id))
            .await;
        if let Err(e) = notified {
            error!("Error notifying donor {}: {}", listing.user_id, e);
        }
    }

    bot.send_message(
        msg.chat.id,
        "✅ Your request has been sent to the donor. \
         You’ll be notified once they approve, reject, or propose a new time.",
    )
    .await?;
    Ok(())
}

pub async fn receive_new_time(
    bot: Bot,
    dialogue: RedistDialogue,
    msg: Message,
    request: PendingReschedule,
    state: Arc<BotState>,
) -> HandlerResult {
    let Some(new_time) = answer_text(&msg) else {
        return ask_for_text(&bot, &msg).await;
    };
    let Some(donor) = msg.from() else {
        return Ok(());
    };
    let donor_id = donor.id.0;
    let donor_handle = formatters::user_handle(donor);

    let result = update_listing(state.store.as_ref(), &request.listing_id, state.retries(), |listing| {
        Ok(listing.propose_time(&request.claim_id, donor_id, &new_time)?)
    })
    .await;
    dialogue.exit().await?;

    let (listing, claim) = match result {
        Ok(done) => done,
        Err(RedistError::ListingNotFound(_)) => {
            bot.send_message(msg.chat.id, "❌ This listing no longer exists. Reschedule cancelled.")
                .await?;
            return Ok(());
        }
        Err(RedistError::Claim(e)) => {
            bot.send_message(msg.chat.id, format!("⚠️ {}", e)).await?;
            return Ok(());
        }
        Err(e) => {
            error!("Failed to store proposed time on {}: {}", request.listing_id, e);
            bot.send_message(msg.chat.id, "❌ Could not save the proposed time. Please try again later.")
                .await?;
            return Ok(());
        }
    };

    let sent = bot
        .send_message(
            ChatId(claim.user_id as i64),
            formatters::reschedule_proposal_text(&listing, &claim, &donor_handle),
        )
        .parse_mode(ParseMode::Html)
        .reply_markup(formatters::reschedule_keyboard(&request.listing_id, &request.claim_id))
        .await;

    let reply = match sent {
        Ok(_) => "✅ Your proposed pickup time has been sent to the requester for confirmation.",
        Err(e) => {
            error!("Error sending reschedule proposal to {}: {}", claim.user_id, e);
            "❌ Could not send the proposed time to the requester."
        }
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

/// Keeps the dialogue where it is; the text is never taken as an answer.
pub async fn unknown_command(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "❓ Unknown command. Use /newitem, /instructions, /cancel or /start, \
         or answer the last question.",
    )
    .await?;
    Ok(())
}

pub async fn idle_message(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, formatters::idle_help_text())
        .reply_markup(formatters::main_menu_keyboard())
        .await?;
    Ok(())
}
