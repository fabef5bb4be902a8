use chrono::Utc;
use std::sync::Arc;
use teloxide::{prelude::*, types::ParseMode};
use tracing::{error, info};

use crate::listing::ClaimError;
use crate::telegram::bot::{BotState, Command, HandlerResult, PendingClaim, RedistDialogue, State};
use crate::telegram::{conversation, formatters};

const CLAIM_PREFIX: &str = "claim_";

pub async fn answer(
    bot: Bot,
    msg: Message,
    cmd: Command,
    dialogue: RedistDialogue,
    state: Arc<BotState>,
) -> HandlerResult {
    match cmd {
        Command::Start(arg) => match arg.trim().strip_prefix(CLAIM_PREFIX) {
            Some(listing_id) if !listing_id.is_empty() => {
                start_claim(&bot, &msg, &dialogue, &state, listing_id).await?;
            }
            _ => {
                dialogue.exit().await?;
                bot.send_message(msg.chat.id, formatters::welcome_text())
                    .parse_mode(ParseMode::Html)
                    .reply_markup(formatters::main_menu_keyboard())
                    .await?;
            }
        },
        Command::NewItem => {
            conversation::start_new_item(&bot, msg.chat.id, &dialogue).await?;
        }
        Command::Instructions => {
            bot.send_message(
                msg.chat.id,
                formatters::instructions_text(&state.config.telegram.channel_id),
            )
            .parse_mode(ParseMode::Html)
            .reply_markup(formatters::new_item_keyboard())
            .await?;
        }
        Command::Cancel => {
            dialogue.exit().await?;
            bot.send_message(
                msg.chat.id,
                "❌ Current action cancelled. You can start again with /newitem.",
            )
            .await?;
        }
        Command::Admin => {
            let user_id = msg.from().map(|u| u.id.0).unwrap_or(0);
            if !state.config.is_admin(user_id) {
                info!("Refused /admin for {}", user_id);
                bot.send_message(msg.chat.id, "⛔ You are not authorised to use this command.")
                    .await?;
                return Ok(());
            }
            bot.send_message(msg.chat.id, formatters::admin_panel_text())
                .parse_mode(ParseMode::Html)
                .reply_markup(formatters::admin_keyboard())
                .await?;
        }
    }

    Ok(())
}

/// Deep link from a channel post's Claim button.
async fn start_claim(
    bot: &Bot,
    msg: &Message,
    dialogue: &RedistDialogue,
    state: &BotState,
    listing_id: &str,
) -> HandlerResult {
    let listing = match state.store.fetch(listing_id).await {
        Ok(Some(current)) => current.value,
        Ok(None) => {
            bot.send_message(msg.chat.id, "❌ This listing is no longer available.").await?;
            return Ok(());
        }
        Err(e) => {
            error!("Failed to load listing {}: {}", listing_id, e);
            bot.send_message(msg.chat.id, "❌ Could not load this listing. Please try again later.")
                .await?;
            return Ok(());
        }
    };

    let available = match listing.open_for_claims(Utc::now(), state.max_age()) {
        Ok(available) => available,
        Err(ClaimError::Expired) => {
            bot.send_message(msg.chat.id, "⌛ This listing has expired.").await?;
            return Ok(());
        }
        Err(_) => {
            bot.send_message(msg.chat.id, "❌ This listing has been fully claimed.").await?;
            return Ok(());
        }
    };

    bot.send_message(msg.chat.id, formatters::claim_prompt_text(&listing, available))
        .parse_mode(ParseMode::Html)
        .await?;
    dialogue
        .update(State::ClaimQuantity(PendingClaim {
            listing_id: listing_id.to_string(),
            max_qty: available,
            qty: 0,
        }))
        .await?;
    Ok(())
}
