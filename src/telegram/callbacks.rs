use chrono::Utc;
use std::sync::Arc;
use teloxide::{prelude::*, types::ParseMode};
use tracing::{error, info};

use crate::error::RedistError;
use crate::listing::{ClaimError, Poster};
use crate::storage::{compute_stats, update_listing};
use crate::telegram::bot::{BotState, HandlerResult, PendingReschedule, RedistDialogue, State};
use crate::telegram::{channel, conversation, formatters};

/// Everything an inline button can ask for. Encoded as `action|listing|claim`
/// to stay under Telegram's 64 byte callback data limit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    NewItem,
    Instructions,
    ConfirmPost,
    CancelPost,
    Approve { listing_id: String, claim_id: String },
    Reject { listing_id: String, claim_id: String },
    Suggest { listing_id: String, claim_id: String },
    AcceptTime { listing_id: String, claim_id: String },
    DeclineTime { listing_id: String, claim_id: String },
    AdminBump,
    AdminExpire,
    AdminStats,
}

impl CallbackAction {
    pub fn encode(&self) -> String {
        use CallbackAction::*;
        match self {
            NewItem => "newitem_btn".to_string(),
            Instructions => "help_info".to_string(),
            ConfirmPost => "confirm_post".to_string(),
            CancelPost => "cancel_post".to_string(),
            Approve { listing_id, claim_id } => format!("approve|{}|{}", listing_id, claim_id),
            Reject { listing_id, claim_id } => format!("reject|{}|{}", listing_id, claim_id),
            Suggest { listing_id, claim_id } => format!("suggest|{}|{}", listing_id, claim_id),
            AcceptTime { listing_id, claim_id } => format!("accept_newtime|{}|{}", listing_id, claim_id),
            DeclineTime { listing_id, claim_id } => format!("decline_newtime|{}|{}", listing_id, claim_id),
            AdminBump => "admin_bump".to_string(),
            AdminExpire => "admin_expire".to_string(),
            AdminStats => "admin_stats".to_string(),
        }
    }

    pub fn parse(data: &str) -> Option<Self> {
        use CallbackAction::*;
        let simple = match data {
            "newitem_btn" => Some(NewItem),
            "help_info" => Some(Instructions),
            "confirm_post" => Some(ConfirmPost),
            "cancel_post" => Some(CancelPost),
            "admin_bump" => Some(AdminBump),
            "admin_expire" => Some(AdminExpire),
            "admin_stats" => Some(AdminStats),
            _ => None,
        };
        if simple.is_some() {
            return simple;
        }

        let mut parts = data.split('|');
        let (action, listing_id, claim_id) = (parts.next()?, parts.next()?, parts.next()?);
        if parts.next().is_some() || listing_id.is_empty() || claim_id.is_empty() {
            return None;
        }
        let (listing_id, claim_id) = (listing_id.to_string(), claim_id.to_string());

        match action {
            "approve" => Some(Approve { listing_id, claim_id }),
            "reject" => Some(Reject { listing_id, claim_id }),
            "suggest" => Some(Suggest { listing_id, claim_id }),
            "accept_newtime" => Some(AcceptTime { listing_id, claim_id }),
            "decline_newtime" => Some(DeclineTime { listing_id, claim_id }),
            _ => None,
        }
    }

    fn is_admin_only(&self) -> bool {
        matches!(
            self,
            CallbackAction::AdminBump | CallbackAction::AdminExpire | CallbackAction::AdminStats
        )
    }
}

/// Replaces the text of the message the button was attached to.
async fn edit_origin(bot: &Bot, q: &CallbackQuery, text: impl Into<String>) -> HandlerResult {
    if let Some(message) = &q.message {
        bot.edit_message_text(message.chat.id, message.id, text)
            .parse_mode(ParseMode::Html)
            .await?;
    }
    Ok(())
}

async fn notify(bot: &Bot, user_id: u64, text: String) {
    if let Err(e) = bot
        .send_message(ChatId(user_id as i64), text)
        .parse_mode(ParseMode::Html)
        .await
    {
        error!("Error notifying user {}: {}", user_id, e);
    }
}

/// User-facing explanation for a failed decision.
fn decision_failure(e: &RedistError) -> String {
    match e {
        RedistError::ListingNotFound(_) => "❌ Listing no longer exists.".to_string(),
        RedistError::Claim(ClaimError::InsufficientStock { .. }) => {
            "⚠️ Not enough remaining stock to approve this claim.".to_string()
        }
        RedistError::Claim(claim_error) => format!("⚠️ {}", claim_error),
        other => {
            error!("Claim decision failed: {}", other);
            "❌ Something went wrong, please try again.".to_string()
        }
    }
}

/// Handle callback queries (inline buttons)
pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    dialogue: RedistDialogue,
    state: Arc<BotState>,
) -> HandlerResult {
    let Some(action) = q.data.as_deref().and_then(CallbackAction::parse) else {
        bot.answer_callback_query(q.id.clone()).await?;
        return edit_origin(&bot, &q, "❌ Unknown action.").await;
    };

    if action.is_admin_only() && !state.config.is_admin(q.from.id.0) {
        bot.answer_callback_query(q.id.clone())
            .text("You are not authorised to use this.")
            .show_alert(true)
            .await?;
        return Ok(());
    }
    bot.answer_callback_query(q.id.clone()).await?;

    match action {
        CallbackAction::NewItem => {
            if let Some(message) = &q.message {
                conversation::start_new_item(&bot, message.chat.id, &dialogue).await?;
            }
        }
        CallbackAction::Instructions => {
            if let Some(message) = &q.message {
                bot.edit_message_text(
                    message.chat.id,
                    message.id,
                    formatters::instructions_text(&state.config.telegram.channel_id),
                )
                .parse_mode(ParseMode::Html)
                .reply_markup(formatters::new_item_keyboard())
                .await?;
            }
        }
        CallbackAction::ConfirmPost => confirm_post(&bot, &q, &dialogue, &state).await?,
        CallbackAction::CancelPost => {
            dialogue.exit().await?;
            edit_origin(&bot, &q, "❌ Listing cancelled. Start again with /newitem.").await?;
        }
        CallbackAction::Approve { listing_id, claim_id } => {
            approve(&bot, &q, &state, &listing_id, &claim_id).await?
        }
        CallbackAction::Reject { listing_id, claim_id } => {
            reject(&bot, &q, &state, &listing_id, &claim_id).await?
        }
        CallbackAction::Suggest { listing_id, claim_id } => {
            suggest(&bot, &q, &dialogue, &state, listing_id, claim_id).await?
        }
        CallbackAction::AcceptTime { listing_id, claim_id } => {
            accept_time(&bot, &q, &state, &listing_id, &claim_id).await?
        }
        CallbackAction::DeclineTime { listing_id, claim_id } => {
            decline_time(&bot, &q, &state, &listing_id, &claim_id).await?
        }
        CallbackAction::AdminBump => {
            let text = match channel::bump_open_listings(&bot, &state).await {
                Ok(0) => "ℹ️ There are no active unclaimed listings to bump.".to_string(),
                Ok(n) => format!("✅ Bumped {} unclaimed listing(s) to the channel.", n),
                Err(e) => {
                    error!("Bump failed: {}", e);
                    "❌ Could not load listings. Please try again later.".to_string()
                }
            };
            edit_origin(&bot, &q, text).await?;
        }
        CallbackAction::AdminExpire => {
            let text = match channel::expire_stale_listings(&bot, &state).await {
                Ok(n) => format!(
                    "⌛ Expired {} listing(s) older than {} days.",
                    n, state.config.listings.max_age_days
                ),
                Err(e) => {
                    error!("Expiry sweep failed: {}", e);
                    "❌ Could not load listings. Please try again later.".to_string()
                }
            };
            edit_origin(&bot, &q, text).await?;
        }
        CallbackAction::AdminStats => {
            let text = match state.store.all().await {
                Ok(listings) => formatters::stats_text(&compute_stats(&listings)),
                Err(e) => {
                    error!("Stats failed: {}", e);
                    "❌ Could not load listings. Please try again later.".to_string()
                }
            };
            if let Some(message) = &q.message {
                bot.edit_message_text(message.chat.id, message.id, text)
                    .parse_mode(ParseMode::Html)
                    .reply_markup(formatters::admin_keyboard())
                    .await?;
            }
        }
    }

    Ok(())
}

async fn confirm_post(bot: &Bot, q: &CallbackQuery, dialogue: &RedistDialogue, state: &BotState) -> HandlerResult {
    let Some(State::Confirm(draft)) = dialogue.get().await? else {
        return edit_origin(bot, q, "ℹ️ This listing has already been handled.").await;
    };
    dialogue.exit().await?;

    let poster = Poster {
        user_id: q.from.id.0,
        full_name: q.from.full_name(),
        username: q.from.username.clone(),
    };

    let text = match channel::publish_listing(bot, state, &poster, draft).await {
        Ok(listing_id) => {
            info!("Listing {} posted by {}", listing_id, poster.user_id);
            "✅ Your item has been listed in the channel!\n\n\
             Thank you for contributing to sustainability ♻️"
        }
        Err(RedistError::Telegram(e)) => {
            error!("Error posting to channel: {}", e);
            "❌ Failed to post to channel. Please try again later."
        }
        Err(e) => {
            error!("Error creating listing: {}", e);
            "❌ Failed to create listing. Please try again."
        }
    };
    edit_origin(bot, q, text).await
}

async fn approve(bot: &Bot, q: &CallbackQuery, state: &BotState, listing_id: &str, claim_id: &str) -> HandlerResult {
    let donor = q.from.id.0;
    let now = Utc::now();
    let result = update_listing(state.store.as_ref(), listing_id, state.retries(), |listing| {
        Ok(listing.approve_claim(claim_id, donor, now)?)
    })
    .await;

    let (listing, claim) = match result {
        Ok(done) => done,
        Err(e) => return edit_origin(bot, q, decision_failure(&e)).await,
    };
    info!("Claim {} on {} approved ({} left)", claim_id, listing_id, listing.remaining);

    channel::refresh_post(bot, state, listing_id, &listing).await;
    notify(
        bot,
        claim.user_id,
        formatters::approved_text(&listing, &claim, &formatters::user_handle(&q.from)),
    )
    .await;

    edit_origin(
        bot,
        q,
        format!(
            "✅ Approved {} × {} for {}.",
            claim.qty,
            teloxide::utils::html::escape(&listing.item),
            teloxide::utils::html::escape(&claim.username),
        ),
    )
    .await
}

async fn reject(bot: &Bot, q: &CallbackQuery, state: &BotState, listing_id: &str, claim_id: &str) -> HandlerResult {
    let donor = q.from.id.0;
    let now = Utc::now();
    let result = update_listing(state.store.as_ref(), listing_id, state.retries(), |listing| {
        Ok(listing.reject_claim(claim_id, donor, now)?)
    })
    .await;

    let (listing, claim) = match result {
        Ok(done) => done,
        Err(e) => return edit_origin(bot, q, decision_failure(&e)).await,
    };

    notify(
        bot,
        claim.user_id,
        formatters::rejected_text(&listing, &claim, &formatters::user_handle(&q.from)),
    )
    .await;
    edit_origin(bot, q, "❌ Claim rejected.").await
}

async fn suggest(
    bot: &Bot,
    q: &CallbackQuery,
    dialogue: &RedistDialogue,
    state: &BotState,
    listing_id: String,
    claim_id: String,
) -> HandlerResult {
    let checked = match state.store.fetch(&listing_id).await {
        Ok(Some(current)) => current
            .value
            .pending_claim(&claim_id, q.from.id.0)
            .map(|_| ())
            .map_err(RedistError::from),
        Ok(None) => Err(RedistError::ListingNotFound(listing_id.clone())),
        Err(e) => Err(e),
    };
    if let Err(e) = checked {
        return edit_origin(bot, q, decision_failure(&e)).await;
    }

    dialogue
        .update(State::Reschedule(PendingReschedule { listing_id, claim_id }))
        .await?;
    edit_origin(bot, q, formatters::reschedule_prompt_text()).await
}

async fn accept_time(bot: &Bot, q: &CallbackQuery, state: &BotState, listing_id: &str, claim_id: &str) -> HandlerResult {
    let requester = q.from.id.0;
    let now = Utc::now();
    let result = update_listing(state.store.as_ref(), listing_id, state.retries(), |listing| {
        Ok(listing.accept_proposed_time(claim_id, requester, now)?)
    })
    .await;

    let (listing, claim) = match result {
        Ok(done) => done,
        Err(e) => return edit_origin(bot, q, decision_failure(&e)).await,
    };
    info!("Rescheduled claim {} on {} confirmed", claim_id, listing_id);

    channel::refresh_post(bot, state, listing_id, &listing).await;
    notify(bot, requester, formatters::reschedule_confirmed_requester_text(&listing, &claim)).await;
    notify(
        bot,
        listing.user_id,
        formatters::reschedule_confirmed_donor_text(&listing, &claim, &formatters::user_handle(&q.from)),
    )
    .await;

    edit_origin(bot, q, "✅ New pickup time confirmed. The claim has been approved.").await
}

async fn decline_time(
    bot: &Bot,
    q: &CallbackQuery,
    state: &BotState,
    listing_id: &str,
    claim_id: &str,
) -> HandlerResult {
    let requester = q.from.id.0;
    let now = Utc::now();
    let result = update_listing(state.store.as_ref(), listing_id, state.retries(), |listing| {
        Ok(listing.decline_proposed_time(claim_id, requester, now)?)
    })
    .await;

    let (listing, claim) = match result {
        Ok(done) => done,
        Err(e) => return edit_origin(bot, q, decision_failure(&e)).await,
    };
    notify(
        bot,
        listing.user_id,
        formatters::reschedule_declined_text(&listing, &claim, &formatters::user_handle(&q.from)),
    )
    .await;
    edit_origin(
        bot,
        q,
        "❌ You declined the proposed time. \
         You may coordinate directly with the donor via Telegram messages.",
    )
    .await
}
