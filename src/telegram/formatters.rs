use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, User};
use teloxide::utils::html::escape;
use tracing::warn;
use url::Url;

use crate::listing::ListingDraft;
use crate::storage::{Claim, Listing, ListingStats, ListingStatus};
use crate::telegram::callbacks::CallbackAction;

const MEETUP_HINT: &str = "💬 On the day of the meetup, please drop them a message on Telegram \
                           to coordinate exact timing and location.";

/// `@username` when the user has one, otherwise their full name.
pub fn user_handle(user: &User) -> String {
    match &user.username {
        Some(username) => format!("@{}", username),
        None => user.full_name(),
    }
}

fn button(text: &str, action: CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(text, action.encode())
}

fn url_button(text: &str, link: &str) -> Option<InlineKeyboardButton> {
    match Url::parse(link) {
        Ok(url) => Some(InlineKeyboardButton::url(text, url)),
        Err(e) => {
            warn!("Not adding button for bad link {}: {}", link, e);
            None
        }
    }
}

pub fn claim_link(bot_username: &str, listing_id: &str) -> String {
    format!("https://t.me/{}?start=claim_{}", bot_username, listing_id)
}

pub fn claim_keyboard(bot_username: &str, listing_id: &str) -> Option<InlineKeyboardMarkup> {
    url_button("🤝 Claim", &claim_link(bot_username, listing_id))
        .map(|b| InlineKeyboardMarkup::new(vec![vec![b]]))
}

pub fn main_menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("📝 List New Item", CallbackAction::NewItem)],
        vec![button("📚 Instructions", CallbackAction::Instructions)],
    ])
}

pub fn new_item_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button("📝 List New Item", CallbackAction::NewItem)]])
}

pub fn welcome_text() -> &'static str {
    "👋 <b>Welcome to the Sustainability Redistribution Bot</b>\n\n\
     This bot helps hospital staff share excess consumables easily.\n\n\
     <b>Commands</b>\n\
     • /newitem – List an item for donation\n\
     • /instructions – How it works\n\
     • /cancel – Cancel the current action\n\n\
     Or use the buttons below."
}

pub fn idle_help_text() -> &'static str {
    "Hi! Use /newitem to list items, or tap a Claim button in the channel to request an item."
}

pub fn instructions_text(channel: &str) -> String {
    format!(
        "<b>📋 How to List an Item for Donation</b>\n\n\
         1. Type <b>/newitem</b> to start the listing process\n\
         2. You’ll be asked for:\n\
         \u{20}  • Item name\n\
         \u{20}  • Quantity (e.g. '10 boxes', '5 bottles')\n\
         \u{20}  • Size/Volume (or 'na')\n\
         \u{20}  • Expiry date (DD/MM/YYYY or 'na')\n\
         \u{20}  • Pickup location\n\
         \u{20}  • Optional photo\n\n\
         3. Your item will be posted in the channel\n\
         4. Others can claim by tapping the <b>‘Claim’</b> button\n\
         5. You’ll receive a request to approve, reject, or suggest a new time\n\n\
         💡 Quick start: type <b>/newitem</b>.\n\n\
         ⚠️ <b>Disclaimer</b>\n\
         • This bot may occasionally experience technical difficulties.\n\
         • If the bot is unresponsive, please post directly in the {} channel.",
        escape(channel)
    )
}

pub fn confirm_text(draft: &ListingDraft) -> String {
    format!(
        "📝 <b>Confirm Your Listing</b>\n\n\
         🧾 <b>Item:</b> {}\n\
         📦 <b>Quantity:</b> {}\n\
         📏 <b>Size:</b> {}\n\
         ⏰ <b>Expiry:</b> {}\n\
         📍 <b>Location:</b> {}\n\
         📸 <b>Photo:</b> {}\n\n\
         Post this to the channel?",
        escape(&draft.item),
        escape(&draft.qty_display),
        escape(&draft.size),
        escape(&draft.expiry),
        escape(&draft.location),
        if draft.photo_id.is_some() { "Attached" } else { "None" },
    )
}

pub fn confirm_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("✅ Post", CallbackAction::ConfirmPost),
        button("❌ Cancel", CallbackAction::CancelPost),
    ]])
}

/// First channel post for a listing.
pub fn new_listing_post(listing: &Listing) -> String {
    format!(
        "🆕 <b>New Item Available</b>\n\n\
         🧾 <b>Item:</b> {}\n\
         📦 <b>Quantity:</b> {}\n\
         📏 <b>Size:</b> {}\n\
         ⏰ <b>Expiry:</b> {}\n\
         📍 <b>Location:</b> {}\n\n\
         Posted by: {}",
        escape(&listing.item),
        escape(&listing.qty_display),
        escape(&listing.size),
        escape(&listing.expiry),
        escape(&listing.location),
        escape(&listing.user_name),
    )
}

/// Channel post after stock or status changed.
pub fn channel_status_text(listing: &Listing) -> String {
    let mut text = format!(
        "🧾 <b>{}</b>\n\
         📦 Quantity: {} (Remaining: {})\n\
         📏 Size: {}\n\
         ⏰ Expiry: {}\n\
         📍 {}",
        escape(&listing.item),
        escape(&listing.qty_display),
        listing.remaining,
        escape(&listing.size),
        escape(&listing.expiry),
        escape(&listing.location),
    );

    if listing.status == ListingStatus::Expired {
        text.push_str("\n\n⌛ <b>Listing expired</b>");
    } else if !listing.is_open() {
        text.push_str("\n\n✅ <b>Fully claimed!</b>");
    }
    text
}

pub fn claim_prompt_text(listing: &Listing, available: u32) -> String {
    format!(
        "You’re claiming <b>{}</b>.\n\n\
         📦 Available: {}\n\
         How many units would you like to claim?",
        escape(&listing.item),
        available
    )
}

pub fn claim_request_text(item: &str, claim: &Claim, requester: &str) -> String {
    format!(
        "📨 <b>New Claim Request</b>\n\n\
         🧾 <b>Item:</b> {}\n\
         🔢 <b>Quantity:</b> {}\n\
         👤 <b>From:</b> {}\n\
         ⏰ <b>Requested pickup:</b> {}\n\n\
         Please approve, reject, or suggest a new time:",
        escape(item),
        claim.qty,
        escape(requester),
        escape(&claim.pickup_time),
    )
}

pub fn decision_keyboard(listing_id: &str, claim_id: &str) -> InlineKeyboardMarkup {
    let listing_id = listing_id.to_string();
    let claim_id = claim_id.to_string();
    InlineKeyboardMarkup::new(vec![
        vec![
            button(
                "✅ Approve",
                CallbackAction::Approve {
                    listing_id: listing_id.clone(),
                    claim_id: claim_id.clone(),
                },
            ),
            button(
                "❌ Reject",
                CallbackAction::Reject {
                    listing_id: listing_id.clone(),
                    claim_id: claim_id.clone(),
                },
            ),
        ],
        vec![button(
            "🕒 Suggest new time",
            CallbackAction::Suggest { listing_id, claim_id },
        )],
    ])
}

pub fn approved_text(listing: &Listing, claim: &Claim, donor: &str) -> String {
    format!(
        "✅ Your claim for <b>{}</b> ({} units) has been <b>approved</b>!\n\n\
         ⏰ Pickup: {}\n\
         📍 Location: {}\n\n\
         👥 You can contact the donor at: {}\n{}",
        escape(&listing.item),
        claim.qty,
        escape(&claim.pickup_time),
        escape(&listing.location),
        escape(donor),
        MEETUP_HINT,
    )
}

pub fn rejected_text(listing: &Listing, claim: &Claim, donor: &str) -> String {
    format!(
        "❌ Your claim for <b>{}</b> ({} units) was rejected by the donor.\n\n\
         👥 You may contact the donor at: {} if you’d like to discuss alternatives.",
        escape(&listing.item),
        claim.qty,
        escape(donor),
    )
}

pub fn reschedule_prompt_text() -> &'static str {
    "🕒 Please type your <b>proposed new pickup time</b> in this chat.\n\n\
     Example: 'Next Mon, 3–4 pm' or 'Tomorrow 10 am'."
}

pub fn reschedule_proposal_text(listing: &Listing, claim: &Claim, donor: &str) -> String {
    format!(
        "📅 <b>New Pickup Time Suggested</b>\n\n\
         🧾 <b>Item:</b> {}\n\
         🔢 <b>Quantity:</b> {}\n\
         ⏰ <b>Original time:</b> {}\n\
         ⏰ <b>Proposed new time:</b> {}\n\n\
         👤 <b>From:</b> {}\n\n\
         Do you accept this new time?",
        escape(&listing.item),
        claim.qty,
        escape(&claim.pickup_time),
        escape(claim.proposed_time.as_deref().unwrap_or("")),
        escape(donor),
    )
}

pub fn reschedule_keyboard(listing_id: &str, claim_id: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button(
            "✅ Confirm new time",
            CallbackAction::AcceptTime {
                listing_id: listing_id.to_string(),
                claim_id: claim_id.to_string(),
            },
        )],
        vec![button(
            "❌ Decline new time",
            CallbackAction::DeclineTime {
                listing_id: listing_id.to_string(),
                claim_id: claim_id.to_string(),
            },
        )],
    ])
}

pub fn reschedule_confirmed_requester_text(listing: &Listing, claim: &Claim) -> String {
    format!(
        "✅ Your claim for <b>{}</b> ({} units) is <b>confirmed</b> with the new time.\n\n\
         ⏰ Pickup: {}\n\
         📍 Location: {}\n\n\
         👥 You can contact the donor at: {}\n{}",
        escape(&listing.item),
        claim.qty,
        escape(&claim.pickup_time),
        escape(&listing.location),
        escape(&listing.donor_handle()),
        MEETUP_HINT,
    )
}

pub fn reschedule_confirmed_donor_text(listing: &Listing, claim: &Claim, requester: &str) -> String {
    format!(
        "✅ <b>Rescheduled Pickup Confirmed</b>\n\n\
         🧾 <b>Item:</b> {}\n\
         🔢 <b>Quantity:</b> {}\n\
         ⏰ <b>Pickup:</b> {}\n\n\
         👥 Requester: {}\n{}",
        escape(&listing.item),
        claim.qty,
        escape(&claim.pickup_time),
        escape(requester),
        MEETUP_HINT,
    )
}

pub fn reschedule_declined_text(listing: &Listing, claim: &Claim, requester: &str) -> String {
    format!(
        "⚠️ <b>Reschedule Declined</b>\n\n\
         The requester for <b>{}</b> ({} units) declined the proposed new time.\n\n\
         👥 Requester: {}\n\n\
         You may message them directly to arrange another time.",
        escape(&listing.item),
        claim.qty,
        escape(requester),
    )
}

pub fn admin_panel_text() -> &'static str {
    "🛠 <b>Admin Panel</b>\n\n\
     • <b>Bump</b> re-posts a short reminder for every open listing, linking to the original post.\n\
     • <b>Expire</b> closes listings older than the configured age.\n\
     • <b>Stats</b> shows redistribution totals."
}

pub fn admin_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![button("🔁 Bump unclaimed listings", CallbackAction::AdminBump)],
        vec![button("⌛ Expire stale listings", CallbackAction::AdminExpire)],
        vec![button("📊 Stats", CallbackAction::AdminStats)],
    ])
}

pub fn bump_text(listing: &Listing) -> String {
    format!(
        "♻️ <b>Still Available</b>\n\n\
         🧾 <b>Item:</b> {}\n\
         📦 <b>Remaining:</b> {}\n\n\
         Tap below to view the original listing and claim it.",
        escape(&listing.item),
        listing.remaining,
    )
}

/// Link to the original post; only public channels have one.
pub fn bump_keyboard(channel_username: Option<&str>, message_id: i32) -> Option<InlineKeyboardMarkup> {
    let channel = channel_username?;
    url_button(
        "🔗 View listing & Claim",
        &format!("https://t.me/{}/{}", channel, message_id),
    )
    .map(|b| InlineKeyboardMarkup::new(vec![vec![b]]))
}

pub fn stats_text(stats: &ListingStats) -> String {
    format!(
        "📊 <b>Redistribution Statistics</b>\n\n\
         <b>Listings</b>\n\
         Total: {}\n\
         Available: {}\n\
         Fully claimed: {}\n\
         Expired: {}\n\n\
         <b>Claims</b>\n\
         Total: {}\n\
         Pending: {}\n\
         Approved: {}\n\n\
         <b>Units</b>\n\
         Listed: {}\n\
         Redistributed: {}",
        stats.total_listings,
        stats.available,
        stats.claimed,
        stats.expired,
        stats.total_claims,
        stats.pending_claims,
        stats.approved_claims,
        stats.units_listed,
        stats.units_redistributed,
    )
}
