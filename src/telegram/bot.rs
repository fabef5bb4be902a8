use std::sync::Arc;
use std::time::Duration;
use teloxide::{
    dispatching::{dialogue, dialogue::InMemStorage, UpdateHandler},
    prelude::*,
    types::Recipient,
    utils::command::BotCommands,
};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{RedistError, Result};
use crate::listing::ListingDraft;
use crate::storage::{open_store, ListingStore};
use crate::telegram::{callbacks, channel, commands, conversation};

pub type RedistDialogue = Dialogue<State, InMemStorage<State>>;
pub type HandlerResult = Result<()>;

/// State shared across all bot handlers
pub struct BotState {
    pub config: Config,
    pub store: Arc<dyn ListingStore>,
    pub bot_username: String,
    pub channel: Recipient,
}

impl BotState {
    pub fn max_age(&self) -> chrono::Duration {
        self.config.max_listing_age()
    }

    pub fn retries(&self) -> u32 {
        self.config.listings.max_conflict_retries
    }
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "Show main menu")]
    Start(String),
    #[command(description = "List a new item")]
    NewItem,
    #[command(description = "How the bot works")]
    Instructions,
    #[command(description = "Cancel current action")]
    Cancel,
    #[command(description = "Admin panel (authorised users only)")]
    Admin,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingClaim {
    pub listing_id: String,
    pub max_qty: u32,
    pub qty: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingReschedule {
    pub listing_id: String,
    pub claim_id: String,
}

/// Per-chat conversation position.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum State {
    #[default]
    Idle,
    ReceiveItem,
    ReceiveQuantity(ListingDraft),
    ReceiveSize(ListingDraft),
    ReceiveExpiry(ListingDraft),
    ReceiveLocation(ListingDraft),
    ReceivePhoto(ListingDraft),
    Confirm(ListingDraft),
    ClaimQuantity(PendingClaim),
    ClaimPickup(PendingClaim),
    Reschedule(PendingReschedule),
}

pub fn schema() -> UpdateHandler<RedistError> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>().endpoint(commands::answer);

    let message_handler = Update::filter_message()
        .filter(|msg: Message| msg.chat.is_private())
        .branch(command_handler)
        .branch(
            dptree::filter(|msg: Message| msg.text().map_or(false, conversation::looks_like_command))
                .endpoint(conversation::unknown_command),
        )
        .branch(case![State::ReceiveItem].endpoint(conversation::receive_item))
        .branch(case![State::ReceiveQuantity(draft)].endpoint(conversation::receive_quantity))
        .branch(case![State::ReceiveSize(draft)].endpoint(conversation::receive_size))
        .branch(case![State::ReceiveExpiry(draft)].endpoint(conversation::receive_expiry))
        .branch(case![State::ReceiveLocation(draft)].endpoint(conversation::receive_location))
        .branch(case![State::ReceivePhoto(draft)].endpoint(conversation::receive_photo))
        .branch(case![State::Confirm(draft)].endpoint(conversation::awaiting_confirmation))
        .branch(case![State::ClaimQuantity(claim)].endpoint(conversation::receive_claim_quantity))
        .branch(case![State::ClaimPickup(claim)].endpoint(conversation::receive_pickup_time))
        .branch(case![State::Reschedule(request)].endpoint(conversation::receive_new_time))
        .branch(dptree::endpoint(conversation::idle_message));

    let callback_handler = Update::filter_callback_query().endpoint(callbacks::handle_callback);

    dialogue::enter::<Update, InMemStorage<State>, State, _>()
        .branch(message_handler)
        .branch(callback_handler)
}

pub async fn run_telegram_bot(config: Config) -> Result<()> {
    config.validate()?;

    info!("Starting Telegram bot...");

    let bot = Bot::new(config.telegram.bot_token.clone());
    let me = bot.get_me().await?;
    let bot_username = me
        .user
        .username
        .clone()
        .ok_or_else(|| RedistError::Config("The bot account has no username".to_string()))?;
    info!("Running as @{}", bot_username);

    bot.delete_webhook().drop_pending_updates(true).await?;
    bot.set_my_commands(Command::bot_commands()).await?;

    let store = open_store(&config)?;
    let state = Arc::new(BotState {
        channel: config.channel_recipient()?,
        config,
        store,
        bot_username,
    });

    if state.config.server.enabled {
        let port = state.config.server.port;
        tokio::spawn(async move {
            if let Err(e) = crate::server::serve(port).await {
                error!("Keep-alive server stopped: {}", e);
            }
        });
    }

    let sweep_every = state.config.listings.sweep_interval_secs;
    if sweep_every > 0 {
        tokio::spawn(sweep_stale_listings(bot.clone(), state.clone(), sweep_every));
    }

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![InMemStorage::<State>::new(), state])
        .default_handler(|upd| async move {
            tracing::debug!("Unhandled update: {:?}", upd.kind);
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn sweep_stale_listings(bot: Bot, state: Arc<BotState>, every_secs: u64) {
    info!("Stale listing sweep every {}s", every_secs);
    let mut ticker = tokio::time::interval(Duration::from_secs(every_secs));

    loop {
        ticker.tick().await;
        match channel::expire_stale_listings(&bot, &state).await {
            Ok(0) => {}
            Ok(n) => info!("Expired {} stale listing(s)", n),
            Err(e) => warn!("Stale listing sweep failed: {}", e),
        }
    }
}
