//! `check-channel`: walks through what the bot needs to post listings.

use colored::*;
use teloxide::{prelude::*, RequestError};

use crate::config::Config;
use crate::error::Result;

fn fail(step: &str, e: &RequestError, hint: &str) {
    println!("{} {}: {}", "✗".red(), step, e);
    println!("  {} {}", "hint:".yellow(), hint);
}

/// Prints a report and returns whether a test post went through.
pub async fn check_channel(config: &Config) -> Result<bool> {
    config.validate()?;
    let channel = config.channel_recipient()?;
    let bot = Bot::new(config.telegram.bot_token.clone());

    println!("{}", "=== Channel Diagnostics ===".cyan().bold());

    let me = match bot.get_me().await {
        Ok(me) => me,
        Err(e) => {
            fail("getMe", &e, "Check BOT_TOKEN against the token @BotFather gave you.");
            return Ok(false);
        }
    };
    println!(
        "{} Bot: @{} (id {})",
        "✓".green(),
        me.user.username.as_deref().unwrap_or("?"),
        me.user.id.0
    );

    match bot.get_chat(channel.clone()).await {
        Ok(chat) => println!(
            "{} Channel: {} (id {})",
            "✓".green(),
            chat.title().unwrap_or("untitled"),
            chat.id.0
        ),
        Err(e) => {
            fail(
                "getChat",
                &e,
                "CHANNEL_ID must be @channelusername or the numeric -100... id, and the bot must be a member.",
            );
            return Ok(false);
        }
    }

    match bot.get_chat_member(channel.clone(), me.user.id).await {
        Ok(member) => {
            let status = format!("{:?}", member.status());
            if member.is_privileged() {
                println!("{} Bot membership: {}", "✓".green(), status);
            } else {
                println!("{} Bot membership: {}", "!".yellow(), status);
                println!(
                    "  {} Add the bot as a channel administrator with 'Post messages' rights.",
                    "hint:".yellow()
                );
            }
        }
        Err(e) => {
            fail("getChatMember", &e, "Add the bot to the channel as an administrator.");
            return Ok(false);
        }
    }

    let sent = match bot
        .send_message(channel.clone(), "🔧 Channel check from the redistribution bot. This message will be removed.")
        .await
    {
        Ok(message) => message,
        Err(e) => {
            fail("sendMessage", &e, "The bot needs the 'Post messages' admin right.");
            return Ok(false);
        }
    };
    println!("{} Test message posted (id {})", "✓".green(), sent.id.0);

    match bot.delete_message(channel, sent.id).await {
        Ok(_) => println!("{} Test message deleted", "✓".green()),
        Err(e) => fail(
            "deleteMessage",
            &e,
            "Grant 'Delete messages' or remove the test post by hand.",
        ),
    }

    println!("\n{}", "Channel is ready for listings.".green());
    Ok(true)
}
