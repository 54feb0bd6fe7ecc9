//! Telegram Bot Runner
//!
//! Long-polling dispatcher that feeds text messages into the pipeline.
//! teloxide dispatches updates of one chat sequentially, so a subject's
//! human delay only holds up that subject.
//!
//! Only private chats are served. There the chat id equals the sender's user
//! id, so the subject id is both the person and the reply target. Group
//! messages are ignored.

use anyhow::Result;
use std::sync::Arc;
use teloxide::{
    dispatching::{Dispatcher, UpdateFilterExt},
    dptree,
    error_handlers::LoggingErrorHandler,
    prelude::*,
    types::{ChatId, Update},
};

use crate::pipeline::{IncomingMessage, Pipeline, TurnOutcome};
use crate::prompts;

/// Run the bot until the dispatcher stops (Ctrl-C)
pub async fn run_bot(bot: Bot, pipeline: Arc<Pipeline>) -> Result<()> {
    tracing::info!("===========================================");
    tracing::info!("  ErgoBot Telegram - Starting...");
    tracing::info!("===========================================");

    // Verify bot token by calling getMe
    tracing::info!("Verifying bot token...");
    match bot.get_me().await {
        Ok(me) => {
            tracing::info!(
                "Bot authenticated: @{} (ID: {})",
                me.username.as_deref().unwrap_or("unknown"),
                me.id
            );
        }
        Err(e) => {
            tracing::error!("Failed to authenticate bot: {}", e);
            anyhow::bail!("Bot authentication failed: {}", e);
        }
    }

    // Delete any existing webhook to ensure polling works
    tracing::info!("Clearing webhook (if any)...");
    if let Err(e) = bot.delete_webhook().await {
        tracing::warn!("Failed to delete webhook: {} (continuing anyway)", e);
    }

    let handler = dptree::entry().branch(Update::filter_message().endpoint(message_handler));

    tracing::info!("Starting dispatcher with long polling...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![pipeline])
        .default_handler(|upd| async move {
            tracing::debug!("Unhandled update: {:?}", upd);
        })
        .error_handler(LoggingErrorHandler::with_custom_text(
            "Error in message handler",
        ))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::warn!("Dispatcher stopped");
    Ok(())
}

/// Message handler endpoint for the dispatcher
async fn message_handler(bot: Bot, msg: Message, pipeline: Arc<Pipeline>) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        tracing::debug!("Ignoring non-text message in chat {}", msg.chat.id);
        return Ok(());
    };
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    let Some(subject_id) = subject_for(msg.chat.id, msg.chat.is_private()) else {
        tracing::debug!("Ignoring message from non-private chat {}", msg.chat.id);
        return Ok(());
    };
    let preview: String = text.chars().take(50).collect();
    tracing::info!(">>> Message received: subject={}, text={:?}", subject_id, preview);

    let username = user.username.clone();
    let first_name = Some(user.first_name.clone()).filter(|n| !n.is_empty());

    if is_start_command(text) {
        if let Err(e) = pipeline
            .greet(subject_id, username.as_deref(), first_name.as_deref())
            .await
        {
            tracing::error!("Greeting failed for {}: {:#}", subject_id, e);
        }
        return Ok(());
    }

    let incoming = IncomingMessage {
        subject_id,
        username,
        first_name,
        text: text.to_string(),
    };

    match pipeline.handle_incoming(incoming).await {
        Ok(TurnOutcome::Replied { messages, .. }) => {
            tracing::debug!("Turn for {} done, {} message(s)", subject_id, messages.len());
        }
        Ok(TurnOutcome::Skipped(reason)) => {
            tracing::debug!("Turn for {} skipped: {:?}", subject_id, reason);
        }
        Err(e) => {
            tracing::error!("Error handling message from {}: {:#}", subject_id, e);
            bot.send_message(msg.chat.id, prompts::APOLOGY_REPLY).await?;
        }
    }

    Ok(())
}

/// Subject id for a chat, `None` outside private chats
pub fn subject_for(chat_id: ChatId, private: bool) -> Option<i64> {
    private.then_some(chat_id.0)
}

/// `/start`, `/start@BotName` or `/start <payload>`
pub fn is_start_command(text: &str) -> bool {
    let command = text.split_whitespace().next().unwrap_or("");
    command == "/start" || command.starts_with("/start@")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_command() {
        assert!(is_start_command("/start"));
        assert!(is_start_command("/start@ergo_bot"));
        assert!(is_start_command("/start ref123"));
        assert!(!is_start_command("/starten"));
        assert!(!is_start_command("start"));
        assert!(!is_start_command("hi /start"));
    }

    #[test]
    fn test_only_private_chats_are_subjects() {
        assert_eq!(subject_for(ChatId(123_456), true), Some(123_456));
        assert_eq!(subject_for(ChatId(-1_001_234), false), None);
    }
}
