//! Receives Telegram updates and routes text messages to the command handler.
//!
//! Updates arrive by long polling, or on `<WEBHOOK_URL>/webhook` when a
//! webhook URL is configured. The dispatcher stops on Ctrl+C.

use std::sync::Arc;

use teloxide::RequestError;
use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;
use teloxide::requests::ResponseResult;
use teloxide::update_listeners::webhooks;
use tracing::{info, warn};

use super::channel::{ChannelError, MessageChannel, TelegramChannel};
use crate::commands::{CommandHandler, CommandResult, IncomingMessage};
use crate::config::TelegramConfig;
use crate::session::{BrowserEngine, UserIdentity};

/// Handler tree: every message update goes to [`handle_message`].
pub fn schema<E: BrowserEngine>() -> UpdateHandler<RequestError> {
    Update::filter_message().endpoint(handle_message::<E>)
}

/// Extracts the parts of a message the command handler needs.
///
/// Messages without text or without a sender are skipped.
pub fn incoming_message(msg: &Message) -> Option<IncomingMessage> {
    let from = msg.from.as_ref()?;
    let text = msg.text()?;
    Some(IncomingMessage {
        user: UserIdentity::from(from.id),
        chat_id: msg.chat.id.0,
        message_id: msg.id.0,
        text: text.to_owned(),
    })
}

async fn handle_message<E: BrowserEngine>(
    msg: Message,
    handler: Arc<CommandHandler<E>>,
    channel: Arc<TelegramChannel>,
) -> ResponseResult<()> {
    let Some(incoming) = incoming_message(&msg) else {
        return Ok(());
    };

    if let Some(result) = handler.handle(&incoming).await {
        deliver_replies(channel.as_ref(), incoming.chat_id, &result).await;
    }
    Ok(())
}

/// Sends every reply of `result` in order, skipping ones that fail.
///
/// Returns how many were delivered.
pub async fn deliver_replies(
    channel: &dyn MessageChannel,
    chat_id: i64,
    result: &CommandResult,
) -> usize {
    let mut delivered = 0;
    for reply in &result.messages {
        match channel.send_text(chat_id, reply).await {
            Ok(()) => delivered += 1,
            Err(e) => warn!(chat = chat_id, "Failed to send reply: {}", e),
        }
    }
    delivered
}

/// Runs the dispatcher until Ctrl+C.
pub async fn run_dispatcher<E: BrowserEngine>(
    bot: Bot,
    config: &TelegramConfig,
    handler: Arc<CommandHandler<E>>,
    channel: Arc<TelegramChannel>,
) -> Result<(), ChannelError> {
    let mut dispatcher = Dispatcher::builder(bot.clone(), schema::<E>())
        .dependencies(dptree::deps![handler, channel])
        .enable_ctrlc_handler()
        .build();

    if let Some(url) = &config.webhook_url {
        info!("Receiving updates via webhook at {}", url);
        let listener =
            webhooks::axum(bot, webhooks::Options::new(config.listen_addr, url.clone())).await?;
        dispatcher
            .dispatch_with_listener(
                listener,
                LoggingErrorHandler::with_custom_text("An error from the update listener"),
            )
            .await;
    } else {
        info!("Receiving updates via long polling");
        bot.delete_webhook().await?;
        dispatcher.dispatch().await;
    }

    info!("Dispatcher stopped");
    Ok(())
}
