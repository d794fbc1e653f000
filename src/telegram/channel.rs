//! Outgoing messaging over the Telegram Bot API.

use std::time::Duration;

use async_trait::async_trait;
use teloxide::RequestError;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors from the messaging channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Flood wait required: {0} seconds")]
    FloodWait(u32),

    #[error("Telegram API error: {0}")]
    Api(String),
}

impl From<RequestError> for ChannelError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::RetryAfter(wait) => Self::FloodWait(wait.seconds()),
            other => Self::Api(other.to_string()),
        }
    }
}

/// Send-text and delete-message capability of a chat platform.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), ChannelError>;

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), ChannelError>;
}

/// [`MessageChannel`] backed by a teloxide [`Bot`].
#[derive(Debug, Clone)]
pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    #[must_use]
    pub const fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl MessageChannel for TelegramChannel {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<(), ChannelError> {
        debug!("Sending to chat {}: \"{}\"", chat_id, truncate_for_log(text, 30));

        match self.bot.send_message(ChatId(chat_id), text).await {
            Ok(_) => Ok(()),
            Err(e) => match ChannelError::from(e) {
                ChannelError::FloodWait(seconds) => {
                    // One retry once Telegram lets us.
                    warn!("Flood wait triggered: {} seconds", seconds);
                    tokio::time::sleep(Duration::from_secs(u64::from(seconds))).await;
                    self.bot.send_message(ChatId(chat_id), text).await?;
                    Ok(())
                }
                other => Err(other),
            },
        }
    }

    async fn delete_message(&self, chat_id: i64, message_id: i32) -> Result<(), ChannelError> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id))
            .await?;
        Ok(())
    }
}

/// Masks a phone number for logging, keeping the last four digits.
pub fn mask_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    if digits.len() > 4 {
        format!("***{}", &digits[digits.len() - 4..])
    } else {
        "****".to_owned()
    }
}

/// Truncates a string for logging purposes.
fn truncate_for_log(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", s.chars().take(max_len).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_phone() {
        assert_eq!(mask_phone("08012345678"), "***5678");
        assert_eq!(mask_phone("123"), "****");
        assert_eq!(mask_phone("+234 801 234 5678"), "***5678");
        assert_eq!(mask_phone(""), "****");
    }

    #[test]
    fn test_truncate_for_log() {
        assert_eq!(truncate_for_log("Hello", 10), "Hello");
        assert_eq!(truncate_for_log("Your balance is: ₦1,000.00", 4), "Your...");
    }

    #[test]
    fn test_retry_after_maps_to_flood_wait() {
        let err = RequestError::RetryAfter(teloxide::types::Seconds::from_seconds(12));
        assert!(matches!(ChannelError::from(err), ChannelError::FloodWait(12)));
    }
}
