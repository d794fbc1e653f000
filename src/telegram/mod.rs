//! Telegram messaging module.
//!
//! Provides the messaging-channel seam, its teloxide implementation, the
//! delayed redaction of password messages and the update listener.

mod channel;
mod listener;
mod redaction;

#[cfg(test)]
pub(crate) mod testing;

pub use channel::{ChannelError, MessageChannel, TelegramChannel, mask_phone};
pub use listener::{deliver_replies, incoming_message, run_dispatcher, schema};
pub use redaction::{RedactionFailure, RedactionScheduler};
