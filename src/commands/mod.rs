//! Command handling module.
//!
//! Processes the slash commands and the phone/password conversation of
//! each user.

mod conversation;
mod handler;
mod types;

pub use conversation::{Conversation, Conversations, Step, validate_phone};
pub use handler::{CommandHandler, IncomingMessage};
pub use types::{BotCommand, CommandResult};
