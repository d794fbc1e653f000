//! Configuration module for the bot.
//!
//! Handles loading and validation of the provider description (URLs,
//! selectors, timeouts) and of the environment-driven settings.

mod provider;
mod settings;

pub use provider::{ProviderConfig, ProviderConfigError, Selectors, Timeouts};
pub use settings::{BotSettings, BrowserSettings, ConfigError, TelegramConfig};
