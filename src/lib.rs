//! `BetNudge` Bot Library
//!
//! A Telegram bot that logs into a betting provider with a user's
//! credentials through a headless browser and reports the account balance.
//!
//! This crate provides the core functionality for:
//! - Keeping one browser session per chat user
//! - Driving the provider's login form and balance refresh
//! - Storing bcrypt-hashed credentials after a successful login
//! - Deleting password messages from the chat after a delay
//! - Handling user commands via chat messages

pub mod commands;
pub mod config;
pub mod session;
pub mod store;
pub mod telegram;
pub mod workflow;
