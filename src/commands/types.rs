//! Command types and definitions.

use std::fmt;

/// Available bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    /// Show the welcome message.
    Start,

    /// Show help information.
    Help,

    /// Start the phone/password conversation.
    Login,

    /// Continue without logging in.
    Skip,

    /// Refresh the balance on the logged-in session.
    Balance,

    /// Close the browser session and forget the login.
    Logout,
}

impl BotCommand {
    pub const ALL: [Self; 6] = [
        Self::Start,
        Self::Help,
        Self::Login,
        Self::Skip,
        Self::Balance,
        Self::Logout,
    ];

    /// Parses a command from a message text.
    ///
    /// Accepts `/name` and `/name@bot_username`, case-insensitively, and
    /// ignores anything after the first whitespace. Returns `None` if the
    /// message is not a known command.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let after_slash = text.strip_prefix('/')?;

        let word = after_slash
            .split_whitespace()
            .next()
            .unwrap_or_default();
        let name = word.split_once('@').map_or(word, |(name, _bot)| name);

        match name.to_lowercase().as_str() {
            "start" => Some(Self::Start),
            "help" => Some(Self::Help),
            "login" => Some(Self::Login),
            "skip" => Some(Self::Skip),
            "balance" => Some(Self::Balance),
            "logout" => Some(Self::Logout),
            _ => None,
        }
    }

    /// Whether `text` looks like a slash command at all.
    #[must_use]
    pub fn is_command_like(text: &str) -> bool {
        text.trim_start().starts_with('/')
    }

    /// Returns the command name as it appears in help.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Help => "help",
            Self::Login => "login",
            Self::Skip => "skip",
            Self::Balance => "balance",
            Self::Logout => "logout",
        }
    }

    /// Returns the command description for help.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Start => "Start the bot and see welcome options",
            Self::Help => "Display this help text",
            Self::Login => "Log in to your betting account",
            Self::Skip => "Skip login and use limited features",
            Self::Balance => "Refresh your account balance",
            Self::Logout => "Log out and close your browser session",
        }
    }
}

impl fmt::Display for BotCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.name())
    }
}

/// Result of command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Whether the command did what the user asked.
    pub success: bool,

    /// Replies to send, in order.
    pub messages: Vec<String>,
}

impl CommandResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            messages: vec![message.into()],
        }
    }

    /// Creates an error result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            messages: vec![message.into()],
        }
    }

    /// Appends another reply.
    #[must_use]
    pub fn and_then_say(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    /// All replies joined, for logs and tests.
    #[must_use]
    pub fn text(&self) -> String {
        self.messages.join("\n")
    }
}
