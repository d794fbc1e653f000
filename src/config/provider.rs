//! Provider site description: URLs, selectors and timeouts.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while loading or validating a provider description.
#[derive(Debug, Error)]
pub enum ProviderConfigError {
    #[error("Selector '{field}' is empty")]
    EmptySelector { field: &'static str },

    #[error("Login URL must be an http(s) URL, got: {url}")]
    InvalidLoginUrl { url: String },

    #[error("Timeout '{field}' must be greater than zero")]
    ZeroTimeout { field: &'static str },

    #[error("Failed to read provider file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse provider file: {0}")]
    ParseError(#[from] serde_json::Error),
}

/// CSS selectors of the elements the workflow interacts with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Selectors {
    /// Phone number input of the login form.
    pub phone_input: String,

    /// Password input of the login form.
    pub password_input: String,

    /// Login form submit button.
    pub submit_button: String,

    /// Element whose text is the account balance.
    pub balance: String,

    /// Control that asks the provider to refresh the balance.
    pub refresh_button: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            phone_input: "input[name='phone']".to_owned(),
            password_input: "input[type='password']".to_owned(),
            submit_button: "button.af-button".to_owned(),
            balance: ".m-balance".to_owned(),
            refresh_button: "#j_refreshBalance".to_owned(),
        }
    }
}

/// Bounded waits applied to page interactions, in milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Timeouts {
    /// Navigation to the login page.
    pub navigation_ms: u64,

    /// Waiting for the balance indicator after submitting the login form.
    pub balance_wait_ms: u64,

    /// Any single fill, click or read.
    pub action_ms: u64,

    /// Settle delay between clicking refresh and reading the balance.
    pub refresh_settle_ms: u64,

    /// Polling interval while waiting for an element.
    pub poll_interval_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            navigation_ms: 90_000,
            balance_wait_ms: 30_000,
            action_ms: 10_000,
            refresh_settle_ms: 6_000,
            poll_interval_ms: 250,
        }
    }
}

impl Timeouts {
    #[must_use]
    pub const fn navigation(&self) -> Duration {
        Duration::from_millis(self.navigation_ms)
    }

    #[must_use]
    pub const fn balance_wait(&self) -> Duration {
        Duration::from_millis(self.balance_wait_ms)
    }

    #[must_use]
    pub const fn action(&self) -> Duration {
        Duration::from_millis(self.action_ms)
    }

    #[must_use]
    pub const fn refresh_settle(&self) -> Duration {
        Duration::from_millis(self.refresh_settle_ms)
    }

    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Upper bound on a login interaction.
    #[must_use]
    pub fn login_budget(&self) -> Duration {
        self.navigation() + self.action() * 3 + self.balance_wait() + self.action()
    }

    /// Upper bound on a refresh interaction.
    #[must_use]
    pub fn refresh_budget(&self) -> Duration {
        self.action() * 2 + self.refresh_settle()
    }
}

/// Everything the workflow needs to know about the provider's web UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    /// Human-readable provider name used in replies and logs.
    #[serde(default = "default_name")]
    pub name: String,

    /// Page hosting the login form.
    pub login_url: String,

    #[serde(default)]
    pub selectors: Selectors,

    #[serde(default)]
    pub timeouts: Timeouts,
}

fn default_name() -> String {
    "SportyBet".to_owned()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            login_url: "https://www.sportybet.com/ng/login".to_owned(),
            selectors: Selectors::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl ProviderConfig {
    /// Loads the provider description from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ProviderConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Loads the file if it exists, otherwise returns the built-in defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ProviderConfigError> {
        let path = path.as_ref();
        if path.exists() {
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Saves the provider description to a JSON file.
    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ProviderConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the provider description, returning the first problem found.
    pub fn validate(&self) -> Result<(), ProviderConfigError> {
        self.validate_all().into_iter().next().map_or(Ok(()), Err)
    }

    /// Returns every problem in the provider description.
    #[must_use]
    pub fn validate_all(&self) -> Vec<ProviderConfigError> {
        let mut problems = Vec::new();

        if !(self.login_url.starts_with("https://") || self.login_url.starts_with("http://")) {
            problems.push(ProviderConfigError::InvalidLoginUrl {
                url: self.login_url.clone(),
            });
        }

        let selectors = [
            ("phone_input", &self.selectors.phone_input),
            ("password_input", &self.selectors.password_input),
            ("submit_button", &self.selectors.submit_button),
            ("balance", &self.selectors.balance),
            ("refresh_button", &self.selectors.refresh_button),
        ];
        for (field, selector) in selectors {
            if selector.trim().is_empty() {
                problems.push(ProviderConfigError::EmptySelector { field });
            }
        }

        let timeouts = [
            ("navigation_ms", self.timeouts.navigation_ms),
            ("balance_wait_ms", self.timeouts.balance_wait_ms),
            ("action_ms", self.timeouts.action_ms),
            ("poll_interval_ms", self.timeouts.poll_interval_ms),
        ];
        for (field, value) in timeouts {
            if value == 0 {
                problems.push(ProviderConfigError::ZeroTimeout { field });
            }
        }

        problems
    }

    /// Creates an example configuration for users to reference.
    #[must_use]
    pub fn example() -> Self {
        Self::default()
    }
}
