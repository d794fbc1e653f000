//! Outcome of one login or refresh interaction.

use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::session::BrowserError;

/// Which interaction was driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interaction {
    Login,
    Refresh,
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Login => write!(f, "login"),
            Self::Refresh => write!(f, "refresh"),
        }
    }
}

/// Why an interaction did not produce a balance.
///
/// Never returned as an error to callers; it is logged and folded into a
/// failed [`ValidationOutcome`].
#[derive(Debug, Error)]
pub enum ValidationFailure {
    #[error("missing {0}")]
    MissingInput(&'static str),

    #[error("{step} failed: {source}")]
    Step {
        step: &'static str,
        #[source]
        source: BrowserError,
    },

    #[error("{step} timed out after {after:?}")]
    Timeout { step: &'static str, after: Duration },

    #[error("balance indicator did not appear within {0:?}")]
    BalanceNotShown(Duration),

    #[error("balance indicator is missing")]
    BalanceMissing,
}

impl ValidationFailure {
    /// Whether the browser behind the session is gone.
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        matches!(self, Self::Step { source, .. } if source.is_disconnected())
    }
}

/// Structured result of one validation or refresh attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub success: bool,

    /// Balance exactly as the provider displays it.
    pub balance: Option<String>,

    /// Plain sentence suitable for the user; set on failure.
    pub message: Option<String>,
}

impl ValidationOutcome {
    #[must_use]
    pub fn success(balance: impl Into<String>) -> Self {
        Self {
            success: true,
            balance: Some(balance.into()),
            message: None,
        }
    }

    /// Builds a failed outcome without leaking the internal diagnostic.
    #[must_use]
    pub fn failure(interaction: Interaction, failure: &ValidationFailure) -> Self {
        let message = match (failure, interaction) {
            (ValidationFailure::MissingInput(_), _) => "Phone number and password are required.",
            (_, Interaction::Login) => "Failed to login or fetch balance.",
            (_, Interaction::Refresh) => "Failed to refresh balance.",
        };
        Self {
            success: false,
            balance: None,
            message: Some(message.to_owned()),
        }
    }

    /// The user-facing failure sentence, or an empty string on success.
    #[must_use]
    pub fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or_default()
    }
}

/// What the login page looked like to a diagnostic probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub page_loaded: bool,
    pub phone_field: bool,
    pub password_field: bool,
    pub submit_button: bool,
}

impl ProbeReport {
    /// Whether a login could be attempted on this page.
    #[must_use]
    pub const fn is_healthy(&self) -> bool {
        self.page_loaded && self.phone_field && self.password_field && self.submit_button
    }
}
