//! Browser engine seam.
//!
//! The registry and the validation workflow only see these two traits, so
//! the Chromium implementation can be swapped for a scripted one in tests.

use async_trait::async_trait;
use thiserror::Error;

/// Errors raised while driving an open page.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Navigation failed: {0}")]
    NavigationFailed(String),

    #[error("Browser connection closed: {0}")]
    Disconnected(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("CDP error: {0}")]
    Cdp(String),
}

impl BrowserError {
    /// Whether the underlying browser is gone and the session must be discarded.
    #[must_use]
    pub const fn is_disconnected(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }

    /// Classifies a raw engine error message.
    pub(crate) fn from_engine_message(message: String) -> Self {
        if message.contains("AlreadyClosed")
            || message.contains("ConnectionClosed")
            || message.contains("channel closed")
            || message.contains("ChannelSendError")
        {
            Self::Disconnected(message)
        } else {
            Self::Cdp(message)
        }
    }
}

/// A browser or page could not be created for an identity.
#[derive(Debug, Error)]
pub enum SessionLaunchError {
    #[error("Invalid browser configuration: {0}")]
    Config(String),

    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Failed to open page: {0}")]
    Page(String),
}

/// One open page on an automated browser, exclusively owned by a session.
#[async_trait]
pub trait ProviderPage: Send + Sync + 'static {
    /// Navigates to `url` and waits for the load to finish.
    async fn goto(&self, url: &str) -> Result<(), BrowserError>;

    /// Replaces the value of the input matched by `selector`.
    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError>;

    /// Clicks the element matched by `selector`.
    async fn click(&self, selector: &str) -> Result<(), BrowserError>;

    /// Whether an element matches `selector` right now.
    async fn is_present(&self, selector: &str) -> Result<bool, BrowserError>;

    /// Returns the visible text of the element, or `None` when it is absent.
    async fn text_of(&self, selector: &str) -> Result<Option<String>, BrowserError>;

    /// Closes the page and the browser process behind it.
    ///
    /// Best effort: every step is attempted even if an earlier one fails.
    async fn close(self);
}

/// Launches one fresh browser page per call.
#[async_trait]
pub trait BrowserEngine: Send + Sync + 'static {
    type Page: ProviderPage;

    async fn launch(&self) -> Result<Self::Page, SessionLaunchError>;
}
