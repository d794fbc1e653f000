//! Application settings and Telegram configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Telegram Bot API configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token issued by `@BotFather`.
    pub bot_token: String,

    /// Public base URL; when set, updates are received on `<url>/webhook`.
    pub webhook_url: Option<Url>,

    /// Local address the webhook server binds to.
    pub listen_addr: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8000)
}

impl TelegramConfig {
    /// Creates a long-polling configuration for the given token.
    #[must_use]
    pub fn new(bot_token: String) -> Self {
        Self {
            bot_token,
            webhook_url: None,
            listen_addr: default_listen_addr(),
        }
    }

    /// Creates configuration from environment variables.
    ///
    /// Expects `TELEGRAM_BOT_TOKEN` to be set; `WEBHOOK_URL`, `API_HOST`
    /// and `API_PORT` are optional.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bot_token = lookup("TELEGRAM_BOT_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingEnvVar("TELEGRAM_BOT_TOKEN"))?;

        let webhook_url = match lookup("WEBHOOK_URL").filter(|u| !u.trim().is_empty()) {
            Some(raw) => {
                let base = Url::parse(raw.trim_end_matches('/'))
                    .map_err(|_| ConfigError::InvalidWebhookUrl(raw.clone()))?;
                let full = Url::parse(&format!("{}/webhook", base.as_str().trim_end_matches('/')))
                    .map_err(|_| ConfigError::InvalidWebhookUrl(raw))?;
                Some(full)
            }
            None => None,
        };

        let host: IpAddr = match lookup("API_HOST") {
            Some(host) => host.parse().map_err(|_| ConfigError::InvalidValue("API_HOST"))?,
            None => default_listen_addr().ip(),
        };
        let port: u16 = match lookup("API_PORT") {
            Some(port) => port.parse().map_err(|_| ConfigError::InvalidValue("API_PORT"))?,
            None => default_listen_addr().port(),
        };

        Ok(Self {
            bot_token,
            webhook_url,
            listen_addr: SocketAddr::new(host, port),
        })
    }
}

/// Headless browser launch settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BrowserSettings {
    /// Explicit browser executable; auto-detected when absent.
    pub chrome_path: Option<PathBuf>,

    /// Run without a visible window.
    pub headless: bool,

    /// Pass `--no-sandbox` (needed in some containers).
    pub no_sandbox: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            no_sandbox: false,
        }
    }
}

/// Bot-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// MongoDB connection string; the in-memory store is used when absent.
    pub mongo_uri: Option<String>,

    /// Upper bound on concurrently driven browser interactions.
    #[serde(default = "default_max_concurrent_scrapes")]
    pub max_concurrent_scrapes: usize,

    /// Delay before a password message is deleted, in seconds.
    #[serde(default = "default_redaction_delay")]
    pub redaction_delay_secs: u64,

    /// Idle time after which a browser session is closed; `0` disables eviction.
    #[serde(default = "default_idle_timeout")]
    pub session_idle_timeout_secs: u64,

    /// How long shutdown waits for pending message deletions, and for each
    /// busy session before abandoning it.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,

    #[serde(default)]
    pub browser: BrowserSettings,
}

fn default_max_concurrent_scrapes() -> usize {
    4
}

fn default_redaction_delay() -> u64 {
    40
}

fn default_idle_timeout() -> u64 {
    1800 // 30 minutes
}

fn default_shutdown_grace() -> u64 {
    10
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            mongo_uri: None,
            max_concurrent_scrapes: default_max_concurrent_scrapes(),
            redaction_delay_secs: default_redaction_delay(),
            session_idle_timeout_secs: default_idle_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
            browser: BrowserSettings::default(),
        }
    }
}

impl BotSettings {
    /// Creates bot settings from environment variables with defaults.
    #[must_use]
    pub fn from_env_with_defaults() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Creates bot settings from an arbitrary variable source.
    ///
    /// Unparseable values fall back to their defaults.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |key: &str, default: bool| {
            lookup(key).map_or(default, |v| {
                matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
            })
        };

        Self {
            mongo_uri: lookup("MONGO_URI").filter(|u| !u.trim().is_empty()),
            max_concurrent_scrapes: parse_var(&lookup, "MAX_CONCURRENT_SCRAPES")
                .filter(|&n: &usize| n > 0)
                .unwrap_or_else(default_max_concurrent_scrapes),
            redaction_delay_secs: parse_var(&lookup, "REDACTION_DELAY_SECS")
                .unwrap_or_else(default_redaction_delay),
            session_idle_timeout_secs: parse_var(&lookup, "SESSION_IDLE_TIMEOUT_SECS")
                .unwrap_or_else(default_idle_timeout),
            shutdown_grace_secs: parse_var(&lookup, "SHUTDOWN_GRACE_SECS")
                .unwrap_or_else(default_shutdown_grace),
            browser: BrowserSettings {
                chrome_path: lookup("CHROME_PATH")
                    .filter(|p| !p.trim().is_empty())
                    .map(PathBuf::from),
                headless: flag("BROWSER_HEADLESS", true),
                no_sandbox: flag("BROWSER_NO_SANDBOX", false),
            },
        }
    }

    #[must_use]
    pub const fn redaction_delay(&self) -> Duration {
        Duration::from_secs(self.redaction_delay_secs)
    }

    /// Idle eviction threshold, `None` when eviction is disabled.
    #[must_use]
    pub const fn session_idle_timeout(&self) -> Option<Duration> {
        if self.session_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.session_idle_timeout_secs))
        }
    }

    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|s| s.trim().parse().ok())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),

    #[error("Invalid webhook URL: {0}")]
    InvalidWebhookUrl(String),
}
