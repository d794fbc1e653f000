//! Chromium implementation of the browser engine seam.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::engine::{BrowserEngine, BrowserError, ProviderPage, SessionLaunchError};
use crate::config::BrowserSettings;

/// Executable names probed on `PATH` when no explicit path is configured.
const EXECUTABLE_CANDIDATES: [&str; 5] = [
    "google-chrome-stable",
    "google-chrome",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Timeout of individual CDP requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// How long a closed browser gets to exit before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Launches one headless Chromium process per session.
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    settings: BrowserSettings,
}

impl ChromiumEngine {
    #[must_use]
    pub fn new(settings: BrowserSettings) -> Self {
        Self { settings }
    }

    /// Returns the browser executable that will be used, if one can be found.
    #[must_use]
    pub fn resolve_executable(&self) -> Option<PathBuf> {
        if let Some(path) = &self.settings.chrome_path {
            return Some(path.clone());
        }
        EXECUTABLE_CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
    }

    fn browser_config(&self) -> Result<BrowserConfig, SessionLaunchError> {
        let mut builder = BrowserConfig::builder()
            .request_timeout(REQUEST_TIMEOUT)
            .launch_timeout(Duration::from_secs(20))
            .args([
                "--disable-background-networking",
                "--disable-dev-shm-usage",
                "--disable-extensions",
                "--disable-sync",
                "--no-first-run",
                "--no-default-browser-check",
                "--mute-audio",
            ]);

        if !self.settings.headless {
            builder = builder.with_head();
        }
        if self.settings.no_sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(path) = &self.settings.chrome_path {
            builder = builder.chrome_executable(path);
        }

        builder.build().map_err(SessionLaunchError::Config)
    }
}

#[async_trait]
impl BrowserEngine for ChromiumEngine {
    type Page = ChromiumPage;

    async fn launch(&self) -> Result<ChromiumPage, SessionLaunchError> {
        let config = self.browser_config()?;

        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| SessionLaunchError::Launch(e.to_string()))?;

        // The CDP connection only makes progress while its handler is polled.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("CDP handler stopped: {}", e);
                    break;
                }
            }
        });

        match browser.new_page("about:blank").await {
            Ok(page) => Ok(ChromiumPage {
                browser,
                page,
                handler: handler_task,
            }),
            Err(e) => {
                shutdown_browser(&mut browser).await;
                handler_task.abort();
                Err(SessionLaunchError::Page(e.to_string()))
            }
        }
    }
}

/// A Chromium process, its CDP handler task and the single page driven on it.
pub struct ChromiumPage {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
}

impl std::fmt::Debug for ChromiumPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumPage")
            .field("handler_finished", &self.handler.is_finished())
            .finish_non_exhaustive()
    }
}

impl ChromiumPage {
    async fn find(&self, selector: &str) -> Result<chromiumoxide::element::Element, BrowserError> {
        self.page.find_element(selector).await.map_err(|e| {
            match BrowserError::from_engine_message(e.to_string()) {
                BrowserError::Cdp(_) => BrowserError::ElementNotFound(selector.to_owned()),
                other => other,
            }
        })
    }
}

fn engine_error(e: impl std::fmt::Display) -> BrowserError {
    BrowserError::from_engine_message(e.to_string())
}

/// Asks the browser to exit, killing it if it does not.
async fn shutdown_browser(browser: &mut Browser) {
    if let Err(e) = browser.close().await {
        warn!("Failed to close browser cleanly: {}", e);
    }
    let exited = matches!(timeout(EXIT_GRACE, browser.wait()).await, Ok(Ok(_)));
    if !exited
        && let Some(Err(e)) = browser.kill().await
    {
        warn!("Failed to kill browser process: {}", e);
    }
}

#[async_trait]
impl ProviderPage for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        self.page.goto(url).await.map_err(|e| {
            match BrowserError::from_engine_message(e.to_string()) {
                BrowserError::Cdp(message) => BrowserError::NavigationFailed(message),
                other => other,
            }
        })?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> Result<(), BrowserError> {
        let quoted = serde_json::to_string(selector).map_err(engine_error)?;
        let clear_js = format!(
            "(() => {{ const el = document.querySelector({quoted}); \
             if (!el) return false; \
             el.focus(); el.value = ''; \
             el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
             return true; }})()"
        );

        let found: bool = self
            .page
            .evaluate(clear_js.as_str())
            .await
            .map_err(engine_error)?
            .into_value()
            .unwrap_or(false);
        if !found {
            return Err(BrowserError::ElementNotFound(selector.to_owned()));
        }

        let element = self.find(selector).await?;
        element.click().await.map_err(engine_error)?;
        element.type_str(value).await.map_err(engine_error)?;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<(), BrowserError> {
        let element = self.find(selector).await?;
        element.click().await.map_err(engine_error)?;
        Ok(())
    }

    async fn is_present(&self, selector: &str) -> Result<bool, BrowserError> {
        match self.find(selector).await {
            Ok(_) => Ok(true),
            Err(BrowserError::ElementNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>, BrowserError> {
        let element = match self.find(selector).await {
            Ok(element) => element,
            Err(BrowserError::ElementNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        let text = element.inner_text().await.map_err(engine_error)?;
        Ok(text.map(|t| t.trim().to_owned()).filter(|t| !t.is_empty()))
    }

    async fn close(self) {
        let Self {
            mut browser,
            page,
            handler,
        } = self;

        if let Err(e) = page.close().await {
            warn!("Failed to close page: {}", e);
        }
        shutdown_browser(&mut browser).await;
        handler.abort();
    }
}
