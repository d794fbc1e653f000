//! Idle browser session reaper.
//!
//! Runs a simple loop:
//! 1. Every `check_interval`, close sessions idle for longer than `max_idle`
//! 2. On `Shutdown` (or when every sender is gone), stop
//!
//! Sessions that are being driven are never touched; the registry skips
//! any identity whose lock is held.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

use super::engine::BrowserEngine;
use super::registry::SessionRegistry;

/// Messages that can be sent to the reaper.
#[derive(Debug, Clone)]
pub enum ReaperMessage {
    /// Stop the reaper.
    Shutdown,
}

/// Periodically evicts idle browser sessions.
pub struct SessionReaper<E: BrowserEngine> {
    registry: Arc<SessionRegistry<E>>,

    /// Sessions idle at least this long are closed.
    max_idle: Duration,

    /// How often the registry is swept.
    check_interval: Duration,
}

impl<E: BrowserEngine> SessionReaper<E> {
    /// Creates a reaper sweeping once a minute.
    #[must_use]
    pub fn new(registry: Arc<SessionRegistry<E>>, max_idle: Duration) -> Self {
        Self {
            registry,
            max_idle,
            check_interval: Duration::from_secs(60),
        }
    }

    /// Sets the sweep interval.
    #[must_use]
    pub const fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Runs the reaper loop until shut down.
    pub async fn run(&self, mut rx: mpsc::Receiver<ReaperMessage>) {
        info!(
            "Session reaper started (max idle: {}s)",
            self.max_idle.as_secs()
        );

        let mut timer = interval(self.check_interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.sweep().await;
                }
                _ = rx.recv() => {
                    // Shutdown, or every sender is gone.
                    info!("Session reaper shutting down");
                    break;
                }
            }
        }
    }

    async fn sweep(&self) {
        let evicted = self.registry.evict_idle(self.max_idle).await;
        if evicted > 0 {
            info!("Evicted {} idle browser session(s)", evicted);
        }
    }
}

impl<E: BrowserEngine> std::fmt::Debug for SessionReaper<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionReaper")
            .field("max_idle", &self.max_idle)
            .field("check_interval", &self.check_interval)
            .finish_non_exhaustive()
    }
}
