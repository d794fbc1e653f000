//! Browser session module.
//!
//! Owns one headless-browser page per chat user: the engine seam, the
//! Chromium engine, the per-identity registry and the idle-session reaper.

mod chromium;
mod engine;
mod identity;
mod reaper;
mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use chromium::{ChromiumEngine, ChromiumPage};
pub use engine::{BrowserEngine, BrowserError, ProviderPage, SessionLaunchError};
pub use identity::{SessionId, UserIdentity};
pub use reaper::{ReaperMessage, SessionReaper};
pub use registry::{
    SessionInfo, SessionLease, SessionPresence, SessionRegistry, SessionReservation,
};
