//! Chat user identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable key of one chat user across session and credential operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIdentity(pub u64);

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserIdentity {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<teloxide::types::UserId> for UserIdentity {
    fn from(id: teloxide::types::UserId) -> Self {
        Self(id.0)
    }
}

/// Distinguishes one launched browser session from the next one for the
/// same identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s{}", self.0)
    }
}
