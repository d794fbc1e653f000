//! Persisted credential record and the store seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::UserIdentity;

/// Errors from the credential store.
///
/// A failed write after a successful login is logged and otherwise ignored
/// by the command handler.
#[derive(Debug, Error)]
pub enum PersistenceFailure {
    #[error("Failed to connect to credential store: {0}")]
    Connect(String),

    #[error("Credential store operation failed: {0}")]
    Backend(#[from] mongodb::error::Error),

    #[error("Failed to encode credential record: {0}")]
    Encode(#[from] mongodb::bson::ser::Error),

    #[error("Failed to hash secret: {0}")]
    Hash(String),
}

impl From<bcrypt::BcryptError> for PersistenceFailure {
    fn from(e: bcrypt::BcryptError) -> Self {
        Self::Hash(e.to_string())
    }
}

/// One user's stored login, keyed on `user_id`.
///
/// Only the bcrypt hash of the password is ever stored.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub user_id: String,
    pub phone_number: String,
    pub password_hash: String,
    /// Balance as displayed by the provider.
    pub balance: String,
    pub updated_at: DateTime<Utc>,
}

impl CredentialRecord {
    #[must_use]
    pub fn new(
        identity: UserIdentity,
        phone_number: impl Into<String>,
        password_hash: impl Into<String>,
        balance: impl Into<String>,
    ) -> Self {
        Self {
            user_id: identity.to_string(),
            phone_number: phone_number.into(),
            password_hash: password_hash.into(),
            balance: balance.into(),
            updated_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("user_id", &self.user_id)
            .field("balance", &self.balance)
            .field("updated_at", &self.updated_at)
            .finish_non_exhaustive()
    }
}

/// Write-through storage of validated credentials.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Inserts or replaces the record for `record.user_id`.
    async fn upsert(&self, record: &CredentialRecord) -> Result<(), PersistenceFailure>;

    async fn find_one(
        &self,
        identity: UserIdentity,
    ) -> Result<Option<CredentialRecord>, PersistenceFailure>;

    /// Checks that the backend is reachable.
    async fn ping(&self) -> Result<(), PersistenceFailure>;

    /// Short backend name for logs.
    fn backend(&self) -> &'static str;
}
