//! In-process credential store.
//!
//! Used when no `MONGO_URI` is configured and as the store in tests.
//! Records are lost when the process exits.

use async_trait::async_trait;
use dashmap::DashMap;

use super::record::{CredentialRecord, CredentialStore, PersistenceFailure};
use crate::session::UserIdentity;

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    records: DashMap<String, CredentialRecord>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn upsert(&self, record: &CredentialRecord) -> Result<(), PersistenceFailure> {
        self.records.insert(record.user_id.clone(), record.clone());
        Ok(())
    }

    async fn find_one(
        &self,
        identity: UserIdentity,
    ) -> Result<Option<CredentialRecord>, PersistenceFailure> {
        Ok(self
            .records
            .get(&identity.to_string())
            .map(|entry| entry.value().clone()))
    }

    async fn ping(&self) -> Result<(), PersistenceFailure> {
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
