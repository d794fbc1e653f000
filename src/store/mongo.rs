//! MongoDB credential store.

use async_trait::async_trait;
use mongodb::bson::{self, doc};
use mongodb::{Client, Collection, Database};
use tracing::{debug, info};

use super::record::{CredentialRecord, CredentialStore, PersistenceFailure};
use crate::session::UserIdentity;

/// Database used when the connection string names none.
pub const DEFAULT_DATABASE: &str = "betting_bot";

/// Collection holding one document per user.
pub const USERS_COLLECTION: &str = "users";

pub struct MongoCredentialStore {
    database: Database,
    users: Collection<CredentialRecord>,
}

impl MongoCredentialStore {
    /// Connects to `uri` and checks the server answers a ping.
    pub async fn connect(uri: &str) -> Result<Self, PersistenceFailure> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| PersistenceFailure::Connect(e.to_string()))?;

        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));
        let users = database.collection(USERS_COLLECTION);
        let store = Self { database, users };

        store
            .ping()
            .await
            .map_err(|e| PersistenceFailure::Connect(e.to_string()))?;
        info!(
            "Connected to MongoDB database '{}'",
            store.database.name()
        );
        Ok(store)
    }
}

impl std::fmt::Debug for MongoCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoCredentialStore")
            .field("database", &self.database.name())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CredentialStore for MongoCredentialStore {
    async fn upsert(&self, record: &CredentialRecord) -> Result<(), PersistenceFailure> {
        let fields = bson::to_document(record)?;
        let result = self
            .users
            .update_one(doc! { "user_id": &record.user_id }, doc! { "$set": fields })
            .upsert(true)
            .await?;

        debug!(
            user = %record.user_id,
            matched = result.matched_count,
            upserted = result.upserted_id.is_some(),
            "Stored credential record"
        );
        Ok(())
    }

    async fn find_one(
        &self,
        identity: UserIdentity,
    ) -> Result<Option<CredentialRecord>, PersistenceFailure> {
        let record = self
            .users
            .find_one(doc! { "user_id": identity.to_string() })
            .await?;
        Ok(record)
    }

    async fn ping(&self) -> Result<(), PersistenceFailure> {
        self.database.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }
}
