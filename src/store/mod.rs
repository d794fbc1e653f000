//! Credential persistence.
//!
//! Successful logins are written through to MongoDB, or to an in-process
//! map when no database is configured. Passwords are stored as bcrypt
//! hashes only.

mod hash;
mod memory;
mod mongo;
mod record;

pub use hash::{DEFAULT_HASH_COST, hash_secret, verify_secret};
pub use memory::MemoryCredentialStore;
pub use mongo::{DEFAULT_DATABASE, MongoCredentialStore, USERS_COLLECTION};
pub use record::{CredentialRecord, CredentialStore, PersistenceFailure};
