//! One-way secret hashing.

use super::record::PersistenceFailure;

/// Work factor used outside tests.
pub const DEFAULT_HASH_COST: u32 = bcrypt::DEFAULT_COST;

/// Hashes `secret` with a fresh salt on the blocking pool.
pub async fn hash_secret(secret: &str, cost: u32) -> Result<String, PersistenceFailure> {
    let secret = secret.to_owned();
    tokio::task::spawn_blocking(move || bcrypt::hash(secret, cost))
        .await
        .map_err(|e| PersistenceFailure::Hash(e.to_string()))?
        .map_err(PersistenceFailure::from)
}

/// Whether `secret` matches `hash`. Malformed hashes never match.
#[must_use]
pub fn verify_secret(secret: &str, hash: &str) -> bool {
    bcrypt::verify(secret, hash).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_COST: u32 = 4;

    #[tokio::test]
    async fn test_hash_is_salted_and_verifiable() {
        let first = hash_secret("pw", TEST_COST).await.unwrap();
        let second = hash_secret("pw", TEST_COST).await.unwrap();

        assert_ne!(first, "pw");
        assert_ne!(first, second);
        assert!(verify_secret("pw", &first));
        assert!(verify_secret("pw", &second));
        assert!(!verify_secret("other", &first));
    }

    #[test]
    fn test_malformed_hash_does_not_match() {
        assert!(!verify_secret("pw", "not-a-hash"));
    }

    #[tokio::test]
    async fn test_invalid_cost_is_reported() {
        let result = hash_secret("pw", 1).await;
        assert!(matches!(result, Err(PersistenceFailure::Hash(_))));
    }
}
