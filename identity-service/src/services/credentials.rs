//! Single-use, time-limited credentials for out-of-band flows.
//!
//! Tokens are opaque random strings looked up server-side, so deleting the
//! record invalidates them instantly. Consumption is an atomic
//! get-and-delete: two concurrent consumes of one token yield exactly one
//! success.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::services::{error::AuthError, store::SharedStore};

const KEY_PREFIX: &str = "cred:";

/// Records outlive their logical expiry in the store by this much, so a
/// late consume reports `CredentialExpired` instead of `CredentialNotFound`.
const EXPIRED_RETENTION_SECS: i64 = 3600;

/// Default lifetimes per purpose.
pub const EMAIL_VERIFY_TTL_HOURS: i64 = 24;
pub const PASSWORD_RESET_TTL_HOURS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPurpose {
    EmailVerify,
    PasswordReset,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCredential {
    purpose: CredentialPurpose,
    principal_id: Uuid,
    #[serde(with = "chrono::serde::ts_seconds")]
    created_at: DateTime<Utc>,
    ttl_seconds: i64,
}

impl StoredCredential {
    fn expires_at(&self) -> DateTime<Utc> {
        self.created_at + Duration::seconds(self.ttl_seconds)
    }
}

#[derive(Clone)]
pub struct EphemeralCredentialStore {
    store: Arc<dyn SharedStore>,
}

impl EphemeralCredentialStore {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    fn key(token: &str) -> String {
        format!("{}{}", KEY_PREFIX, token)
    }

    /// Create a credential and return its opaque token.
    pub async fn create(
        &self,
        purpose: CredentialPurpose,
        principal_id: Uuid,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let token = generate_random_token();
        let credential = StoredCredential {
            purpose,
            principal_id,
            created_at: Utc::now(),
            ttl_seconds: ttl.num_seconds(),
        };
        let serialized = serde_json::to_string(&credential)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("credential encode failed: {}", e)))?;

        self.store
            .set_ex(
                &Self::key(&token),
                &serialized,
                ttl.num_seconds() + EXPIRED_RETENTION_SECS,
            )
            .await
            .map_err(AuthError::Store)?;

        Ok(token)
    }

    /// Consume a credential: validation and deletion in one atomic step.
    ///
    /// Any consume attempt destroys the credential, whatever the outcome;
    /// tokens are unguessable, so a purpose mismatch is a caller bug and
    /// burning beats weakening the exactly-once guarantee.
    pub async fn consume(
        &self,
        token: &str,
        purpose: CredentialPurpose,
    ) -> Result<Uuid, AuthError> {
        let raw = self
            .store
            .get_del(&Self::key(token))
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::CredentialNotFound)?;

        let credential: StoredCredential = serde_json::from_str(&raw)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("credential decode failed: {}", e)))?;

        if credential.purpose != purpose {
            return Err(AuthError::CredentialWrongPurpose);
        }
        if Utc::now() > credential.expires_at() {
            return Err(AuthError::CredentialExpired);
        }

        Ok(credential.principal_id)
    }
}

/// 32 bytes of randomness, hex-encoded.
fn generate_random_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    hex::encode(token_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::InMemoryStore;

    fn credentials() -> EphemeralCredentialStore {
        EphemeralCredentialStore::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn test_consume_once() {
        let creds = credentials();
        let principal_id = Uuid::new_v4();
        let token = creds
            .create(
                CredentialPurpose::PasswordReset,
                principal_id,
                Duration::hours(1),
            )
            .await
            .unwrap();

        let consumed = creds
            .consume(&token, CredentialPurpose::PasswordReset)
            .await
            .unwrap();
        assert_eq!(consumed, principal_id);

        let err = creds
            .consume(&token, CredentialPurpose::PasswordReset)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CredentialNotFound));
    }

    #[tokio::test]
    async fn test_concurrent_consume_single_success() {
        let creds = credentials();
        let token = creds
            .create(
                CredentialPurpose::EmailVerify,
                Uuid::new_v4(),
                Duration::hours(24),
            )
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            creds.consume(&token, CredentialPurpose::EmailVerify),
            creds.consume(&token, CredentialPurpose::EmailVerify)
        );

        let successes = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_expired_credential_is_reported_expired() {
        let creds = credentials();
        let token = creds
            .create(
                CredentialPurpose::PasswordReset,
                Uuid::new_v4(),
                Duration::seconds(-1),
            )
            .await
            .unwrap();

        let err = creds
            .consume(&token, CredentialPurpose::PasswordReset)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CredentialExpired));
    }

    #[tokio::test]
    async fn test_wrong_purpose() {
        let creds = credentials();
        let token = creds
            .create(
                CredentialPurpose::EmailVerify,
                Uuid::new_v4(),
                Duration::hours(24),
            )
            .await
            .unwrap();

        let err = creds
            .consume(&token, CredentialPurpose::PasswordReset)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CredentialWrongPurpose));
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let creds = credentials();
        let err = creds
            .consume("deadbeef", CredentialPurpose::PasswordReset)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CredentialNotFound));
    }
}
