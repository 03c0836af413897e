//! Refresh token records and their rotation chain.
//!
//! The rotation claim is a single compare-and-swap on the serialized record;
//! that CAS is what linearizes concurrent rotations of one jti. Family-wide
//! revocation writes both per-record flags and a per-principal marker, so a
//! successor record created concurrently with the revocation is still dead
//! on arrival (its family anchor predates the marker).

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::RefreshTokenRecord;
use crate::services::{error::AuthError, store::SharedStore};

const RECORD_PREFIX: &str = "rt:";
const FAMILY_PREFIX: &str = "rtf:";
const REVOKED_MARKER_PREFIX: &str = "rtkill:";

/// Outcome of a rotation claim on one jti.
#[derive(Debug, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    AlreadyRotated,
}

#[derive(Clone)]
pub struct RefreshTokenStore {
    store: Arc<dyn SharedStore>,
    refresh_ttl_days: i64,
}

impl RefreshTokenStore {
    pub fn new(store: Arc<dyn SharedStore>, refresh_ttl_days: i64) -> Self {
        Self {
            store,
            refresh_ttl_days,
        }
    }

    fn record_key(jti: &str) -> String {
        format!("{}{}", RECORD_PREFIX, jti)
    }

    fn family_key(principal_id: Uuid) -> String {
        format!("{}{}", FAMILY_PREFIX, principal_id)
    }

    fn marker_key(principal_id: Uuid) -> String {
        format!("{}{}", REVOKED_MARKER_PREFIX, principal_id)
    }

    fn family_ttl_seconds(&self) -> i64 {
        self.refresh_ttl_days * 86_400
    }

    pub async fn create(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        let remaining = (record.expires_at - Utc::now()).num_seconds().max(1);
        let serialized = serde_json::to_string(record)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("record encode failed: {}", e)))?;

        self.store
            .set_ex(&Self::record_key(&record.jti), &serialized, remaining)
            .await
            .map_err(AuthError::Store)?;
        self.store
            .add_to_set(
                &Self::family_key(record.principal_id),
                &record.jti,
                self.family_ttl_seconds(),
            )
            .await
            .map_err(AuthError::Store)?;
        Ok(())
    }

    async fn get_raw(&self, jti: &str) -> Result<Option<String>, AuthError> {
        self.store
            .get(&Self::record_key(jti))
            .await
            .map_err(AuthError::Store)
    }

    pub async fn get(&self, jti: &str) -> Result<Option<RefreshTokenRecord>, AuthError> {
        match self.get_raw(jti).await? {
            Some(raw) => {
                let record = serde_json::from_str(&raw).map_err(|e| {
                    AuthError::Internal(anyhow::anyhow!("record decode failed: {}", e))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Atomically claim the single permitted rotation of `jti`.
    ///
    /// Exactly one concurrent caller observes `Claimed`; everyone else gets
    /// `AlreadyRotated`. A missing record (expired or swept) also reports
    /// `AlreadyRotated` so racing callers fall into reuse handling rather
    /// than silently diverging.
    pub async fn claim_rotation(
        &self,
        jti: &str,
        successor_jti: &str,
    ) -> Result<ClaimOutcome, AuthError> {
        let Some(raw) = self.get_raw(jti).await? else {
            return Ok(ClaimOutcome::AlreadyRotated);
        };
        let record: RefreshTokenRecord = serde_json::from_str(&raw)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("record decode failed: {}", e)))?;

        if record.rotated || record.revoked {
            return Ok(ClaimOutcome::AlreadyRotated);
        }

        let mut updated = record;
        updated.rotated = true;
        updated.successor_jti = Some(successor_jti.to_string());
        let new_raw = serde_json::to_string(&updated)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("record encode failed: {}", e)))?;

        let swapped = self
            .store
            .compare_and_swap(&Self::record_key(jti), &raw, &new_raw)
            .await
            .map_err(AuthError::Store)?;

        if swapped {
            Ok(ClaimOutcome::Claimed)
        } else {
            Ok(ClaimOutcome::AlreadyRotated)
        }
    }

    /// Mark a single record revoked. Missing records are a no-op.
    pub async fn revoke(&self, jti: &str) -> Result<(), AuthError> {
        let Some(mut record) = self.get(jti).await? else {
            return Ok(());
        };
        if record.revoked {
            return Ok(());
        }
        record.revoked = true;

        let remaining = (record.expires_at - Utc::now()).num_seconds();
        if remaining <= 0 {
            return Ok(());
        }
        let serialized = serde_json::to_string(&record)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("record encode failed: {}", e)))?;
        self.store
            .set_ex(&Self::record_key(jti), &serialized, remaining)
            .await
            .map_err(AuthError::Store)
    }

    /// Revoke every token belonging to a principal.
    ///
    /// Writes the family marker first, then flips the per-record flags. The
    /// marker alone suffices: any record whose family anchor is not strictly
    /// newer than the marker is treated as revoked even if its flag write
    /// was missed.
    pub async fn revoke_family(&self, principal_id: Uuid) -> Result<u64, AuthError> {
        let marker = Utc::now().timestamp_micros().to_string();
        self.store
            .set_ex(
                &Self::marker_key(principal_id),
                &marker,
                self.family_ttl_seconds(),
            )
            .await
            .map_err(AuthError::Store)?;

        let jtis = self
            .store
            .set_members(&Self::family_key(principal_id))
            .await
            .map_err(AuthError::Store)?;

        let mut revoked = 0u64;
        for jti in jtis {
            self.revoke(&jti).await?;
            revoked += 1;
        }

        tracing::info!(principal_id = %principal_id, revoked, "Refresh token family revoked");
        Ok(revoked)
    }

    /// Whether a family-wide revocation covers this record.
    pub async fn is_family_revoked(
        &self,
        record: &RefreshTokenRecord,
    ) -> Result<bool, AuthError> {
        let marker = self
            .store
            .get(&Self::marker_key(record.principal_id))
            .await
            .map_err(AuthError::Store)?;
        match marker {
            Some(raw) => {
                let marker_ts: i64 = raw.parse().map_err(|e| {
                    AuthError::Internal(anyhow::anyhow!("revocation marker decode failed: {}", e))
                })?;
                // Records issued by a later login survive; anything anchored
                // at or before the marker is dead.
                Ok(record.family_anchor.timestamp_micros() <= marker_ts)
            }
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::InMemoryStore;

    fn store() -> RefreshTokenStore {
        RefreshTokenStore::new(Arc::new(InMemoryStore::new()), 7)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let tokens = store();
        let record = RefreshTokenRecord::new(Uuid::new_v4(), "token", 7);
        tokens.create(&record).await.unwrap();

        let loaded = tokens.get(&record.jti).await.unwrap().unwrap();
        assert_eq!(loaded.jti, record.jti);
        assert!(loaded.is_active());
    }

    #[tokio::test]
    async fn test_claim_rotation_single_winner() {
        let tokens = store();
        let record = RefreshTokenRecord::new(Uuid::new_v4(), "token", 7);
        tokens.create(&record).await.unwrap();

        let first = tokens.claim_rotation(&record.jti, "successor-1").await.unwrap();
        assert_eq!(first, ClaimOutcome::Claimed);

        let second = tokens.claim_rotation(&record.jti, "successor-2").await.unwrap();
        assert_eq!(second, ClaimOutcome::AlreadyRotated);

        let loaded = tokens.get(&record.jti).await.unwrap().unwrap();
        assert!(loaded.rotated);
        assert_eq!(loaded.successor_jti.as_deref(), Some("successor-1"));
    }

    #[tokio::test]
    async fn test_claim_rotation_missing_record() {
        let tokens = store();
        let outcome = tokens.claim_rotation("no-such-jti", "successor").await.unwrap();
        assert_eq!(outcome, ClaimOutcome::AlreadyRotated);
    }

    #[tokio::test]
    async fn test_revoke_family_covers_later_successors() {
        let tokens = store();
        let principal_id = Uuid::new_v4();
        let parent = RefreshTokenRecord::new(principal_id, "token-a", 7);
        tokens.create(&parent).await.unwrap();

        tokens.revoke_family(principal_id).await.unwrap();

        // A successor created after the marker inherits the parent's anchor
        // and is therefore covered.
        let successor = RefreshTokenRecord::rotated_from(
            &parent,
            Uuid::new_v4().to_string(),
            "token-b",
            7,
        );
        tokens.create(&successor).await.unwrap();

        assert!(tokens.is_family_revoked(&successor).await.unwrap());
        assert!(tokens
            .get(&parent.jti)
            .await
            .unwrap()
            .unwrap()
            .revoked);
    }
}
