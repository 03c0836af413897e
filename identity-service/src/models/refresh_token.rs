use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Refresh token record persisted in the shared store.
///
/// Timestamps serialize as unix seconds so a record round-trips through the
/// store byte-identically; the rotation claim compares serialized values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// Unique identifier for this token instance (jti claim).
    pub jti: String,

    /// Principal this token belongs to.
    pub principal_id: Uuid,

    /// SHA-256 hash of the presented refresh token string.
    pub token_hash: String,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub issued_at: DateTime<Utc>,

    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires_at: DateTime<Utc>,

    /// Issue time of the login that started this rotation chain. Carried
    /// unchanged through every rotation so a family-wide revocation marker
    /// catches successors created after the marker was written. Microsecond
    /// precision: a login in the same second as a revocation must survive.
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub family_anchor: DateTime<Utc>,

    /// A jti rotates successfully at most once.
    #[serde(default)]
    pub rotated: bool,

    /// jti of the record this one was rotated into.
    #[serde(default)]
    pub successor_jti: Option<String>,

    /// Set on logout, password change, and reuse detection.
    #[serde(default)]
    pub revoked: bool,
}

impl RefreshTokenRecord {
    /// Create a record for a fresh login. Starts a new family.
    pub fn new(principal_id: Uuid, token: &str, expires_in_days: i64) -> Self {
        Self::new_with_jti(
            Uuid::new_v4().to_string(),
            principal_id,
            token,
            expires_in_days,
        )
    }

    /// Create a record with a caller-chosen jti (needed when the jti goes
    /// into the JWT claims before the record is written).
    pub fn new_with_jti(
        jti: String,
        principal_id: Uuid,
        token: &str,
        expires_in_days: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            jti,
            principal_id,
            token_hash: Self::hash_token(token),
            issued_at: now,
            expires_at: now + Duration::days(expires_in_days),
            family_anchor: now,
            rotated: false,
            successor_jti: None,
            revoked: false,
        }
    }

    /// Create the successor record for a rotation; inherits the family
    /// anchor of the record it descends from.
    pub fn rotated_from(
        parent: &RefreshTokenRecord,
        jti: String,
        token: &str,
        expires_in_days: i64,
    ) -> Self {
        let mut record = Self::new_with_jti(jti, parent.principal_id, token, expires_in_days);
        record.family_anchor = parent.family_anchor;
        record
    }

    /// Hash a token string with SHA-256.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Usable for rotation: neither expired, rotated, nor revoked.
    pub fn is_active(&self) -> bool {
        !self.is_expired() && !self.rotated && !self.revoked
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_creation() {
        let record = RefreshTokenRecord::new(Uuid::new_v4(), "token_abc", 7);

        assert_ne!(record.token_hash, "token_abc");
        assert!(!record.rotated);
        assert!(!record.revoked);
        assert!(record.successor_jti.is_none());
        assert_eq!(record.family_anchor, record.issued_at);
        assert!(record.is_active());
    }

    #[test]
    fn test_successor_keeps_family_anchor() {
        let parent = RefreshTokenRecord::new(Uuid::new_v4(), "token_abc", 7);
        let child = RefreshTokenRecord::rotated_from(
            &parent,
            Uuid::new_v4().to_string(),
            "token_def",
            7,
        );

        assert_eq!(child.family_anchor, parent.family_anchor);
        assert_eq!(child.principal_id, parent.principal_id);
        assert!(child.is_active());
    }

    #[test]
    fn test_record_expiry() {
        let mut record = RefreshTokenRecord::new(Uuid::new_v4(), "token_abc", 7);
        assert!(!record.is_expired());

        record.expires_at = Utc::now() - Duration::seconds(1);
        assert!(record.is_expired());
        assert!(!record.is_active());
    }

    #[test]
    fn test_serialization_is_stable() {
        let record = RefreshTokenRecord::new(Uuid::new_v4(), "token_abc", 7);
        let first = serde_json::to_string(&record).unwrap();
        let reparsed: RefreshTokenRecord = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string(&reparsed).unwrap();
        assert_eq!(first, second);
    }
}
