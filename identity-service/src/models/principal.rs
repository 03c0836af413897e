//! Principal model and the repository seam to the platform's user storage.
//!
//! The identity core only reads and updates the auth-relevant fields; the
//! full principal record is owned by the platform's user service, which
//! provides the production [`PrincipalRepository`] implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use utoipa::ToSchema;
use uuid::Uuid;

/// Closed set of roles. Authorization decisions reduce to [`Role::permits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    /// Whether a holder of `self` satisfies a route that requires `required`.
    pub fn permits(self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (Role::User, Role::User) => true,
            (Role::User, Role::Admin) => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Admin => "ADMIN",
        }
    }
}

/// Principal account as seen by the identity core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub verified: bool,
    pub active: bool,
    pub organization_id: Uuid,
    /// Set while an account deletion is pending; cleared on cancel.
    pub deletion_requested_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Principal {
    pub fn new(email: String, password_hash: String, organization_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            email,
            password_hash,
            role: Role::User,
            verified: false,
            active: true,
            organization_id,
            deletion_requested_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_pending_deletion(&self) -> bool {
        self.deletion_requested_at.is_some()
    }
}

/// Storage seam for principals.
///
/// Only the fields this core needs are updatable here. Every mutation
/// returns whether a matching principal existed, so callers can map a miss
/// to their own not-found handling.
#[async_trait]
pub trait PrincipalRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>, anyhow::Error>;
    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, anyhow::Error>;
    async fn insert(&self, principal: &Principal) -> Result<(), anyhow::Error>;
    async fn set_verified(&self, id: Uuid) -> Result<bool, anyhow::Error>;
    async fn set_password_hash(&self, id: Uuid, password_hash: &str)
        -> Result<bool, anyhow::Error>;
    async fn set_deletion_requested(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, anyhow::Error>;
    async fn clear_deletion_requested(&self, id: Uuid) -> Result<bool, anyhow::Error>;
    async fn delete(&self, id: Uuid) -> Result<bool, anyhow::Error>;
    /// All principals with a deletion request on record, regardless of age.
    async fn list_deletion_pending(&self) -> Result<Vec<Principal>, anyhow::Error>;
}

/// Process-local repository for tests and standalone deployments.
pub struct InMemoryPrincipals {
    inner: Mutex<HashMap<Uuid, Principal>>,
}

impl Default for InMemoryPrincipals {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPrincipals {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PrincipalRepository for InMemoryPrincipals {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Principal>, anyhow::Error> {
        let map = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("principal map mutex poisoned: {}", e))?;
        Ok(map.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Principal>, anyhow::Error> {
        let map = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("principal map mutex poisoned: {}", e))?;
        Ok(map.values().find(|p| p.email == email).cloned())
    }

    async fn insert(&self, principal: &Principal) -> Result<(), anyhow::Error> {
        let mut map = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("principal map mutex poisoned: {}", e))?;
        map.insert(principal.id, principal.clone());
        Ok(())
    }

    async fn set_verified(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        let mut map = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("principal map mutex poisoned: {}", e))?;
        Ok(match map.get_mut(&id) {
            Some(p) => {
                p.verified = true;
                true
            }
            None => false,
        })
    }

    async fn set_password_hash(
        &self,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, anyhow::Error> {
        let mut map = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("principal map mutex poisoned: {}", e))?;
        Ok(match map.get_mut(&id) {
            Some(p) => {
                p.password_hash = password_hash.to_string();
                true
            }
            None => false,
        })
    }

    async fn set_deletion_requested(
        &self,
        id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<bool, anyhow::Error> {
        let mut map = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("principal map mutex poisoned: {}", e))?;
        Ok(match map.get_mut(&id) {
            Some(p) => {
                p.deletion_requested_at = Some(at);
                true
            }
            None => false,
        })
    }

    async fn clear_deletion_requested(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        let mut map = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("principal map mutex poisoned: {}", e))?;
        Ok(match map.get_mut(&id) {
            Some(p) => {
                p.deletion_requested_at = None;
                true
            }
            None => false,
        })
    }

    async fn delete(&self, id: Uuid) -> Result<bool, anyhow::Error> {
        let mut map = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("principal map mutex poisoned: {}", e))?;
        Ok(map.remove(&id).is_some())
    }

    async fn list_deletion_pending(&self) -> Result<Vec<Principal>, anyhow::Error> {
        let map = self
            .inner
            .lock()
            .map_err(|e| anyhow::anyhow!("principal map mutex poisoned: {}", e))?;
        Ok(map
            .values()
            .filter(|p| p.deletion_requested_at.is_some())
            .cloned()
            .collect())
    }
}
