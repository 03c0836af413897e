//! Account deletion grace-period state machine.
//!
//! ACTIVE -> DELETION_PENDING -> { ACTIVE (cancel) | DELETED (sweep) }.
//! The sweep's selection is a pure function of (now, grace, snapshot); the
//! timer that triggers it lives in the binary, so the machine itself is
//! testable without wall-clock dependence.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Principal, PrincipalRepository};
use crate::services::{error::AuthError, jwt::TokenIssuer};

/// Reported back to the principal when deletion is requested or queried.
#[derive(Debug, Serialize, ToSchema)]
pub struct DeletionStatus {
    pub requested_at: DateTime<Utc>,
    pub scheduled_for: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct SweepReport {
    pub deleted: u64,
    pub skipped: u64,
}

#[derive(Clone)]
pub struct AccountLifecycle {
    principals: Arc<dyn PrincipalRepository>,
    issuer: TokenIssuer,
    grace_period: Duration,
}

impl AccountLifecycle {
    pub fn new(
        principals: Arc<dyn PrincipalRepository>,
        issuer: TokenIssuer,
        grace_period_days: i64,
    ) -> Self {
        Self {
            principals,
            issuer,
            grace_period: Duration::days(grace_period_days),
        }
    }

    /// ACTIVE -> DELETION_PENDING. Fails if a request is already pending.
    pub async fn request_deletion(&self, principal_id: Uuid) -> Result<DeletionStatus, AuthError> {
        let principal = self
            .principals
            .find_by_id(principal_id)
            .await
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::PrincipalNotFound)?;

        if principal.is_pending_deletion() {
            return Err(AuthError::DeletionAlreadyPending);
        }

        let now = Utc::now();
        self.principals
            .set_deletion_requested(principal_id, now)
            .await
            .map_err(AuthError::Internal)?;

        tracing::info!(principal_id = %principal_id, "Account deletion requested");

        Ok(DeletionStatus {
            requested_at: now,
            scheduled_for: now + self.grace_period,
        })
    }

    /// DELETION_PENDING -> ACTIVE. Fails if nothing is pending; a benign,
    /// non-crashing condition.
    pub async fn cancel_deletion(&self, principal_id: Uuid) -> Result<(), AuthError> {
        let principal = self
            .principals
            .find_by_id(principal_id)
            .await
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::PrincipalNotFound)?;

        if !principal.is_pending_deletion() {
            return Err(AuthError::NothingPending);
        }

        self.principals
            .clear_deletion_requested(principal_id)
            .await
            .map_err(AuthError::Internal)?;

        tracing::info!(principal_id = %principal_id, "Account deletion cancelled");
        Ok(())
    }

    pub async fn status(&self, principal_id: Uuid) -> Result<Option<DeletionStatus>, AuthError> {
        let principal = self
            .principals
            .find_by_id(principal_id)
            .await
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::PrincipalNotFound)?;

        Ok(principal.deletion_requested_at.map(|at| DeletionStatus {
            requested_at: at,
            scheduled_for: at + self.grace_period,
        }))
    }

    /// Execute deletions whose grace period has elapsed as of `now`.
    ///
    /// Per principal: revoke every outstanding token, then delete the
    /// account. Idempotent; a principal that has vanished or cancelled since
    /// the snapshot is skipped, so partial failures are safe to retry on the
    /// next run.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, AuthError> {
        let snapshot = self
            .principals
            .list_deletion_pending()
            .await
            .map_err(AuthError::Internal)?;

        let due = deletions_due(now, self.grace_period, &snapshot);
        let mut report = SweepReport::default();

        for principal_id in due {
            self.issuer.revoke(principal_id).await?;
            if self
                .principals
                .delete(principal_id)
                .await
                .map_err(AuthError::Internal)?
            {
                tracing::info!(principal_id = %principal_id, "Account deleted after grace period");
                report.deleted += 1;
            } else {
                report.skipped += 1;
            }
        }

        Ok(report)
    }
}

/// Pure selection: which principals' grace periods have elapsed.
pub fn deletions_due(
    now: DateTime<Utc>,
    grace_period: Duration,
    snapshot: &[Principal],
) -> Vec<Uuid> {
    let cutoff = now - grace_period;
    snapshot
        .iter()
        .filter(|p| {
            p.deletion_requested_at
                .is_some_and(|requested| requested <= cutoff)
        })
        .map(|p| p.id)
        .collect()
}
