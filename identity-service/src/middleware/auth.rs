//! Per-request authentication pipeline.
//!
//! Bearer extraction, pure token verification, then principal load and
//! account-state checks against the repository. The token alone is never
//! enough: an access token is honored only while its principal is active.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::{models::Role, AppState};

/// Principal context attached to every authenticated request.
#[derive(Debug, Clone)]
pub struct CurrentPrincipal {
    pub id: Uuid,
    pub role: Role,
    pub verified: bool,
    pub active: bool,
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })?;

    let claims = state.issuer.verify_access(token)?;

    let principal_id: Uuid = claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized(anyhow::anyhow!("Invalid token subject")))?;

    // Token validity is necessary but not sufficient; the account must
    // still exist and be active.
    let principal = state
        .principals
        .find_by_id(principal_id)
        .await
        .map_err(AppError::InternalError)?
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Unknown principal")))?;

    if !principal.active {
        return Err(AppError::Forbidden(anyhow::anyhow!("Account inactive")));
    }

    req.extensions_mut().insert(CurrentPrincipal {
        id: principal.id,
        role: principal.role,
        verified: principal.verified,
        active: principal.active,
    });

    Ok(next.run(req).await)
}

/// Gate for routes that require a verified email.
pub async fn require_verified(req: Request, next: Next) -> Result<Response, AppError> {
    let principal = req
        .extensions()
        .get::<CurrentPrincipal>()
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Principal context missing")))?;

    if !principal.verified {
        return Err(AppError::Forbidden(anyhow::anyhow!("Email not verified")));
    }

    Ok(next.run(req).await)
}

/// Gate for admin-only routes.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    let principal = req
        .extensions()
        .get::<CurrentPrincipal>()
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("Principal context missing")))?;

    if !principal.role.permits(Role::Admin) {
        return Err(AppError::Forbidden(anyhow::anyhow!("Admin role required")));
    }

    Ok(next.run(req).await)
}

/// Extractor to easily get the principal context in handlers.
pub struct AuthUser(pub CurrentPrincipal);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts.extensions.get::<CurrentPrincipal>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "Principal context missing from request extensions"
            ))
        })?;

        Ok(AuthUser(principal.clone()))
    }
}
