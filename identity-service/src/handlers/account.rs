use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use service_core::error::AppError;

use crate::{
    dtos::auth::{DeletionStatusResponse, MessageResponse},
    middleware::AuthUser,
    AppState,
};

/// Request account deletion
///
/// Starts the grace period; the account is deleted by the sweep once the
/// period elapses, unless cancelled.
#[utoipa::path(
    post,
    path = "/auth/account/deletion",
    responses(
        (status = 200, description = "Deletion scheduled", body = DeletionStatusResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 409, description = "Deletion already pending", body = ErrorResponse)
    ),
    tag = "Account",
    security(("bearer_auth" = []))
)]
pub async fn request_account_deletion(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let status = state.lifecycle.request_deletion(user.0.id).await?;
    Ok((
        StatusCode::OK,
        Json(DeletionStatusResponse {
            pending: true,
            requested_at: Some(status.requested_at),
            scheduled_for: Some(status.scheduled_for),
        }),
    ))
}

/// Cancel a pending account deletion
#[utoipa::path(
    delete,
    path = "/auth/account/deletion",
    responses(
        (status = 200, description = "Deletion cancelled", body = MessageResponse),
        (status = 400, description = "No deletion pending", body = ErrorResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Account",
    security(("bearer_auth" = []))
)]
pub async fn cancel_account_deletion(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.lifecycle.cancel_deletion(user.0.id).await?;
    Ok((
        StatusCode::OK,
        Json(MessageResponse {
            message: "Account deletion cancelled".to_string(),
        }),
    ))
}

/// Report whether a deletion is pending for the current account
#[utoipa::path(
    get,
    path = "/auth/account/deletion",
    responses(
        (status = 200, description = "Deletion status", body = DeletionStatusResponse),
        (status = 401, description = "Not authenticated", body = ErrorResponse)
    ),
    tag = "Account",
    security(("bearer_auth" = []))
)]
pub async fn deletion_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let status = state.lifecycle.status(user.0.id).await?;
    Ok((
        StatusCode::OK,
        Json(match status {
            Some(s) => DeletionStatusResponse {
                pending: true,
                requested_at: Some(s.requested_at),
                scheduled_for: Some(s.scheduled_for),
            },
            None => DeletionStatusResponse {
                pending: false,
                requested_at: None,
                scheduled_for: None,
            },
        }),
    ))
}
