use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use service_core::error::AppError;

use crate::AppState;

/// Run the deletion sweep now
///
/// The same sweep runs on a timer; this endpoint lets operators trigger it
/// manually. Idempotent.
#[utoipa::path(
    post,
    path = "/auth/admin/deletion-sweep",
    responses(
        (status = 200, description = "Sweep executed", body = SweepReport),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Admin role required", body = ErrorResponse)
    ),
    tag = "Admin",
    security(("bearer_auth" = []))
)]
pub async fn deletion_sweep(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let report = state.lifecycle.sweep(Utc::now()).await?;
    Ok((StatusCode::OK, Json(report)))
}
