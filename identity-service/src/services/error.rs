use service_core::error::AppError;
use thiserror::Error;

/// Closed outcome set for every identity operation. Callers match on these;
/// nothing here is retried internally.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,

    #[error("Token expired")]
    ExpiredToken,

    #[error("Token revoked")]
    RevokedToken,

    #[error("Refresh token reuse detected")]
    ReusedRefreshToken,

    #[error("Too many requests, retry after {retry_after}s")]
    RateLimited { retry_after: u64 },

    #[error("Credential not found")]
    CredentialNotFound,

    #[error("Credential expired")]
    CredentialExpired,

    #[error("Credential purpose mismatch")]
    CredentialWrongPurpose,

    #[error("Account inactive")]
    AccountInactive,

    #[error("Account deletion already pending")]
    DeletionAlreadyPending,

    #[error("No account deletion pending")]
    NothingPending,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Email not verified")]
    EmailUnverified,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Principal not found")]
    PrincipalNotFound,

    #[error("Store error: {0}")]
    Store(anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken => AppError::AuthError(anyhow::anyhow!("Invalid token")),
            AuthError::ExpiredToken => AppError::AuthError(anyhow::anyhow!("Token expired")),
            AuthError::RevokedToken => AppError::AuthError(anyhow::anyhow!("Token revoked")),
            AuthError::ReusedRefreshToken => {
                AppError::AuthError(anyhow::anyhow!("Refresh token reuse detected"))
            }
            AuthError::RateLimited { retry_after } => AppError::TooManyRequests(
                "Too many requests. Please try again later.".to_string(),
                Some(retry_after),
            ),
            AuthError::CredentialNotFound => {
                AppError::BadRequest(anyhow::anyhow!("Invalid or already used token"))
            }
            AuthError::CredentialExpired => AppError::BadRequest(anyhow::anyhow!("Token expired")),
            AuthError::CredentialWrongPurpose => {
                AppError::BadRequest(anyhow::anyhow!("Token not valid for this operation"))
            }
            AuthError::AccountInactive => AppError::Forbidden(anyhow::anyhow!("Account inactive")),
            AuthError::DeletionAlreadyPending => {
                AppError::Conflict(anyhow::anyhow!("Account deletion already pending"))
            }
            AuthError::NothingPending => {
                AppError::BadRequest(anyhow::anyhow!("No account deletion pending"))
            }
            AuthError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            AuthError::EmailUnverified => {
                AppError::Forbidden(anyhow::anyhow!("Email not verified"))
            }
            AuthError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            AuthError::PrincipalNotFound => AppError::NotFound(anyhow::anyhow!("Account not found")),
            // Auth state is unreadable: deny, never fail open.
            AuthError::Store(e) => {
                tracing::error!(error = %e, "Shared store unavailable");
                AppError::ServiceUnavailable
            }
            AuthError::Internal(e) => AppError::InternalError(e),
        }
    }
}
