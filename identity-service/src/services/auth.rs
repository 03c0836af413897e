//! Authentication flows exposed to the business API layer.

use chrono::Duration;
use std::sync::Arc;

use crate::{
    dtos::auth::{LoginRequest, PasswordResetConfirm, RegisterRequest, RegisterResponse},
    models::{Principal, PrincipalRepository},
    services::{
        credentials::{
            CredentialPurpose, EphemeralCredentialStore, EMAIL_VERIFY_TTL_HOURS,
            PASSWORD_RESET_TTL_HOURS,
        },
        email::Notifier,
        error::AuthError,
        jwt::{TokenIssuer, TokenResponse},
    },
    utils::{hash_password, verify_password, Password, PasswordHashString},
};

#[derive(Clone)]
pub struct AuthService {
    principals: Arc<dyn PrincipalRepository>,
    issuer: TokenIssuer,
    credentials: EphemeralCredentialStore,
    notifier: Arc<dyn Notifier>,
    base_url: String,
}

impl AuthService {
    pub fn new(
        principals: Arc<dyn PrincipalRepository>,
        issuer: TokenIssuer,
        credentials: EphemeralCredentialStore,
        notifier: Arc<dyn Notifier>,
        base_url: String,
    ) -> Self {
        Self {
            principals,
            issuer,
            credentials,
            notifier,
            base_url,
        }
    }

    pub async fn register(&self, req: RegisterRequest) -> Result<RegisterResponse, AuthError> {
        if self
            .principals
            .find_by_email(&req.email)
            .await
            .map_err(AuthError::Internal)?
            .is_some()
        {
            return Err(AuthError::EmailAlreadyRegistered);
        }

        let password_hash = hash_password(&Password::new(req.password))
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))?;

        let principal = Principal::new(
            req.email.clone(),
            password_hash.into_string(),
            req.organization_id,
        );
        self.principals
            .insert(&principal)
            .await
            .map_err(AuthError::Internal)?;

        tracing::info!(principal_id = %principal.id, "Principal registered");

        let token = self
            .credentials
            .create(
                CredentialPurpose::EmailVerify,
                principal.id,
                Duration::hours(EMAIL_VERIFY_TTL_HOURS),
            )
            .await?;
        self.dispatch_verification(req.email, token);

        Ok(RegisterResponse {
            principal_id: principal.id,
            message: "Registration successful. Please check your email to verify your account."
                .to_string(),
        })
    }

    pub async fn verify_email(&self, token: String) -> Result<(), AuthError> {
        let principal_id = self
            .credentials
            .consume(&token, CredentialPurpose::EmailVerify)
            .await?;

        if !self
            .principals
            .set_verified(principal_id)
            .await
            .map_err(AuthError::Internal)?
        {
            return Err(AuthError::PrincipalNotFound);
        }

        tracing::info!(principal_id = %principal_id, "Email verified");
        Ok(())
    }

    pub async fn login(&self, req: LoginRequest) -> Result<TokenResponse, AuthError> {
        // Unknown email and wrong password are indistinguishable to the caller
        let principal = self
            .principals
            .find_by_email(&req.email)
            .await
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::InvalidCredentials)?;

        verify_password(
            &Password::new(req.password),
            &PasswordHashString::new(principal.password_hash.clone()),
        )
        .map_err(|_| AuthError::InvalidCredentials)?;

        if !principal.verified {
            return Err(AuthError::EmailUnverified);
        }
        if !principal.active {
            return Err(AuthError::AccountInactive);
        }

        let pair = self.issuer.issue(&principal).await?;
        tracing::info!(principal_id = %principal.id, "Login successful");
        Ok(pair)
    }

    pub async fn refresh(&self, refresh_token: String) -> Result<TokenResponse, AuthError> {
        self.issuer.rotate(&refresh_token).await
    }

    /// Revoke the presented refresh token's whole family.
    pub async fn logout(&self, refresh_token: String) -> Result<(), AuthError> {
        let claims = self.issuer.decode_refresh(&refresh_token)?;

        let store = self.issuer.refresh_token_store();
        let record = store
            .get(&claims.jti)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if record.revoked || store.is_family_revoked(&record).await? {
            return Err(AuthError::RevokedToken);
        }

        self.issuer.revoke(record.principal_id).await?;
        tracing::info!(principal_id = %record.principal_id, "Logged out");
        Ok(())
    }

    /// Always reports success to the caller; whether the account exists is
    /// never observable from this endpoint.
    pub async fn request_password_reset(&self, email: String) -> Result<(), AuthError> {
        let principal = self
            .principals
            .find_by_email(&email)
            .await
            .map_err(AuthError::Internal)?;

        if let Some(principal) = principal {
            if principal.active {
                let token = self
                    .credentials
                    .create(
                        CredentialPurpose::PasswordReset,
                        principal.id,
                        Duration::hours(PASSWORD_RESET_TTL_HOURS),
                    )
                    .await?;
                self.dispatch_reset(email, token);
                tracing::info!(principal_id = %principal.id, "Password reset requested");
            }
        }

        Ok(())
    }

    pub async fn confirm_password_reset(
        &self,
        req: PasswordResetConfirm,
    ) -> Result<(), AuthError> {
        let principal_id = self
            .credentials
            .consume(&req.token, CredentialPurpose::PasswordReset)
            .await?;

        let password_hash = hash_password(&Password::new(req.new_password))
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("Password hashing error: {}", e)))?;

        if !self
            .principals
            .set_password_hash(principal_id, password_hash.as_str())
            .await
            .map_err(AuthError::Internal)?
        {
            return Err(AuthError::PrincipalNotFound);
        }

        // A password change invalidates every outstanding session
        self.issuer.revoke(principal_id).await?;

        tracing::info!(principal_id = %principal_id, "Password reset successful");
        Ok(())
    }

    fn dispatch_verification(&self, email: String, token: String) {
        let notifier = self.notifier.clone();
        let base_url = self.base_url.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier
                .send_verification_email(&email, &token, &base_url)
                .await
            {
                tracing::error!(error = %e, "Failed to send verification email");
            }
        });
    }

    fn dispatch_reset(&self, email: String, token: String) {
        let notifier = self.notifier.clone();
        let base_url = self.base_url.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier
                .send_password_reset_email(&email, &token, &base_url)
                .await
            {
                tracing::error!(error = %e, "Failed to send password reset email");
            }
        });
    }
}
