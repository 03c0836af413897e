use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::{Principal, PrincipalRepository, RefreshTokenRecord, Role};
use crate::services::{
    error::AuthError,
    refresh_store::{ClaimOutcome, RefreshTokenStore},
};

const ACCESS_TOKEN_TYPE: &str = "access";
const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Claims for access tokens (short-lived, never persisted).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (principal ID)
    pub sub: String,
    /// Principal role at issue time
    pub role: Role,
    /// Token type discriminator
    #[serde(rename = "type")]
    pub token_type: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Claims for refresh tokens (long-lived, backed by a store record).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenClaims {
    /// Subject (principal ID)
    pub sub: String,
    /// Token type discriminator
    #[serde(rename = "type")]
    pub token_type: String,
    /// Record ID, used to detect reuse
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

/// Token pair returned to the client.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Issues, verifies, rotates, and revokes the JWT pair.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
    refresh_tokens: RefreshTokenStore,
    principals: Arc<dyn PrincipalRepository>,
}

impl TokenIssuer {
    pub fn new(
        config: &JwtConfig,
        refresh_tokens: RefreshTokenStore,
        principals: Arc<dyn PrincipalRepository>,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
            refresh_tokens,
            principals,
        }
    }

    /// Issue a fresh access/refresh pair and persist the refresh record.
    /// Starts a new token family.
    pub async fn issue(&self, principal: &Principal) -> Result<TokenResponse, AuthError> {
        let jti = Uuid::new_v4().to_string();
        let (response, record) = self.mint_pair(principal, &jti, None)?;
        self.refresh_tokens.create(&record).await?;
        Ok(response)
    }

    /// Verify an access token: signature, exact expiry, and type.
    ///
    /// Active/role checks belong to the caller (the guard); this is a pure
    /// token check.
    pub fn verify_access(&self, token: &str) -> Result<AccessTokenClaims, AuthError> {
        let claims: AccessTokenClaims = self.decode(token)?;
        if claims.token_type != ACCESS_TOKEN_TYPE {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Decode a refresh token without touching the store.
    pub fn decode_refresh(&self, token: &str) -> Result<RefreshTokenClaims, AuthError> {
        let claims: RefreshTokenClaims = self.decode(token)?;
        if claims.token_type != REFRESH_TOKEN_TYPE {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }

    /// Rotate a refresh token into a new pair.
    ///
    /// The jti is claimed with a single compare-and-swap, so concurrent
    /// rotations of the same token produce exactly one winner. A rotation
    /// attempt on an already-rotated or revoked jti is a reuse signal and
    /// revokes the principal's entire token family before reporting
    /// [`AuthError::ReusedRefreshToken`].
    pub async fn rotate(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        let claims = self.decode_refresh(refresh_token)?;

        let Some(record) = self.refresh_tokens.get(&claims.jti).await? else {
            return Err(AuthError::InvalidToken);
        };

        if record.token_hash != RefreshTokenRecord::hash_token(refresh_token) {
            tracing::warn!(principal_id = %record.principal_id, "Refresh token hash mismatch");
            return Err(AuthError::InvalidToken);
        }

        let principal_id = record.principal_id;
        if claims.sub != principal_id.to_string() {
            return Err(AuthError::InvalidToken);
        }

        if record.rotated
            || record.revoked
            || self.refresh_tokens.is_family_revoked(&record).await?
        {
            self.refresh_tokens.revoke_family(principal_id).await?;
            tracing::warn!(
                principal_id = %principal_id,
                jti = %claims.jti,
                "Refresh token reuse detected, family revoked"
            );
            return Err(AuthError::ReusedRefreshToken);
        }

        if record.is_expired() {
            return Err(AuthError::ExpiredToken);
        }

        let successor_jti = Uuid::new_v4().to_string();
        match self
            .refresh_tokens
            .claim_rotation(&claims.jti, &successor_jti)
            .await?
        {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::AlreadyRotated => {
                self.refresh_tokens.revoke_family(principal_id).await?;
                tracing::warn!(
                    principal_id = %principal_id,
                    jti = %claims.jti,
                    "Lost rotation race, family revoked"
                );
                return Err(AuthError::ReusedRefreshToken);
            }
        }

        let principal = self
            .principals
            .find_by_id(principal_id)
            .await
            .map_err(AuthError::Internal)?
            .ok_or(AuthError::InvalidToken)?;
        if !principal.active {
            return Err(AuthError::AccountInactive);
        }

        let (response, successor) = self.mint_pair(&principal, &successor_jti, Some(&record))?;
        self.refresh_tokens.create(&successor).await?;

        tracing::info!(principal_id = %principal.id, "Refresh token rotated");
        Ok(response)
    }

    /// Revoke every refresh token belonging to a principal. Used on logout,
    /// password change, and account deletion.
    pub async fn revoke(&self, principal_id: Uuid) -> Result<(), AuthError> {
        self.refresh_tokens.revoke_family(principal_id).await?;
        Ok(())
    }

    pub fn refresh_token_store(&self) -> &RefreshTokenStore {
        &self.refresh_tokens
    }

    /// Access token expiry in seconds (for client info).
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    fn mint_pair(
        &self,
        principal: &Principal,
        refresh_jti: &str,
        rotated_from: Option<&RefreshTokenRecord>,
    ) -> Result<(TokenResponse, RefreshTokenRecord), AuthError> {
        let now = Utc::now();
        let header = Header::new(Algorithm::HS256);

        let access_claims = AccessTokenClaims {
            sub: principal.id.to_string(),
            role: principal.role,
            token_type: ACCESS_TOKEN_TYPE.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.access_token_expiry_minutes)).timestamp(),
        };
        let access_token = encode(&header, &access_claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("access token encode: {}", e)))?;

        let refresh_claims = RefreshTokenClaims {
            sub: principal.id.to_string(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
            jti: refresh_jti.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::days(self.refresh_token_expiry_days)).timestamp(),
        };
        let refresh_token = encode(&header, &refresh_claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("refresh token encode: {}", e)))?;

        let record = match rotated_from {
            Some(parent) => RefreshTokenRecord::rotated_from(
                parent,
                refresh_jti.to_string(),
                &refresh_token,
                self.refresh_token_expiry_days,
            ),
            None => RefreshTokenRecord::new_with_jti(
                refresh_jti.to_string(),
                principal.id,
                &refresh_token,
                self.refresh_token_expiry_days,
            ),
        };

        Ok((
            TokenResponse {
                access_token,
                refresh_token,
                token_type: "Bearer".to_string(),
                expires_in: self.access_token_expiry_seconds(),
            },
            record,
        ))
    }

    fn decode<T: serde::de::DeserializeOwned>(&self, token: &str) -> Result<T, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        // Zero leeway: a token is honored until its exact expiry instant
        validation.leeway = 0;

        decode::<T>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            })
    }
}
