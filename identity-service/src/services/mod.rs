//! Services layer for the identity core.
//!
//! Token issuance and rotation, the shared atomic store, ephemeral
//! credentials, distributed rate limiting, and the account lifecycle state
//! machine.

mod auth;
mod credentials;
mod email;
pub mod error;
mod jwt;
mod lifecycle;
mod rate_limit;
mod refresh_store;
pub mod store;

pub use auth::AuthService;
pub use credentials::{
    CredentialPurpose, EphemeralCredentialStore, EMAIL_VERIFY_TTL_HOURS, PASSWORD_RESET_TTL_HOURS,
};
pub use email::{MockNotifier, Notifier, SmtpNotifier};
pub use error::AuthError;
pub use jwt::{AccessTokenClaims, RefreshTokenClaims, TokenIssuer, TokenResponse};
pub use lifecycle::{deletions_due, AccountLifecycle, DeletionStatus, SweepReport};
pub use rate_limit::{IdentifierStrategy, RateDecision, RateLimiter, RoutePolicy};
pub use refresh_store::{ClaimOutcome, RefreshTokenStore};
pub use store::{InMemoryStore, RedisStore, SharedStore};
