pub mod auth;
pub mod rate_limit;

pub use auth::{auth_middleware, require_admin, require_verified, AuthUser, CurrentPrincipal};
pub use rate_limit::{rate_limit_middleware, RateLimitState};
