pub mod principal;
pub mod refresh_token;

pub use principal::{InMemoryPrincipals, Principal, PrincipalRepository, Role};
pub use refresh_token::RefreshTokenRecord;
