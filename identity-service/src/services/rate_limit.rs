//! Distributed request-rate limiter.
//!
//! Fixed-window counters keyed by (action, identifier), kept in the shared
//! store so every process sees the same accounting. The window is anchored
//! by the first increment and bounded by the store's TTL, never by
//! per-process wall-clock. The increment is unconditional and atomic, so at
//! most `limit` calls are ever admitted per window however many processes
//! race.

use serde::Deserialize;
use std::sync::Arc;

use crate::services::{error::AuthError, store::SharedStore};

const KEY_PREFIX: &str = "rate:";

/// How a route identifies callers for rate accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentifierStrategy {
    Ip,
    User,
}

impl std::str::FromStr for IdentifierStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ip" => Ok(IdentifierStrategy::Ip),
            "user" => Ok(IdentifierStrategy::User),
            _ => Err(format!("Invalid identifier strategy: {}", s)),
        }
    }
}

/// Declarative per-route limit.
#[derive(Debug, Clone, Copy)]
pub struct RoutePolicy {
    pub limit: u32,
    pub window_seconds: u64,
    pub identifier_strategy: IdentifierStrategy,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Denied { retry_after_seconds: u64 },
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Count this call against `(identifier, action)` and decide.
    pub async fn check_and_increment(
        &self,
        identifier: &str,
        action: &str,
        limit: u32,
        window_seconds: u64,
    ) -> Result<RateDecision, AuthError> {
        let key = format!("{}{}:{}", KEY_PREFIX, action, identifier);
        let (count, ttl) = self
            .store
            .incr_ex(&key, window_seconds as i64)
            .await
            .map_err(AuthError::Store)?;

        if count > limit as i64 {
            let retry_after = if ttl > 0 { ttl as u64 } else { window_seconds };
            tracing::warn!(
                action,
                identifier,
                count,
                limit,
                "Rate limit exceeded"
            );
            Ok(RateDecision::Denied {
                retry_after_seconds: retry_after,
            })
        } else {
            Ok(RateDecision::Allowed {
                remaining: limit - count as u32,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::InMemoryStore;
    use std::time::Duration;

    #[tokio::test]
    async fn test_limit_admits_exactly_limit_calls() {
        let store = Arc::new(InMemoryStore::new());
        let limiter = RateLimiter::new(store.clone());

        for i in 0..5 {
            let decision = limiter
                .check_and_increment("1.2.3.4", "login", 5, 60)
                .await
                .unwrap();
            assert!(
                matches!(decision, RateDecision::Allowed { .. }),
                "call {} should be allowed",
                i
            );
        }

        match limiter
            .check_and_increment("1.2.3.4", "login", 5, 60)
            .await
            .unwrap()
        {
            RateDecision::Denied {
                retry_after_seconds,
            } => assert!(retry_after_seconds <= 60),
            other => panic!("expected denial, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_window_elapse_resets() {
        let store = Arc::new(InMemoryStore::new());
        let limiter = RateLimiter::new(store.clone());

        for _ in 0..6 {
            let _ = limiter
                .check_and_increment("1.2.3.4", "login", 5, 60)
                .await
                .unwrap();
        }

        store.advance(Duration::from_secs(61));
        let decision = limiter
            .check_and_increment("1.2.3.4", "login", 5, 60)
            .await
            .unwrap();
        assert!(matches!(decision, RateDecision::Allowed { .. }));
    }

    #[tokio::test]
    async fn test_identifiers_and_actions_are_independent() {
        let store = Arc::new(InMemoryStore::new());
        let limiter = RateLimiter::new(store);

        for _ in 0..3 {
            let _ = limiter
                .check_and_increment("1.2.3.4", "login", 3, 60)
                .await
                .unwrap();
        }

        // Same IP, different action
        assert!(matches!(
            limiter
                .check_and_increment("1.2.3.4", "password_reset", 3, 60)
                .await
                .unwrap(),
            RateDecision::Allowed { .. }
        ));

        // Same action, different IP
        assert!(matches!(
            limiter
                .check_and_increment("5.6.7.8", "login", 3, 60)
                .await
                .unwrap(),
            RateDecision::Allowed { .. }
        ));
    }
}
