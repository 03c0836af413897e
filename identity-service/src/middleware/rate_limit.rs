//! Per-route distributed rate limiting.
//!
//! Accounting lives in the shared store, so the decision is the same
//! whether one process or many serve the route.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;
use std::net::SocketAddr;

use crate::middleware::auth::CurrentPrincipal;
use crate::services::{
    AuthError, IdentifierStrategy, RateDecision, RateLimiter, RoutePolicy,
};

#[derive(Clone)]
pub struct RateLimitState {
    pub limiter: RateLimiter,
    pub policy: RoutePolicy,
    pub action: &'static str,
}

impl RateLimitState {
    pub fn new(limiter: RateLimiter, policy: RoutePolicy, action: &'static str) -> Self {
        Self {
            limiter,
            policy,
            action,
        }
    }
}

pub async fn rate_limit_middleware(
    State(state): State<RateLimitState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let identifier = match state.policy.identifier_strategy {
        IdentifierStrategy::Ip => client_ip(&req),
        // Falls back to IP when no principal is attached yet
        IdentifierStrategy::User => req
            .extensions()
            .get::<CurrentPrincipal>()
            .map(|p| p.id.to_string())
            .or_else(|| client_ip(&req)),
    };

    let Some(identifier) = identifier else {
        tracing::warn!(action = state.action, "Could not identify caller for rate limiting");
        return Ok(next.run(req).await);
    };

    let decision = state
        .limiter
        .check_and_increment(
            &identifier,
            state.action,
            state.policy.limit,
            state.policy.window_seconds,
        )
        .await?;

    match decision {
        RateDecision::Allowed { remaining } => {
            let mut response = next.run(req).await;
            let headers = response.headers_mut();
            headers.insert("x-ratelimit-limit", state.policy.limit.into());
            headers.insert("x-ratelimit-remaining", remaining.into());
            Ok(response)
        }
        RateDecision::Denied {
            retry_after_seconds,
        } => Err(AuthError::RateLimited {
            retry_after: retry_after_seconds,
        }
        .into()),
    }
}

/// Caller IP: x-forwarded-for first, then the connection address.
fn client_ip(req: &Request) -> Option<String> {
    let forwarded = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok());

    if let Some(ip) = forwarded {
        return Some(ip.to_string());
    }

    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}
