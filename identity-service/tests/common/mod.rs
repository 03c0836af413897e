//! Test helpers for identity-service integration tests.
//!
//! Assembles the full AppState over the in-memory store and drives the real
//! router, so tests exercise the same pipeline production requests take.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use identity_service::{
    build_router,
    config::{
        Environment, IdentityConfig, JwtConfig, LifecycleConfig, RateLimitConfig, RedisConfig,
        SecurityConfig, SmtpConfig, SwaggerConfig, SwaggerMode,
    },
    models::{InMemoryPrincipals, PrincipalRepository, Role},
    services::{
        AccountLifecycle, AuthService, EphemeralCredentialStore, IdentifierStrategy,
        InMemoryStore, MockNotifier, RateLimiter, RefreshTokenStore, TokenIssuer,
    },
    AppState,
};
use serde_json::Value;
use std::sync::Arc;
use tower::util::ServiceExt;
use uuid::Uuid;

pub struct TestContext {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryStore>,
    pub principals: Arc<InMemoryPrincipals>,
    pub notifier: Arc<MockNotifier>,
}

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config { port: 8080 },
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        jwt: JwtConfig {
            secret: "test-secret-at-least-32-bytes-long!!".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        smtp: SmtpConfig {
            host: "smtp.example.com".to_string(),
            user: "noreply@example.com".to_string(),
            password: "unused".to_string(),
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
            base_url: "http://localhost:3000".to_string(),
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            login_limit: 5,
            login_window_seconds: 60,
            register_limit: 100,
            register_window_seconds: 60,
            refresh_limit: 100,
            refresh_window_seconds: 60,
            password_reset_limit: 3,
            password_reset_window_seconds: 3600,
            account_limit: 100,
            account_window_seconds: 3600,
            account_strategy: IdentifierStrategy::User,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
        lifecycle: LifecycleConfig {
            deletion_grace_days: 30,
            sweep_interval_seconds: 3600,
        },
    }
}

pub async fn setup() -> TestContext {
    setup_with_config(test_config()).await
}

pub async fn setup_with_config(config: IdentityConfig) -> TestContext {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .try_init();

    let store = Arc::new(InMemoryStore::new());
    let principals = Arc::new(InMemoryPrincipals::new());
    let notifier = Arc::new(MockNotifier::new());

    let refresh_tokens =
        RefreshTokenStore::new(store.clone(), config.jwt.refresh_token_expiry_days);
    let issuer = TokenIssuer::new(&config.jwt, refresh_tokens, principals.clone());
    let credentials = EphemeralCredentialStore::new(store.clone());
    let rate_limiter = RateLimiter::new(store.clone());

    let auth_service = AuthService::new(
        principals.clone(),
        issuer.clone(),
        credentials,
        notifier.clone(),
        config.security.base_url.clone(),
    );
    let lifecycle = AccountLifecycle::new(
        principals.clone(),
        issuer.clone(),
        config.lifecycle.deletion_grace_days,
    );

    let state = AppState {
        config,
        store: store.clone(),
        principals: principals.clone(),
        notifier: notifier.clone(),
        issuer,
        auth_service,
        lifecycle,
        rate_limiter,
    };

    let router = build_router(state.clone()).await.expect("router builds");

    TestContext {
        router,
        state,
        store,
        principals,
        notifier,
    }
}

impl TestContext {
    pub async fn post_json(&self, path: &str, body: Value) -> Response<Body> {
        self.request("POST", path, Some(body), None, None).await
    }

    pub async fn post_json_from(&self, path: &str, body: Value, ip: &str) -> Response<Body> {
        self.request("POST", path, Some(body), None, Some(ip)).await
    }

    pub async fn post_authed(&self, path: &str, bearer: &str) -> Response<Body> {
        self.request("POST", path, None, Some(bearer), None).await
    }

    pub async fn get_authed(&self, path: &str, bearer: &str) -> Response<Body> {
        self.request("GET", path, None, Some(bearer), None).await
    }

    pub async fn delete_authed(&self, path: &str, bearer: &str) -> Response<Body> {
        self.request("DELETE", path, None, Some(bearer), None).await
    }

    pub async fn get(&self, path: &str) -> Response<Body> {
        self.request("GET", path, None, None, None).await
    }

    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
        bearer: Option<&str>,
        ip: Option<&str>,
    ) -> Response<Body> {
        let mut builder = Request::builder().method(method).uri(path);

        if let Some(bearer) = bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", bearer));
        }
        if let Some(ip) = ip {
            builder = builder.header("x-forwarded-for", ip);
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("request succeeds")
    }

    /// Register a principal and complete email verification.
    pub async fn register_verified(&self, email: &str, password: &str) -> Uuid {
        let res = self
            .post_json(
                "/auth/register",
                serde_json::json!({
                    "email": email,
                    "password": password,
                    "organization_id": Uuid::new_v4(),
                }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::CREATED);
        let body = read_json(res).await;
        let principal_id: Uuid = body["principal_id"].as_str().unwrap().parse().unwrap();

        let token = self.wait_for_verification_token(email).await;
        let res = self.get(&format!("/auth/verify?token={}", token)).await;
        assert_eq!(res.status(), StatusCode::OK);

        principal_id
    }

    /// Login and return (access_token, refresh_token).
    pub async fn login(&self, email: &str, password: &str) -> (String, String) {
        let res = self
            .post_json(
                "/auth/login",
                serde_json::json!({ "email": email, "password": password }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        let body = read_json(res).await;
        (
            body["access_token"].as_str().unwrap().to_string(),
            body["refresh_token"].as_str().unwrap().to_string(),
        )
    }

    /// Email dispatch is fire-and-forget; poll until the spawned task has
    /// recorded the token.
    pub async fn wait_for_verification_token(&self, email: &str) -> String {
        for _ in 0..100 {
            if let Some(token) = self
                .notifier
                .verification_tokens
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(to, _)| to == email)
                .map(|(_, token)| token.clone())
            {
                return token;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("verification email for {} never dispatched", email);
    }

    pub async fn wait_for_reset_token(&self, email: &str) -> String {
        for _ in 0..100 {
            if let Some(token) = self
                .notifier
                .reset_tokens
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(to, _)| to == email)
                .map(|(_, token)| token.clone())
            {
                return token;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("reset email for {} never dispatched", email);
    }

    /// Promote a principal to admin directly through the repository.
    pub async fn make_admin(&self, id: Uuid) {
        let mut principal = self.principals.find_by_id(id).await.unwrap().unwrap();
        principal.role = Role::Admin;
        self.principals.insert(&principal).await.unwrap();
    }
}

pub async fn read_json(response: Response<Body>) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body reads")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is json")
}
