pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use service_core::axum::{
    extract::State,
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Json, Router,
};
use service_core::middleware::{
    security_headers::security_headers_middleware, tracing::request_id_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::IdentityConfig;
use crate::middleware::{
    auth_middleware, rate_limit_middleware, require_admin, require_verified, RateLimitState,
};
use crate::models::PrincipalRepository;
use crate::services::{
    AccountLifecycle, AuthService, Notifier, RateLimiter, SharedStore, TokenIssuer,
};
use service_core::error::AppError;
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::registration::register,
        handlers::registration::verify_email,
        handlers::session::login,
        handlers::session::refresh,
        handlers::session::logout,
        handlers::password::request_password_reset,
        handlers::password::confirm_password_reset,
        handlers::account::request_account_deletion,
        handlers::account::cancel_account_deletion,
        handlers::account::deletion_status,
        handlers::admin::deletion_sweep,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::RegisterResponse,
            dtos::auth::VerifyRequest,
            dtos::auth::LoginRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::LogoutRequest,
            dtos::auth::PasswordResetRequest,
            dtos::auth::PasswordResetConfirm,
            dtos::auth::MessageResponse,
            dtos::auth::DeletionStatusResponse,
            services::TokenResponse,
            services::SweepReport,
            models::principal::Role,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Login, token rotation, and credential flows"),
        (name = "Account", description = "Account deletion lifecycle"),
        (name = "Admin", description = "Administrative operations"),
        (name = "Observability", description = "Service health")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn SharedStore>,
    pub principals: Arc<dyn PrincipalRepository>,
    pub notifier: Arc<dyn Notifier>,
    pub issuer: TokenIssuer,
    pub auth_service: AuthService,
    pub lifecycle: AccountLifecycle,
    pub rate_limiter: RateLimiter,
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let limits = &state.config.rate_limit;

    let login_route = Router::new()
        .route("/auth/login", post(handlers::login))
        .layer(from_fn_with_state(
            RateLimitState::new(state.rate_limiter.clone(), limits.login_policy(), "login"),
            rate_limit_middleware,
        ));

    let register_route = Router::new()
        .route("/auth/register", post(handlers::register))
        .layer(from_fn_with_state(
            RateLimitState::new(
                state.rate_limiter.clone(),
                limits.register_policy(),
                "register",
            ),
            rate_limit_middleware,
        ));

    let refresh_route = Router::new()
        .route("/auth/refresh", post(handlers::refresh))
        .layer(from_fn_with_state(
            RateLimitState::new(
                state.rate_limiter.clone(),
                limits.refresh_policy(),
                "refresh",
            ),
            rate_limit_middleware,
        ));

    let reset_request_route = Router::new()
        .route(
            "/auth/password-reset/request",
            post(handlers::request_password_reset),
        )
        .layer(from_fn_with_state(
            RateLimitState::new(
                state.rate_limiter.clone(),
                limits.password_reset_policy(),
                "password_reset",
            ),
            rate_limit_middleware,
        ));

    // Deletion management: authenticated, verified, and rate-limited per
    // principal. Layers run outermost-last: auth -> verified -> limit.
    let account_routes = Router::new()
        .route(
            "/auth/account/deletion",
            post(handlers::request_account_deletion)
                .delete(handlers::cancel_account_deletion)
                .get(handlers::deletion_status),
        )
        .layer(from_fn_with_state(
            RateLimitState::new(
                state.rate_limiter.clone(),
                limits.account_policy(),
                "account",
            ),
            rate_limit_middleware,
        ))
        .layer(from_fn(require_verified))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route(
            "/auth/admin/deletion-sweep",
            post(handlers::deletion_sweep),
        )
        .layer(from_fn(require_admin))
        .layer(from_fn_with_state(state.clone(), auth_middleware));

    let mut app = Router::new().route("/health", get(health_check));

    let swagger_enabled = match state.config.environment {
        crate::config::Environment::Dev => true,
        crate::config::Environment::Prod => {
            state.config.swagger.enabled == crate::config::SwaggerMode::Public
        }
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        );
    }

    let app = app
        .route("/auth/verify", get(handlers::verify_email))
        .route(
            "/auth/password-reset/confirm",
            post(handlers::confirm_password_reset),
        )
        .route("/auth/logout", post(handlers::logout))
        .merge(login_route)
        .merge(register_route)
        .merge(refresh_route)
        .merge(reset_request_route)
        .merge(account_routes)
        .merge(admin_routes)
        .with_state(state.clone())
        // Global per-IP limit over everything
        .layer(from_fn_with_state(
            RateLimitState::new(
                state.rate_limiter.clone(),
                limits.global_ip_policy(),
                "global",
            ),
            rate_limit_middleware,
        ))
        .layer(
            TraceLayer::new_for_http().make_span_with(
                |request: &service_core::axum::http::Request<_>| {
                    let request_id = request
                        .headers()
                        .get("x-request-id")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or("-");

                    tracing::info_span!(
                        "http_request",
                        request_id = %request_id,
                        method = %request.method(),
                        uri = %request.uri(),
                        version = ?request.version(),
                    )
                },
            ),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .map(|o| {
                            o.parse::<service_core::axum::http::HeaderValue>()
                                .unwrap_or_else(|e| {
                                    tracing::error!(
                                        "Invalid CORS origin '{}': {}. Using fallback.",
                                        o,
                                        e
                                    );
                                    service_core::axum::http::HeaderValue::from_static("*")
                                })
                        })
                        .collect::<Vec<service_core::axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    service_core::axum::http::Method::GET,
                    service_core::axum::http::Method::POST,
                    service_core::axum::http::Method::DELETE,
                    service_core::axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    service_core::axum::http::header::AUTHORIZATION,
                    service_core::axum::http::header::CONTENT_TYPE,
                ]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 503, description = "Service is unhealthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    // The shared store holds all auth state; without it this service has
    // nothing to say.
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Shared store health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "checks": {
            "store": "up"
        }
    })))
}
