use identity_service::{
    build_router,
    config::IdentityConfig,
    models::InMemoryPrincipals,
    services::{
        AccountLifecycle, AuthService, EphemeralCredentialStore, RateLimiter, RedisStore,
        RefreshTokenStore, SmtpNotifier, TokenIssuer,
    },
    AppState,
};
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    // The shared store is the single authority for cross-process auth state
    let store = Arc::new(RedisStore::new(&config.redis).await?);
    tracing::info!("Shared store initialized");

    // Principal storage is owned by the platform's user service; standalone
    // deployments run on the in-memory repository.
    let principals = Arc::new(InMemoryPrincipals::new());

    let notifier = Arc::new(SmtpNotifier::new(&config.smtp)?);
    tracing::info!("Notifier initialized");

    let refresh_tokens = RefreshTokenStore::new(store.clone(), config.jwt.refresh_token_expiry_days);
    let issuer = TokenIssuer::new(&config.jwt, refresh_tokens, principals.clone());
    let credentials = EphemeralCredentialStore::new(store.clone());
    let rate_limiter = RateLimiter::new(store.clone());
    tracing::info!("Token issuer and rate limiter initialized");

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

    // Periodic deletion sweep; the same operation is exposed to admins
    let sweep_lifecycle = lifecycle.clone();
    let sweep_interval = config.lifecycle.sweep_interval_seconds;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(sweep_interval.max(1)));
        loop {
            interval.tick().await;
            match sweep_lifecycle.sweep(chrono::Utc::now()).await {
                Ok(report) => {
                    if report.deleted > 0 || report.skipped > 0 {
                        tracing::info!(
                            deleted = report.deleted,
                            skipped = report.skipped,
                            "Deletion sweep completed"
                        );
                    }
                }
                Err(e) => tracing::error!(error = %e, "Deletion sweep failed"),
            }
        }
    });

    let state = AppState {
        config: config.clone(),
        store,
        principals,
        notifier,
        issuer,
        auth_service,
        lifecycle,
        rate_limiter,
    };

    let app = build_router(state).await?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
