//! End-to-end authentication flows through the router.

mod common;

use axum::http::StatusCode;
use common::read_json;
use uuid::Uuid;

#[tokio::test]
async fn test_register_verify_login_refresh_logout() {
    let ctx = common::setup().await;

    ctx.register_verified("user@example.com", "password123").await;
    let (access, refresh) = ctx.login("user@example.com", "password123").await;

    // Access token drives authenticated routes
    let res = ctx.get_authed("/auth/account/deletion", &access).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["pending"], false);

    // Rotate the pair
    let res = ctx
        .post_json("/auth/refresh", serde_json::json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    let new_refresh = body["refresh_token"].as_str().unwrap().to_string();
    assert_ne!(new_refresh, refresh);

    // Logout revokes the family
    let res = ctx
        .post_json(
            "/auth/logout",
            serde_json::json!({ "refresh_token": new_refresh }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = ctx
        .post_json(
            "/auth/refresh",
            serde_json::json!({ "refresh_token": new_refresh }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_login_requires_verification() {
    let ctx = common::setup().await;

    let res = ctx
        .post_json(
            "/auth/register",
            serde_json::json!({
                "email": "unverified@example.com",
                "password": "password123",
                "organization_id": Uuid::new_v4(),
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = ctx
        .post_json(
            "/auth/login",
            serde_json::json!({
                "email": "unverified@example.com",
                "password": "password123",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_login_rejects_wrong_password_and_unknown_email_alike() {
    let ctx = common::setup().await;
    ctx.register_verified("known@example.com", "password123").await;

    let wrong_password = ctx
        .post_json(
            "/auth/login",
            serde_json::json!({
                "email": "known@example.com",
                "password": "wrong-password",
            }),
        )
        .await;
    let unknown_email = ctx
        .post_json(
            "/auth/login",
            serde_json::json!({
                "email": "nobody@example.com",
                "password": "password123",
            }),
        )
        .await;

    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);

    let a = read_json(wrong_password).await;
    let b = read_json(unknown_email).await;
    assert_eq!(a["error"], b["error"]);
}

#[tokio::test]
async fn test_duplicate_registration_conflicts() {
    let ctx = common::setup().await;
    ctx.register_verified("dup@example.com", "password123").await;

    let res = ctx
        .post_json(
            "/auth/register",
            serde_json::json!({
                "email": "dup@example.com",
                "password": "password456",
                "organization_id": Uuid::new_v4(),
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_protected_route_rejects_bad_tokens() {
    let ctx = common::setup().await;

    // No header
    let res = ctx.get("/auth/account/deletion").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Garbage bearer
    let res = ctx.get_authed("/auth/account/deletion", "not-a-jwt").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_refresh_token_rejected_on_protected_route() {
    let ctx = common::setup().await;
    ctx.register_verified("swap@example.com", "password123").await;
    let (_, refresh) = ctx.login("swap@example.com", "password123").await;

    // A refresh token is not an access token
    let res = ctx.get_authed("/auth/account/deletion", &refresh).await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_validation_errors() {
    let ctx = common::setup().await;

    // Malformed email
    let res = ctx
        .post_json(
            "/auth/register",
            serde_json::json!({
                "email": "not-an-email",
                "password": "password123",
                "organization_id": Uuid::new_v4(),
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // Short password
    let res = ctx
        .post_json(
            "/auth/register",
            serde_json::json!({
                "email": "ok@example.com",
                "password": "short",
                "organization_id": Uuid::new_v4(),
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_health_endpoint() {
    let ctx = common::setup().await;
    let res = ctx.get("/health").await;
    assert_eq!(res.status(), StatusCode::OK);
    let body = read_json(res).await;
    assert_eq!(body["status"], "healthy");
}
