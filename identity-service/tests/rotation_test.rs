//! Refresh-token rotation and reuse detection through the HTTP surface.

mod common;

use axum::http::StatusCode;
use common::read_json;

#[tokio::test]
async fn test_reused_refresh_token_kills_the_family() {
    let ctx = common::setup().await;
    ctx.register_verified("rotate@example.com", "password123").await;

    // Login yields (A1, R1)
    let (_a1, r1) = ctx.login("rotate@example.com", "password123").await;

    // rotate(R1) yields (A2, R2); R1 is now rotated
    let res = ctx
        .post_json("/auth/refresh", serde_json::json!({ "refresh_token": r1 }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let r2 = read_json(res).await["refresh_token"]
        .as_str()
        .unwrap()
        .to_string();

    // A second rotate(R1) is reuse
    let res = ctx
        .post_json("/auth/refresh", serde_json::json!({ "refresh_token": r1 }))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // ...which revokes the whole family, R2 included
    let res = ctx
        .post_json("/auth/refresh", serde_json::json!({ "refresh_token": r2 }))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_fresh_login_survives_old_family_revocation() {
    let ctx = common::setup().await;
    ctx.register_verified("again@example.com", "password123").await;

    let (_a, r1) = ctx.login("again@example.com", "password123").await;

    // Burn the first family through reuse
    let res = ctx
        .post_json("/auth/refresh", serde_json::json!({ "refresh_token": r1.clone() }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = ctx
        .post_json("/auth/refresh", serde_json::json!({ "refresh_token": r1 }))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // A later login starts a new, working family
    tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    let (_a2, r_new) = ctx.login("again@example.com", "password123").await;
    let res = ctx
        .post_json("/auth/refresh", serde_json::json!({ "refresh_token": r_new }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_rotation_chain_stays_usable() {
    let ctx = common::setup().await;
    ctx.register_verified("chain@example.com", "password123").await;

    let (_a, mut refresh) = ctx.login("chain@example.com", "password123").await;

    // Each hop consumes the previous token and yields a working successor
    for _ in 0..5 {
        let res = ctx
            .post_json(
                "/auth/refresh",
                serde_json::json!({ "refresh_token": refresh }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
        refresh = read_json(res).await["refresh_token"]
            .as_str()
            .unwrap()
            .to_string();
    }
}

#[tokio::test]
async fn test_double_logout_reports_revoked() {
    let ctx = common::setup().await;
    ctx.register_verified("bye@example.com", "password123").await;
    let (_a, refresh) = ctx.login("bye@example.com", "password123").await;

    let res = ctx
        .post_json(
            "/auth/logout",
            serde_json::json!({ "refresh_token": refresh.clone() }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = ctx
        .post_json("/auth/logout", serde_json::json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_garbage_refresh_token() {
    let ctx = common::setup().await;
    let res = ctx
        .post_json(
            "/auth/refresh",
            serde_json::json!({ "refresh_token": "garbage" }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}
