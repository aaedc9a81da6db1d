//! Auth lifecycle through the router: registration, login, refresh rotation
//! with reuse detection, logout, password reset and email verification.

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use serde_json::json;

use common::{PASSWORD, get, login, post, refresh, register, request, send, test_app};

#[tokio::test]
async fn health_reports_module() {
    let t = test_app();
    let reply = get(&t.app, "/v1/auth/health", None).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "ok": true, "module": "auth" }));
}

#[tokio::test]
async fn register_then_login_returns_same_user() {
    let t = test_app();
    let reply = post(
        &t.app,
        "/v1/auth/register",
        json!({ "email": "buyer@example.com", "password": PASSWORD, "name": "Buyer" }),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.body["user"]["status"], "UNVERIFIED");
    assert!(reply.body["user"].get("passwordHash").is_none());
    assert_eq!(reply.body["tokens"]["expiresIn"], 900);
    assert!(reply.body["verifyToken"].is_string());
    let cookie = reply.set_cookie().unwrap();
    assert!(cookie.starts_with("refresh_token="));
    assert!(cookie.contains("HttpOnly"));

    let registered = reply.body["user"]["id"].clone();
    let logged_in = login(&t.app, "buyer@example.com", PASSWORD).await;
    assert_eq!(logged_in.status, StatusCode::OK);
    assert_eq!(logged_in.body["user"]["id"], registered);
}

#[tokio::test]
async fn duplicate_email_is_a_conflict() {
    let t = test_app();
    register(&t.app, "dup@example.com").await;
    let reply = post(
        &t.app,
        "/v1/auth/register",
        json!({ "email": "dup@example.com", "password": PASSWORD }),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::CONFLICT);
    assert_eq!(reply.body["code"], "CONFLICT");
}

#[tokio::test]
async fn register_validates_input() {
    let t = test_app();
    let bad_email = post(
        &t.app,
        "/v1/auth/register",
        json!({ "email": "not-an-email", "password": PASSWORD }),
        None,
    )
    .await;
    assert_eq!(bad_email.status, StatusCode::BAD_REQUEST);
    assert_eq!(bad_email.body["code"], "BAD_REQUEST");

    let short = post(
        &t.app,
        "/v1/auth/register",
        json!({ "email": "a@example.com", "password": "short" }),
        None,
    )
    .await;
    assert_eq!(short.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_json_is_unprocessable() {
    let t = test_app();
    let req = Request::builder()
        .method(Method::POST)
        .uri("/v1/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let reply = send(&t.app, req).await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(reply.body["code"], "UNPROCESSABLE_ENTITY");
    assert!(reply.body.get("details").is_some());
}

#[tokio::test]
async fn bad_credentials_are_indistinguishable() {
    let t = test_app();
    register(&t.app, "user@example.com").await;
    let wrong_password = login(&t.app, "user@example.com", "wrong-password").await;
    let unknown_email = login(&t.app, "nobody@example.com", PASSWORD).await;
    assert_eq!(wrong_password.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email.status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.body["message"], "Invalid credentials");
    assert_eq!(wrong_password.body, unknown_email.body);
}

#[tokio::test]
async fn refresh_rotates_and_replay_revokes_every_session() {
    let t = test_app();
    let first = register(&t.app, "rotate@example.com").await;
    let second = common::account(
        "rotate@example.com",
        &login(&t.app, "rotate@example.com", PASSWORD).await.body,
    );

    let rotated = refresh(&t.app, &first.refresh).await;
    assert_eq!(rotated.status, StatusCode::OK);
    let next = rotated.body["tokens"]["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(next, first.refresh);
    assert_eq!(rotated.body["user"]["id"], first.id.to_string());

    // Replaying the consumed token is treated as theft.
    let replay = refresh(&t.app, &first.refresh).await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);

    // Both lineages are gone.
    assert_eq!(refresh(&t.app, &next).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        refresh(&t.app, &second.refresh).await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn refresh_reads_cookie_when_body_is_empty() {
    let t = test_app();
    let account = register(&t.app, "cookie@example.com").await;
    let req = Request::builder()
        .method(Method::POST)
        .uri("/v1/auth/refresh")
        .header(header::COOKIE, format!("refresh_token={}", account.refresh))
        .body(Body::empty())
        .unwrap();
    let reply = send(&t.app, req).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert!(reply.set_cookie().unwrap().starts_with("refresh_token="));
}

#[tokio::test]
async fn refresh_without_token_is_unauthorized() {
    let t = test_app();
    let reply = send(&t.app, request(Method::POST, "/v1/auth/refresh", None, None)).await;
    assert_eq!(reply.status, StatusCode::UNAUTHORIZED);

    let garbage = refresh(&t.app, "not-a-jwt").await;
    assert_eq!(garbage.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn access_token_is_not_a_refresh_token() {
    let t = test_app();
    let account = register(&t.app, "swap@example.com").await;
    assert_eq!(
        refresh(&t.app, &account.access).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        get(&t.app, "/v1/auth/me", Some(&account.refresh)).await.status,
        StatusCode::UNAUTHORIZED
    );
}

#[tokio::test]
async fn me_requires_bearer_token() {
    let t = test_app();
    let account = register(&t.app, "me@example.com").await;
    let me = get(&t.app, "/v1/auth/me", Some(&account.access)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.body["email"], "me@example.com");

    let anonymous = get(&t.app, "/v1/auth/me", None).await;
    assert_eq!(anonymous.status, StatusCode::UNAUTHORIZED);
    assert_eq!(anonymous.body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn logout_revokes_refresh_but_not_access() {
    let t = test_app();
    let account = register(&t.app, "bye@example.com").await;
    let reply = post(&t.app, "/v1/auth/logout", json!({}), Some(&account.access)).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body["success"], true);
    assert!(reply.set_cookie().unwrap().contains("Max-Age=0"));

    assert_eq!(
        refresh(&t.app, &account.refresh).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        get(&t.app, "/v1/auth/me", Some(&account.access)).await.status,
        StatusCode::OK
    );
}

#[tokio::test]
async fn password_reset_replaces_password_and_sessions() {
    let t = test_app();
    let account = register(&t.app, "reset@example.com").await;

    let forgot = post(
        &t.app,
        "/v1/auth/forgot",
        json!({ "email": "reset@example.com" }),
        None,
    )
    .await;
    assert_eq!(forgot.status, StatusCode::OK);
    let token = forgot.body["token"].as_str().unwrap().to_string();

    let reset = post(
        &t.app,
        "/v1/auth/reset",
        json!({ "token": token, "password": "N3w-password" }),
        None,
    )
    .await;
    assert_eq!(reset.status, StatusCode::OK);

    assert_eq!(
        login(&t.app, "reset@example.com", PASSWORD).await.status,
        StatusCode::UNAUTHORIZED
    );
    assert_eq!(
        login(&t.app, "reset@example.com", "N3w-password").await.status,
        StatusCode::OK
    );
    assert_eq!(
        refresh(&t.app, &account.refresh).await.status,
        StatusCode::UNAUTHORIZED
    );

    let reused = post(
        &t.app,
        "/v1/auth/reset",
        json!({ "token": token, "password": "An0ther-password" }),
        None,
    )
    .await;
    assert_eq!(reused.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forgot_does_not_reveal_unknown_emails() {
    let t = test_app();
    let reply = post(
        &t.app,
        "/v1/auth/forgot",
        json!({ "email": "ghost@example.com" }),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.body, json!({ "success": true }));
}

#[tokio::test]
async fn email_verification_is_single_use() {
    let t = test_app();
    let reply = post(
        &t.app,
        "/v1/auth/register",
        json!({ "email": "verify@example.com", "password": PASSWORD }),
        None,
    )
    .await;
    let token = reply.body["verifyToken"].as_str().unwrap().to_string();
    let access = reply.body["tokens"]["accessToken"].as_str().unwrap().to_string();

    let verified = post(&t.app, "/v1/auth/verify", json!({ "token": token }), None).await;
    assert_eq!(verified.status, StatusCode::OK);
    let me = get(&t.app, "/v1/auth/me", Some(&access)).await;
    assert_eq!(me.body["status"], "VERIFIED");

    let again = post(&t.app, "/v1/auth/verify", json!({ "token": token }), None).await;
    assert_eq!(again.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn admin_can_revoke_another_users_sessions() {
    let t = test_app();
    t.state
        .auth
        .seed_admin("admin@example.com", PASSWORD)
        .await
        .unwrap();
    let admin = common::account(
        "admin@example.com",
        &login(&t.app, "admin@example.com", PASSWORD).await.body,
    );
    let customer = register(&t.app, "victim@example.com").await;
    let uri = format!("/v1/admin/users/{}/sessions/revoke", customer.id);

    let refused = post(&t.app, &uri, json!({}), Some(&customer.access)).await;
    assert_eq!(refused.status, StatusCode::FORBIDDEN);

    let revoked = post(&t.app, &uri, json!({}), Some(&admin.access)).await;
    assert_eq!(revoked.status, StatusCode::OK);
    assert_eq!(
        refresh(&t.app, &customer.refresh).await.status,
        StatusCode::UNAUTHORIZED
    );

    let missing = post(
        &t.app,
        "/v1/admin/users/not-a-uuid/sessions/revoke",
        json!({}),
        Some(&admin.access),
    )
    .await;
    assert_eq!(missing.status, StatusCode::NOT_FOUND);
}
