//! Shared helpers: an in-memory app and a JSON request driver.

#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use bazaar_api::config::ApiConfig;
use bazaar_api::{AppState, Backends, router};
use bazaar_core::models::chat::ShopStaff;
use bazaar_core::store::{MemoryStore, StaffDirectory};
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

pub fn test_app() -> TestApp {
    let (backends, store) = Backends::memory();
    let state = AppState::new(ApiConfig::default(), backends);
    TestApp {
        app: router(state.clone()),
        state,
        store,
    }
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl Reply {
    pub fn set_cookie(&self) -> Option<String> {
        self.headers
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    }
}

pub fn request(method: Method, uri: &str, body: Option<Value>, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(app: &Router, req: Request<Body>) -> Reply {
    let resp = app.clone().oneshot(req).await.expect("request");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("read body");
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    Reply {
        status,
        headers,
        body,
    }
}

pub async fn post(app: &Router, uri: &str, body: Value, bearer: Option<&str>) -> Reply {
    send(app, request(Method::POST, uri, Some(body), bearer)).await
}

pub async fn get(app: &Router, uri: &str, bearer: Option<&str>) -> Reply {
    send(app, request(Method::GET, uri, None, bearer)).await
}

/// A registered account with its first session.
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub access: String,
    pub refresh: String,
}

pub const PASSWORD: &str = "Passw0rd!";

pub async fn register(app: &Router, email: &str) -> Account {
    let reply = post(
        app,
        "/v1/auth/register",
        json!({ "email": email, "password": PASSWORD }),
        None,
    )
    .await;
    assert_eq!(reply.status, StatusCode::CREATED, "{}", reply.body);
    account(email, &reply.body)
}

pub async fn login(app: &Router, email: &str, password: &str) -> Reply {
    post(
        app,
        "/v1/auth/login",
        json!({ "email": email, "password": password }),
        None,
    )
    .await
}

pub async fn refresh(app: &Router, token: &str) -> Reply {
    post(app, "/v1/auth/refresh", json!({ "refreshToken": token }), None).await
}

pub fn account(email: &str, body: &Value) -> Account {
    Account {
        id: body["user"]["id"].as_str().unwrap().parse().unwrap(),
        email: email.to_string(),
        access: body["tokens"]["accessToken"].as_str().unwrap().to_string(),
        refresh: body["tokens"]["refreshToken"].as_str().unwrap().to_string(),
    }
}

pub async fn add_staff(store: &MemoryStore, shop_id: Uuid, user_id: Uuid, permissions: &[&str]) {
    store
        .add_staff(ShopStaff {
            shop_id,
            user_id,
            role: "agent".into(),
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        })
        .await
        .unwrap();
}
