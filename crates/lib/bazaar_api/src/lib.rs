//! # bazaar_api
//!
//! HTTP and WebSocket API library for Bazaar.

pub mod config;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod ws;

use std::sync::Arc;

use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use bazaar_core::auth::tokens::TokenService;
use bazaar_core::cache::{MemoryCache, SecretCache};
use bazaar_core::models::auth::Role;
use bazaar_core::store::{ChatStore, CredentialStore, MemoryStore, PgStore, StaffDirectory};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::handlers::{admin, auth, chat, health};
use crate::middleware::auth::require_auth;
use crate::middleware::guards::{PermissionGate, RoleGate, require_permissions, require_roles};
use crate::services::auth::AuthService;
use crate::services::chat::ChatService;
use crate::ws::ChatHub;

/// Permission required to read a shop's conversations.
pub const CHAT_READ: &str = "chat.read";

/// Storage and cache handles the services are built from.
#[derive(Clone)]
pub struct Backends {
    pub credentials: Arc<dyn CredentialStore>,
    pub staff: Arc<dyn StaffDirectory>,
    pub chat: Arc<dyn ChatStore>,
    pub cache: Arc<dyn SecretCache>,
}

impl Backends {
    /// Postgres for records, `cache` for secrets and pub/sub.
    pub fn postgres(pool: PgPool, cache: Arc<dyn SecretCache>) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self {
            credentials: store.clone(),
            staff: store.clone(),
            chat: store,
            cache,
        }
    }

    /// Everything in-process. Returns the store too so callers can seed it.
    pub fn memory() -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let backends = Self {
            credentials: store.clone(),
            staff: store.clone(),
            chat: store.clone(),
            cache: Arc::new(MemoryCache::new()),
        };
        (backends, store)
    }
}

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub auth: AuthService,
    pub chat: ChatService,
    pub tokens: TokenService,
    pub staff: Arc<dyn StaffDirectory>,
    pub cache: Arc<dyn SecretCache>,
    /// Local socket rooms fed by the relay listener.
    pub hub: ChatHub,
}

impl AppState {
    pub fn new(config: ApiConfig, backends: Backends) -> Self {
        let tokens = TokenService::new(backends.cache.clone(), config.token_settings());
        let auth = AuthService::new(
            backends.credentials,
            backends.cache.clone(),
            tokens.clone(),
            config.production,
        );
        let chat = ChatService::new(
            backends.chat,
            backends.staff.clone(),
            backends.cache.clone(),
        );
        Self {
            config,
            auth,
            chat,
            tokens,
            staff: backends.staff,
            cache: backends.cache,
            hub: ChatHub::new(),
        }
    }
}

/// Run embedded database migrations.
///
/// Delegates to `bazaar_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    bazaar_core::migrate::migrate(pool).await
}

/// Builds the Axum router with all routes and shared state.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin_gate = RoleGate {
        roles: &[Role::Admin],
    };
    let chat_read_gate = PermissionGate {
        staff: state.staff.clone(),
        permissions: &[CHAT_READ],
    };

    // Public routes (no auth required)
    let public = Router::new()
        .route("/v1/auth/health", get(health::auth_health))
        .route("/v1/auth/register", post(auth::register_handler))
        .route("/v1/auth/login", post(auth::login_handler))
        .route("/v1/auth/refresh", post(auth::refresh_handler))
        .route("/v1/auth/forgot", post(auth::forgot_handler))
        .route("/v1/auth/reset", post(auth::reset_handler))
        .route("/v1/auth/verify", post(auth::verify_handler))
        .route("/v1/chat/health", get(health::chat_health))
        .route("/ws", get(ws::ws_handler));

    // Protected routes: authentication wraps every per-route gate
    let protected = Router::new()
        .route("/v1/auth/logout", post(auth::logout_handler))
        .route("/v1/auth/me", get(auth::me_handler))
        .route(
            "/v1/chat/conversations",
            post(chat::start_handler).get(chat::list_mine_handler),
        )
        .route(
            "/v1/chat/shops/{shopId}/conversations",
            get(chat::list_shop_handler)
                .route_layer(from_fn_with_state(chat_read_gate, require_permissions)),
        )
        .route(
            "/v1/chat/conversations/{id}/messages",
            get(chat::list_messages_handler).post(chat::send_message_handler),
        )
        .route(
            "/v1/chat/conversations/{id}/read",
            post(chat::mark_read_handler),
        )
        .route(
            "/v1/admin/users/{id}/sessions/revoke",
            post(admin::revoke_sessions_handler)
                .route_layer(from_fn_with_state(admin_gate, require_roles)),
        )
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .with_state(state)
}
