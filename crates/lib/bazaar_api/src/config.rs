//! API server configuration.

use bazaar_core::auth::tokens::{DEFAULT_ACCESS_TTL_SECS, DEFAULT_REFRESH_TTL_SECS, TokenSettings};

/// Default number of messages replayed to a socket on `chat:join`.
pub const DEFAULT_BACKFILL_LIMIT: i64 = 30;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3000").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis URL for the secret cache and chat pub/sub.
    pub redis_url: String,
    pub jwt_access_secret: String,
    pub jwt_refresh_secret: String,
    pub access_ttl_secs: i64,
    pub refresh_ttl_secs: i64,
    /// Production mode: secure cookies, no dev tokens in responses.
    pub production: bool,
    pub backfill_limit: i64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:3000".into(),
            database_url: "postgres://localhost:5432/bazaar".into(),
            redis_url: "redis://localhost:6379".into(),
            jwt_access_secret: "dev_access_secret".into(),
            jwt_refresh_secret: "dev_refresh_secret".into(),
            access_ttl_secs: DEFAULT_ACCESS_TTL_SECS,
            refresh_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
            production: false,
            backfill_limit: DEFAULT_BACKFILL_LIMIT,
        }
    }
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable              | Default                             |
    /// |-----------------------|-------------------------------------|
    /// | `BIND_ADDR`           | `127.0.0.1:3000`                    |
    /// | `DATABASE_URL`        | `postgres://localhost:5432/bazaar`  |
    /// | `REDIS_URL`           | `redis://localhost:6379`            |
    /// | `JWT_ACCESS_SECRET`   | `dev_access_secret`                 |
    /// | `JWT_REFRESH_SECRET`  | `dev_refresh_secret`                |
    /// | `JWT_ACCESS_EXPIRES`  | `900`                               |
    /// | `JWT_REFRESH_EXPIRES` | `604800`                            |
    /// | `APP_ENV`             | unset (`production` enables prod)   |
    /// | `CHAT_BACKFILL_LIMIT` | `30`                                |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_or("BIND_ADDR", defaults.bind_addr),
            database_url: env_or("DATABASE_URL", defaults.database_url),
            redis_url: env_or("REDIS_URL", defaults.redis_url),
            jwt_access_secret: env_or("JWT_ACCESS_SECRET", defaults.jwt_access_secret),
            jwt_refresh_secret: env_or("JWT_REFRESH_SECRET", defaults.jwt_refresh_secret),
            access_ttl_secs: env_parse("JWT_ACCESS_EXPIRES", defaults.access_ttl_secs),
            refresh_ttl_secs: env_parse("JWT_REFRESH_EXPIRES", defaults.refresh_ttl_secs),
            production: std::env::var("APP_ENV").is_ok_and(|v| v == "production"),
            backfill_limit: env_parse("CHAT_BACKFILL_LIMIT", defaults.backfill_limit),
        }
    }

    pub fn token_settings(&self) -> TokenSettings {
        TokenSettings {
            access_secret: self.jwt_access_secret.clone(),
            refresh_secret: self.jwt_refresh_secret.clone(),
            access_ttl_secs: self.access_ttl_secs,
            refresh_ttl_secs: self.refresh_ttl_secs,
        }
    }
}

fn env_or(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(v) if !v.is_empty() => v,
        _ => default,
    }
}

fn env_parse(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
