//! Bazaar API server binary.
//!
//! Serves the REST API and the chat socket gateway, and runs the relay
//! listener that fans pub/sub chat events out to local sockets.

use std::sync::Arc;

use bazaar_api::config::ApiConfig;
use bazaar_api::{AppState, Backends};
use bazaar_core::cache::RedisCache;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments for the API server.
#[derive(Parser, Debug)]
#[command(name = "bazaar_api_server", about = "Bazaar API server")]
struct Args {
    /// Address to listen on.
    #[arg(long, env = "BIND_ADDR", default_value = "127.0.0.1:3000")]
    bind_addr: String,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/bazaar"
    )]
    database_url: String,

    /// Redis URL for the secret cache and chat pub/sub.
    #[arg(long, env = "REDIS_URL", default_value = "redis://localhost:6379")]
    redis_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 10)]
    max_connections: u32,

    /// Keep all state in memory instead of Postgres and Redis.
    ///
    /// Single instance only: chat events do not leave the process.
    #[arg(long, default_value_t = false)]
    memory: bool,

    /// Ensure a verified ADMIN account with this email exists at startup.
    #[arg(long, env = "SEED_ADMIN_EMAIL", requires = "seed_admin_password")]
    seed_admin_email: Option<String>,

    /// Password for the seeded admin account.
    #[arg(long, env = "SEED_ADMIN_PASSWORD", hide_env_values = true)]
    seed_admin_password: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,bazaar_api=debug,bazaar_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let config = ApiConfig {
        bind_addr: args.bind_addr.clone(),
        database_url: args.database_url.clone(),
        redis_url: args.redis_url.clone(),
        ..ApiConfig::from_env()
    };
    if config.production && config.jwt_access_secret == ApiConfig::default().jwt_access_secret {
        warn!("running in production with the development JWT secrets");
    }

    let mut pool = None;
    let backends = if args.memory {
        info!("using in-memory store and cache");
        Backends::memory().0
    } else {
        info!(database_url = %config.database_url, max_connections = args.max_connections, "connecting to postgres");
        let pg = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(&config.database_url)
            .await?;

        info!("running database migrations");
        bazaar_api::migrate(&pg).await?;

        info!(redis_url = %config.redis_url, "connecting to redis");
        let cache = RedisCache::connect(&config.redis_url).await?;
        pool = Some(pg.clone());
        Backends::postgres(pg, Arc::new(cache))
    };

    let state = AppState::new(config.clone(), backends);

    if let (Some(email), Some(password)) = (&args.seed_admin_email, &args.seed_admin_password) {
        state.auth.seed_admin(email, password).await?;
    }

    let cancel = CancellationToken::new();
    let relay = bazaar_api::ws::start_relay(state.cache.clone(), state.hub.clone(), cancel.clone())
        .await?;

    let app = bazaar_api::router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
            }
            cancel.cancel();
        }
    });

    let serve_result = axum::serve(listener, app)
        .with_graceful_shutdown({
            let cancel = cancel.clone();
            async move { cancel.cancelled().await }
        })
        .await;

    cancel.cancel();
    let _ = relay.await;
    if let Some(pool) = pool {
        pool.close().await;
    }

    serve_result?;
    info!("server stopped");
    Ok(())
}
