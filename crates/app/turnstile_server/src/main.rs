//! Turnstile authorization server binary.
//!
//! Serves the OAuth2 token and authorization endpoints plus first-party
//! login over PostgreSQL.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use turnstile_api::config::ApiConfig;
use turnstile_core::store::{GrantStore, PgStore};

/// CLI arguments for the server.
#[derive(Parser, Debug)]
#[command(name = "turnstile_server", about = "Turnstile authorization server")]
struct Args {
    /// Port to listen on. Overrides the port of `BIND_ADDR` when given.
    #[arg(long)]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "postgres://localhost:5432/turnstile"
    )]
    database_url: String,

    /// Maximum number of database connections in the pool.
    #[arg(long, default_value_t = 5)]
    max_connections: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(
                    "info,turnstile_api=debug,turnstile_core=debug",
                )
            }),
        )
        .init();

    let args = Args::parse();

    // Missing JWT_SECRET is fatal here, before anything binds.
    let mut config = ApiConfig::from_env()?;
    config.pg_connection_url = args.database_url.clone();
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map_or("127.0.0.1", |(host, _)| host);
        config.bind_addr = format!("{host}:{port}");
    }

    info!(bind_addr = %config.bind_addr, "starting turnstile_server");
    info!(max_connections = args.max_connections, "configuring connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(args.max_connections)
        .acquire_timeout(std::time::Duration::from_secs(30))
        .connect(&config.pg_connection_url)
        .await?;

    info!("running database migrations");
    turnstile_api::migrate(&pool).await?;

    let store = PgStore::new(pool);
    match store.purge_expired().await {
        Ok(purged) => info!(purged, "purged expired codes and tokens"),
        Err(e) => warn!(error = %e, "purge of expired codes and tokens failed"),
    }

    let state = turnstile_api::AppState::new(Arc::new(store), config.clone())?;
    let app = turnstile_api::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, "REST API listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
