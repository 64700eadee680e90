use chirp_api::server::{
    self, ServerState,
    rate_limit::{DEFAULT_MAX_POSTS, DEFAULT_WINDOW, InvalidRateLimitError, RateLimiter},
};
use chirp_common::snowflake::{WorkerId, WorkerIdOutOfRangeError};
use chirp_db::{
    client::{DbError, Store},
    memory::MemoryStore,
    postgres::PgStore,
};
use serde::Deserialize;
use std::{
    net::{IpAddr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid worker id: {0}")]
    WorkerId(#[from] WorkerIdOutOfRangeError),
    #[error("Invalid rate limit: {0}")]
    RateLimit(#[from] InvalidRateLimitError),
    #[error("Error connecting to the database: {0}")]
    Database(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn default_rate_limit_max_posts() -> u32 {
    DEFAULT_MAX_POSTS.get()
}

fn default_rate_limit_window_secs() -> u64 {
    DEFAULT_WINDOW.as_secs()
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize)]
struct Env {
    server_address: IpAddr,
    server_port: u16,
    database_url: Option<String>,
    #[serde(default)]
    worker_id: u16,
    #[serde(default = "default_rate_limit_max_posts")]
    rate_limit_max_posts: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    rate_limit_window_secs: u64,
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "chirp_api=debug,chirp_client=debug,chirp_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

async fn connect_store(env: &Env) -> Result<Arc<dyn Store>, InitError> {
    let worker_id = WorkerId::try_from(env.worker_id)?;

    if let Some(database_url) = &env.database_url {
        Ok(Arc::new(PgStore::connect(database_url, worker_id).await?))
    } else {
        warn!("DATABASE_URL is not set, keeping everything in memory");
        Ok(Arc::new(MemoryStore::new(worker_id)))
    }
}

fn spawn_rate_limit_pruning(rate_limiter: Arc<RateLimiter>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            rate_limiter.retain_recent();
            debug!(users = rate_limiter.tracked_users(), "Pruned rate limits");
        }
    });
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Could not listen for ctrl-c, shutting down");
        return;
    }
    info!("Shutting down");
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let store = connect_store(&env).await?;
    let window = Duration::from_secs(env.rate_limit_window_secs);
    let rate_limiter = Arc::new(RateLimiter::new(env.rate_limit_max_posts, window)?);
    spawn_rate_limit_pruning(rate_limiter.clone(), window);

    let tracing_layer = TraceLayer::new_for_http();
    let app = server::app(ServerState::new(store, rate_limiter)).layer(tracing_layer);

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
