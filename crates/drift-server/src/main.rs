use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use drift_core::{Engine, EngineConfig};
use drift_gateway::connection;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drift=debug,tower_http=debug".into()),
        )
        .init();

    // Config
    let host = std::env::var("DRIFT_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("DRIFT_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;

    let defaults = EngineConfig::default();
    let config = EngineConfig {
        delivery_capacity: env_usize("DRIFT_DELIVERY_CAPACITY", defaults.delivery_capacity)?,
        blocking_sends: std::env::var("DRIFT_NONBLOCKING_SENDS").is_err(),
        fallback_match_after: env_ms("DRIFT_FALLBACK_MATCH_MS", defaults.fallback_match_after)?,
        connect_timeout: env_ms("DRIFT_CONNECT_TIMEOUT_MS", defaults.connect_timeout)?,
        match_tick: env_ms("DRIFT_MATCH_TICK_MS", defaults.match_tick)?,
    };

    // Engine + background matcher
    let engine = Engine::new(config);
    engine.spawn_match_ticker();

    // Routes
    let app = Router::new()
        .route("/gateway", get(ws_upgrade))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(engine)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Drift server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn ws_upgrade(
    State(engine): State<Engine>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| connection::handle_connection(socket, engine))
}

fn env_usize(key: &str, default: usize) -> anyhow::Result<usize> {
    match std::env::var(key) {
        Ok(v) => Ok(v.parse()?),
        Err(_) => Ok(default),
    }
}

fn env_ms(key: &str, default: Duration) -> anyhow::Result<Duration> {
    match std::env::var(key) {
        Ok(v) => Ok(Duration::from_millis(v.parse()?)),
        Err(_) => Ok(default),
    }
}
