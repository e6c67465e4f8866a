//! tle-daemon entry point.
//!
//! This file is intentionally thin: it loads config, assembles the
//! [`tle_runtime::Runtime`], wires middleware, and starts the HTTP server.
//! All route handlers live in `routes.rs`; all shared state lives in
//! `state.rs`.

use std::{net::SocketAddr, sync::Arc, sync::Mutex, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tle_audit::AuditWriter;
use tle_broker::BrokerAdapter;
use tle_broker_live::LiveBroker;
use tle_broker_sim::SimBroker;
use tle_clock::{Clock, SystemClock};
use tle_config::{Config, Mode};
use tle_daemon::{routes, state};
use tle_runtime::Runtime;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Dev-time .env.local bootstrap; silent if the file does not exist —
    // production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let (config, config_hash) = load_config()?;
    let mode = config.mode;

    let broker: Arc<dyn BrokerAdapter> = match mode {
        Mode::Live => Arc::new(LiveBroker::from_env().context("LIVE mode requires APCA_API_* env vars")?),
        Mode::Simulation => {
            let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
            Arc::new(SimBroker::new(clock))
        }
    };

    let audit_path = std::env::var("TLE_AUDIT_LOG_PATH").unwrap_or_else(|_| "tle-audit.jsonl".to_string());
    let audit = Arc::new(Mutex::new(
        AuditWriter::new(&audit_path, true).with_context(|| format!("open audit log at {audit_path}"))?,
    ));

    let run_id = uuid::Uuid::new_v4();
    let runtime = Arc::new(
        Runtime::new(config, config_hash, broker, audit, run_id).context("runtime construction failed")?,
    );
    runtime.refresh_symbols().unwrap_or_else(|e| {
        tracing::warn!(error = ?e, "initial symbol refresh failed; will retry on the next scan cycle")
    });

    let shared = Arc::new(state::AppState::new(runtime));
    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!(mode = ?mode, run_id = %run_id, "tle-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

/// Loads layered YAML config from `TLE_CONFIG_PATHS` (colon-separated,
/// later files override earlier ones) if set; falls back to
/// `Config::sane_defaults()` otherwise, hashed the same way so the
/// "identical config between live and simulation" lifecycle rule (§3) is
/// mechanically checkable either way.
fn load_config() -> anyhow::Result<(Config, String)> {
    match std::env::var("TLE_CONFIG_PATHS") {
        Ok(paths) => {
            let paths: Vec<&str> = paths.split(':').filter(|s| !s.is_empty()).collect();
            let loaded = tle_config::load_layered_yaml(&paths)?;
            let config: Config = serde_json::from_value(loaded.config_json)
                .context("config failed to deserialize into Config")?;
            config.validate()?;
            Ok((config, loaded.config_hash))
        }
        Err(_) => {
            let config = Config::sane_defaults();
            let hash = tle_config::load_layered_yaml_from_strings(&[]).map(|l| l.config_hash).unwrap_or_default();
            Ok((config, hash))
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("TLE_DAEMON_ADDR").ok()?.parse().ok()
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
