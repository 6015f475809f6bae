//! tally-daemon entry point.
//!
//! Sets up tracing, loads config, builds the shared state, wires middleware
//! and starts the HTTP server. Handlers live in `routes.rs`.

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tally_config::{load_layered_yaml, report_unused_keys, TallyConfig, UnusedKeyPolicy};
use tally_daemon::{routes, state};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn, Level};

/// Comma-separated YAML paths in merge order.
const ENV_CONFIG_PATHS: &str = "TALLY_CONFIG";
const ENV_DAEMON_ADDR: &str = "TALLY_DAEMON_ADDR";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cfg = load_config()?;

    let shared = match std::env::var(tally_db::ENV_DB_URL) {
        Ok(_) => {
            let pool = tally_db::connect_from_env().await?;
            tally_db::migrate(&pool).await?;
            state::AppState::postgres(&cfg, pool).await?
        }
        Err(_) => {
            warn!("{} not set; attendance is kept in memory only", tally_db::ENV_DB_URL);
            state::AppState::in_memory(&cfg)?
        }
    };
    let shared = Arc::new(shared);

    let app = routes::build_router(Arc::clone(&shared)).layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    let addr = bind_addr(&cfg)?;
    info!(store = shared.mode.as_str(), "tally-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn load_config() -> anyhow::Result<TallyConfig> {
    let raw = std::env::var(ENV_CONFIG_PATHS).unwrap_or_default();
    let paths: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if paths.is_empty() {
        warn!("{ENV_CONFIG_PATHS} not set; using built-in defaults");
        return Ok(TallyConfig::default());
    }

    let loaded = load_layered_yaml(&paths)?;
    let report = report_unused_keys(&loaded.config_json, UnusedKeyPolicy::Warn)?;
    for leaf in &report.unused_leaf_pointers {
        warn!(leaf = %leaf, "unused config key");
    }
    let cfg = TallyConfig::from_loaded(&loaded)?;
    info!(config_hash = %loaded.config_hash, layers = paths.len(), "config loaded");
    Ok(cfg)
}

/// TALLY_DAEMON_ADDR wins over `daemon.bind_addr`.
fn bind_addr(cfg: &TallyConfig) -> anyhow::Result<SocketAddr> {
    let raw = std::env::var(ENV_DAEMON_ADDR).unwrap_or_else(|_| cfg.daemon.bind_addr.clone());
    raw.parse()
        .with_context(|| format!("invalid bind address '{raw}'"))
}
