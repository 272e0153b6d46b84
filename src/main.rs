//! trend-bridge binary entrypoint.
//! Loads config, builds the source adapters and pipeline, starts the refresh
//! ticker and serves the status API plus `/metrics`.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use trend_bridge::metrics::Metrics;
use trend_bridge::scheduler::spawn_refresh_ticker;
use trend_bridge::sources::build_adapters;
use trend_bridge::{create_router, MemoryStore, Pipeline, TrendStore, TrendsConfig};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";

/// `LOG_FORMAT=json` switches to JSON lines; default is compact text.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("trends=info,warn"));
    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().compact()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = TrendsConfig::load_default().context("loading trends config")?;
    let metrics = Metrics::init().context("installing prometheus recorder")?;

    let client = reqwest::Client::builder()
        .build()
        .context("building http client")?;
    let adapters = build_adapters(&cfg, client)?;
    tracing::info!(target: "trends", sources = adapters.len(), "adapters ready");

    let store: Arc<dyn TrendStore> = Arc::new(MemoryStore::new(cfg.quota.max_reads_per_day));
    let pipeline = Arc::new(Pipeline::new(adapters, store, &cfg));

    let shutdown = CancellationToken::new();
    let ticker = spawn_refresh_ticker(
        Arc::clone(&pipeline),
        cfg.refresh_interval(),
        shutdown.clone(),
    );

    let app = create_router(pipeline).merge(metrics.router());

    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string())
        .parse()
        .context("parsing BIND_ADDR")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(target: "trends", %addr, "listening");

    let stop = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            stop.cancel();
        })
        .await
        .context("http server")?;

    shutdown.cancel();
    let _ = ticker.await;
    Ok(())
}
