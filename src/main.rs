//! Realty Monitor — Binary Entrypoint
//! Boots the Axum HTTP server, wiring config, the dedup store, the task
//! registry, and the metrics exporter.

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use realty_monitor::api::{create_router, AppState};
use realty_monitor::config::AppConfig;
use realty_monitor::dedup::DedupStore;
use realty_monitor::fetch::{HttpExtractorClient, SessionContext, StaticSessionProvider};
use realty_monitor::metrics::Metrics;
use realty_monitor::notify::FanOut;
use realty_monitor::results::ResultLog;
use realty_monitor::task::{TaskDeps, TaskRegistry};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("realty_monitor=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in local/dev; no-op when the file is absent.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = AppConfig::load_default().context("loading configuration")?;

    if let Some(dir) = std::path::Path::new(&cfg.store.path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).context("creating store directory")?;
        }
    }
    let dedup = DedupStore::open(&cfg.store.path)
        .await
        .with_context(|| format!("opening dedup store at {}", cfg.store.path))?;

    let fetcher = HttpExtractorClient::new(cfg.extractor.base_url.clone())
        .with_timeout(cfg.extractor.timeout_secs);
    let sessions = StaticSessionProvider::new(SessionContext {
        cookies: cfg.session.cookies.clone(),
        user_agent: cfg.session.user_agent.clone(),
        proxy: cfg.session.proxy.clone(),
    });
    let sink = FanOut::new(cfg.notify.timeout_secs, cfg.notify.max_retries);
    let results = cfg.results.dir.clone().map(ResultLog::new);

    let deps = Arc::new(TaskDeps {
        fetcher: Arc::new(fetcher),
        sessions: Arc::new(sessions),
        dedup: dedup.clone(),
        sink: Arc::new(sink),
        results,
    });
    let registry = Arc::new(TaskRegistry::new(deps, cfg.task_tuning()));

    let metrics = Metrics::init();
    let state = AppState::new(registry.clone());
    let router = create_router(state).merge(metrics.router());

    let listener = TcpListener::bind(&cfg.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", cfg.server.bind_addr))?;
    info!(addr = %cfg.server.bind_addr, "realty-monitor listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("shutdown signal received, stopping live tasks");
    registry.shutdown().await;
    dedup.close().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
