//! menu-server: dining hall menu aggregator.
//!
//! Single-binary Tokio application that:
//! 1. Serves the cached menu snapshot over HTTP
//! 2. Relaunches a background crawl of the nutrition site when the snapshot goes stale
//! 3. Persists every completed crawl so restarts serve data immediately

mod config;
mod http;

use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};

use common::ServiceConfig;
use menu_cache::{CacheStore, CrawlOrchestrator, StalenessGate};
use nutrition_client::{HallFetcher, NutritionClient};

/// Dining hall menu server
#[derive(Parser)]
#[command(name = "menu-server", about = "Dining hall menu aggregator")]
struct Cli {
    /// Path to a TOML config file (default: ./config.toml if present).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run one full crawl, persist it and exit.
    #[arg(long)]
    crawl_once: bool,

    /// Override the HTTP listen address.
    #[arg(long)]
    bind: Option<String>,
}

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

fn build_gate(cfg: &ServiceConfig, store: CacheStore) -> Result<StalenessGate, common::Error> {
    let client = NutritionClient::new(&cfg.upstream, &cfg.archive)?;
    let fetcher: Arc<dyn HallFetcher> = Arc::new(client);
    let orchestrator = CrawlOrchestrator::new(fetcher, cfg.halls.clone(), &cfg.crawl)?;
    Ok(StalenessGate::new(
        Arc::new(store),
        Arc::new(orchestrator),
        cfg.cache.max_age(),
    ))
}

#[tokio::main]
async fn main() {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "menu_server=info,nutrition_client=info,menu_cache=info".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("Menu server starting up...");

    // Load configuration.
    let mut cfg = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    if let Some(bind) = cli.bind {
        cfg.http.bind = bind;
    }

    info!(
        "Halls: {:?}",
        cfg.halls.iter().map(|h| &h.name).collect::<Vec<_>>()
    );
    info!(
        "Crawl: {} days in {}, concurrency={}, max_age={}s",
        cfg.crawl.lookahead_days, cfg.crawl.timezone, cfg.crawl.concurrency, cfg.cache.max_age_secs
    );
    if let Some(dir) = &cfg.archive.dir {
        info!(
            "Raw archive: {} (replay={})",
            dir.display(),
            cfg.archive.replay
        );
    }

    let store = CacheStore::open(&cfg.cache.path).await;
    let gate = match build_gate(&cfg, store) {
        Ok(g) => g,
        Err(e) => {
            error!("Initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    // ── Crawl-once mode ──────────────────────────────────────────────
    if cli.crawl_once {
        info!("Running single crawl...");
        match gate.force_refresh(true).await {
            Ok(menu_cache::RefreshDecision::Completed(summary)) => {
                for date in &summary.dates {
                    println!("Crawled {}", date);
                }
                info!(
                    "Crawl complete: fetched={} closed={} failed={}",
                    summary.fetched, summary.closed, summary.failed
                );
            }
            Ok(other) => warn!("Unexpected crawl outcome: {:?}", other),
            Err(e) => {
                error!("Crawl failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    // ── Spawn tasks ──────────────────────────────────────────────────
    info!("Spawning tasks...");

    // Warm the cache if it is missing or old.
    let decision = gate.maybe_refresh();
    info!("Startup refresh check: {:?}", decision);

    let listener = match tokio::net::TcpListener::bind(&cfg.http.bind).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind {}: {}", cfg.http.bind, e);
            std::process::exit(1);
        }
    };
    info!("Listening on {}", cfg.http.bind);

    let app = http::router(http::AppState {
        gate: gate.clone(),
        halls: Arc::new(cfg.halls.clone()),
    });
    let server_handle = tokio::spawn(async move { axum::serve(listener, app).await });

    let hb_gate = gate.clone();
    let heartbeat_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let snapshot = hb_gate.store().read();
            let age = snapshot
                .age_secs(Utc::now())
                .map(|a| format!("{}s", a))
                .unwrap_or_else(|| "never".into());
            info!(
                "HEARTBEAT: state={} age={} days={}",
                hb_gate.state(),
                age,
                snapshot.dates.len()
            );
        }
    });

    // ── Wait for shutdown ────────────────────────────────────────────
    info!("Menu server is running. Press Ctrl+C to stop.");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
        r = server_handle => {
            error!("HTTP server exited: {:?}", r);
        }
        r = heartbeat_handle => {
            error!("Heartbeat task exited: {:?}", r);
        }
    }

    if gate.is_refreshing() {
        info!("Waiting up to {}s for in-flight crawl...", SHUTDOWN_GRACE.as_secs());
        if tokio::time::timeout(SHUTDOWN_GRACE, gate.wait_idle()).await.is_err() {
            warn!("In-flight crawl did not finish; exiting with the previous snapshot on disk");
        }
    }

    info!("Menu server stopped.");
}
