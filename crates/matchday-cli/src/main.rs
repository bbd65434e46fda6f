//! Matchday - keeps one season's league data fresh from the terminal.
//!
//! Usage: `matchday [SEASON]` (defaults to `MATCHDAY_SEASON`, then "current").
//! The push token is read from `MATCHDAY_TOKEN`; without it only REST
//! polling runs.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use matchday_core::cache::NewsResource;
use matchday_core::{
    ApiClient, CacheStore, Config, FetchOptions, FetchOutcome, ResourceKind, Session, WsConnector,
};

/// How often the loop re-checks TTLs.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Initialize the tracing subscriber for logging.
///
/// Use RUST_LOG to control the level (e.g. RUST_LOG=matchday_core=debug).
/// When MATCHDAY_LOG_DIR is set, logs are also written to a daily file there.
fn init_tracing() -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var("MATCHDAY_LOG_DIR") {
        Ok(dir) if !dir.is_empty() => {
            let appender = tracing_appender::rolling::daily(dir, "matchday.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        }
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

fn season_arg() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("MATCHDAY_SEASON").ok())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "current".to_string())
}

async fn refresh_all(store: &CacheStore, season: &str) {
    let targets = [
        (ResourceKind::News, NewsResource::DEFAULT_FEED),
        (ResourceKind::Standings, season),
        (ResourceKind::Fixtures, season),
        (ResourceKind::Results, season),
    ];
    for (kind, key) in targets {
        match store.ensure_fresh(kind, key, FetchOptions::default()).await {
            Ok(FetchOutcome::Hit) => {}
            Ok(outcome) => debug!(%kind, key, ?outcome, "Refreshed"),
            // Cached data stays usable; the next pass retries.
            Err(e) => warn!(error = %e, "Refresh failed"),
        }
    }
}

fn print_summary(store: &CacheStore, season: &str) {
    if let Some(table) = store.standings().get_cached(season).and_then(|e| e.data) {
        if let Some(leader) = table.leader() {
            println!(
                "{} leads season {} on {} points",
                leader.team_name, season, leader.points
            );
        }
    }
    let snapshot = store.session().snapshot();
    println!(
        "push: {:?} ({} topics), updated {}",
        snapshot.state,
        snapshot.topics.len(),
        store.ages(season).last_updated()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _guard = init_tracing();
    info!("Matchday starting");

    let mut config = Config::load().context("Failed to load config")?;
    config.apply_env_overrides();

    let connector = WsConnector::from_config(&config.transport);
    let session = Session::new(&config.transport, Arc::new(connector))?;
    let api = ApiClient::new(&config.api)?;

    let token = std::env::var("MATCHDAY_TOKEN").ok().filter(|t| !t.is_empty());
    api.set_token(token.as_deref());
    session.set_token(token.as_deref());
    if token.is_none() {
        info!("No MATCHDAY_TOKEN set, running without live updates");
    }

    let store = CacheStore::new(&config, Arc::new(api), session.clone());
    let season = season_arg();
    store.watch(ResourceKind::News, NewsResource::DEFAULT_FEED);
    for kind in [ResourceKind::Standings, ResourceKind::Fixtures, ResourceKind::Results] {
        store.watch(kind, &season);
    }

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                refresh_all(&store, &season).await;
                print_summary(&store, &season);
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    session.disconnect();
    Ok(())
}
