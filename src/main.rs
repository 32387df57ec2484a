//! AccountFlow - on-chain account update ingestor
//!
//! Wires the mock event feed into the versioned update index, fans accepted
//! updates out to the leaderboard tracker and the debounce scheduler, and
//! serves the status/query REST API. Shutdown is graceful: the feed stops
//! first, pending callbacks get a bounded drain window, then every component
//! is torn down.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use accountflow_backend::{
    api::{create_router, AppState},
    feed::MockEventFeed,
    handlers::{DebounceScheduler, LeaderboardTracker},
    ingest::UpdateIndex,
    models::Config,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env()?;
    info!("🚀 Starting AccountFlow backend");
    debug!("Config: {:?}", config);

    let index = Arc::new(UpdateIndex::new());
    let leaderboard = Arc::new(LeaderboardTracker::new());
    let callbacks = Arc::new(DebounceScheduler::new());
    let feed = Arc::new(MockEventFeed::new(
        config.feed_source.clone(),
        config.feed_max_interval_ms,
    ));

    // Handler registration order is the fan-out order
    index.register_observer(leaderboard.clone());
    index.register_observer(callbacks.clone());

    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<&'static str>(1);

    spawn_update_dispatch(feed.clone(), index.clone());
    spawn_feed_status_watch(feed.clone(), shutdown_tx.clone(), config.exit_on_stream_end);

    match feed.start_casting().await {
        Ok(count) => info!("📡 Casting {} mock account update events", count),
        Err(err) => warn!("Mock feed unavailable, waiting for recast: {:#}", err),
    }

    let state = AppState {
        index: index.clone(),
        leaderboard: leaderboard.clone(),
        callbacks: callbacks.clone(),
        feed: feed.clone(),
    };
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("🌐 REST API listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("Shutdown signal received (ctrl-c)"),
                reason = shutdown_rx.recv() => {
                    info!("Shutdown requested: {}", reason.unwrap_or("channel closed"));
                }
            }
        })
        .await
        .context("REST server failed")?;

    graceful_shutdown(&config, &feed, &index, &leaderboard, &callbacks).await;
    Ok(())
}

/// Initialize tracing with env-filter overrides
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "accountflow_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Forward every cast update into the ingestion index
fn spawn_update_dispatch(feed: Arc<MockEventFeed>, index: Arc<UpdateIndex>) {
    let mut updates = feed.subscribe_updates();
    tokio::spawn(async move {
        loop {
            match updates.recv().await {
                Ok(event) => index.ingest(event),
                Err(RecvError::Lagged(missed)) => {
                    warn!("Update dispatch lagged, {} events dropped", missed);
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Watch feed lifecycle events; optionally shut the app down once the mock
/// stream is exhausted (demo mode)
fn spawn_feed_status_watch(
    feed: Arc<MockEventFeed>,
    shutdown_tx: mpsc::Sender<&'static str>,
    exit_on_stream_end: bool,
) {
    let mut status = feed.subscribe_status();
    tokio::spawn(async move {
        loop {
            match status.recv().await {
                Ok(event) => {
                    info!(
                        "Feed status: source={} active={} leftover={}",
                        event.source, event.active, event.leftover
                    );
                    if !event.active && event.leftover == 0 && exit_on_stream_end {
                        let _ = shutdown_tx.send("mock stream exhausted").await;
                    }
                }
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    });
}

/// Stop the feed, drain pending callbacks within the configured budget,
/// report the final top holders and tear all components down.
async fn graceful_shutdown(
    config: &Config,
    feed: &MockEventFeed,
    index: &UpdateIndex,
    leaderboard: &LeaderboardTracker,
    callbacks: &DebounceScheduler,
) {
    warn!("Graceful shutdown in progress");
    feed.stop_casting();

    drain_pending_callbacks(callbacks, config.shutdown_drain_ms).await;

    // Exit report: biggest holder per account type
    let board = leaderboard.report_leaderboard();
    if !board.is_empty() {
        let mut report = String::new();
        for entry in &board {
            if let Some(top) = entry.accounts.first() {
                report.push_str(&format!(
                    "\t{}\t{} \t{} tokens\n",
                    entry.account_type, top.id, top.tokens
                ));
            }
        }
        info!("Max tokens holder, per account type:\n{}", report);
    }

    feed.shutdown();
    index.shutdown();
    callbacks.shutdown();
    leaderboard.shutdown();
    info!("All components shut down");
}

/// Poll the scheduler until every pending callback has fired, or until the
/// drain budget runs out (shutdown proceeds regardless afterwards)
async fn drain_pending_callbacks(callbacks: &DebounceScheduler, budget_ms: u64) {
    let start = Instant::now();
    loop {
        let status = callbacks.report_status();
        if status.callbacks == 0 {
            return;
        }
        if start.elapsed() >= Duration::from_millis(budget_ms) {
            error!(
                "Drain budget ({}ms) exhausted with {} callbacks still pending",
                budget_ms, status.callbacks
            );
            return;
        }
        debug!(
            "Waiting on {} pending callbacks, {:?} of drain budget left",
            status.callbacks,
            Duration::from_millis(budget_ms).saturating_sub(start.elapsed())
        );
        sleep(Duration::from_millis(500)).await;
    }
}
