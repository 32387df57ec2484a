//! Mock real-time account-update stream.
//!
//! Loads a logged event set from a JSON file (local path or HTTP URL) and
//! replays it sequentially with a random delay between events, emulating a
//! live on-chain data feed. Consumers subscribe to two broadcast channels:
//! one carrying the update events themselves, one carrying feed lifecycle
//! status (started / stopped / exhausted).
//!
//! Events that fail field validation are still cast — the ingestion index
//! re-validates and drops them, which keeps the rejection path exercised the
//! same way a real feed would.

use anyhow::{Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::{AccountUpdate, FeedStatusEvent};

/// Maximum duration between the cast of 2 successive events
pub const EVENT_CASTING_MAX_INTERVAL_MS: u64 = 1000;

/// Source tag carried by feed status events
pub const FEED_SOURCE_NAME: &str = "MockEventFeed";

struct CastingSession {
    handle: JoinHandle<()>,
    queue: Arc<Mutex<VecDeque<AccountUpdate>>>,
    active: Arc<AtomicBool>,
}

pub struct MockEventFeed {
    /// URL or local path of the event-log JSON
    source: String,
    max_interval_ms: u64,
    update_tx: broadcast::Sender<AccountUpdate>,
    status_tx: broadcast::Sender<FeedStatusEvent>,
    session: Mutex<Option<CastingSession>>,
}

impl MockEventFeed {
    pub fn new(source: impl Into<String>, max_interval_ms: u64) -> Self {
        let (update_tx, _) = broadcast::channel(1000);
        let (status_tx, _) = broadcast::channel(16);
        Self {
            source: source.into(),
            max_interval_ms: max_interval_ms.max(1),
            update_tx,
            status_tx,
            session: Mutex::new(None),
        }
    }

    /// Subscribe to the account-update stream
    pub fn subscribe_updates(&self) -> broadcast::Receiver<AccountUpdate> {
        self.update_tx.subscribe()
    }

    /// Subscribe to feed lifecycle events
    pub fn subscribe_status(&self) -> broadcast::Receiver<FeedStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Fetch and decode the configured event log.
    ///
    /// Entries that cannot be decoded into a typed [`AccountUpdate`] (e.g.
    /// unsupported account type) are logged and skipped; the rest are
    /// returned in file order.
    pub async fn load_events(&self) -> Result<Vec<AccountUpdate>> {
        let raw = if self.source.starts_with("http://") || self.source.starts_with("https://") {
            reqwest::get(&self.source)
                .await
                .with_context(|| format!("failed to fetch event log from '{}'", self.source))?
                .error_for_status()
                .with_context(|| format!("event log fetch rejected for '{}'", self.source))?
                .text()
                .await
                .context("failed to read event log response body")?
        } else {
            tokio::fs::read_to_string(&self.source)
                .await
                .with_context(|| format!("failed to read event log file '{}'", self.source))?
        };

        let entries: Vec<serde_json::Value> =
            serde_json::from_str(&raw).context("event log is not a JSON array")?;

        let total = entries.len();
        let mut events = Vec::with_capacity(total);
        for (i, entry) in entries.into_iter().enumerate() {
            match serde_json::from_value::<AccountUpdate>(entry) {
                Ok(event) => events.push(event),
                Err(err) => warn!("Skipping undecodable event log entry #{}: {}", i, err),
            }
        }
        info!(
            "Loaded {} account update events from '{}' ({} skipped)",
            events.len(),
            self.source,
            total - events.len()
        );
        Ok(events)
    }

    /// Load the event set and start casting it. Any session already running
    /// is stopped first, so a recast always starts from a full queue.
    pub async fn start_casting(&self) -> Result<usize> {
        let events = self.load_events().await?;
        let count = events.len();

        self.stop_casting();

        let queue = Arc::new(Mutex::new(VecDeque::from(events)));
        let active = Arc::new(AtomicBool::new(true));

        self.emit_status(true, count);
        info!("Starting to cast {} account update events", count);

        let task_queue = Arc::clone(&queue);
        let task_active = Arc::clone(&active);
        let update_tx = self.update_tx.clone();
        let status_tx = self.status_tx.clone();
        let max_interval_ms = self.max_interval_ms;

        let handle = tokio::spawn(async move {
            loop {
                if task_queue.lock().is_empty() {
                    task_active.store(false, Ordering::SeqCst);
                    warn!("Casting of account update events is OVER - no more left");
                    let _ = status_tx.send(FeedStatusEvent {
                        source: FEED_SOURCE_NAME,
                        active: false,
                        leftover: 0,
                        at: Utc::now(),
                    });
                    break;
                }

                let delay_ms = rand::thread_rng().gen_range(1..=max_interval_ms);
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;

                let event = task_queue.lock().pop_front();
                if let Some(event) = event {
                    debug!("Casting update {} v{}", event.id, event.version);
                    if update_tx.send(event).is_err() {
                        warn!("No listeners found for account update events");
                    }
                }
            }
        });

        *self.session.lock() = Some(CastingSession {
            handle,
            queue,
            active,
        });

        Ok(count)
    }

    /// Stop casting: cancel the in-flight delay and prevent any further
    /// emissions. Reports the leftover queue size through the status channel.
    /// Idempotent; a no-op when the stream already ran dry.
    pub fn stop_casting(&self) {
        let Some(session) = self.session.lock().take() else {
            return;
        };

        // swap: an exhausted session already reported itself inactive
        if session.active.swap(false, Ordering::SeqCst) {
            session.handle.abort();
            let leftover = session.queue.lock().len();
            warn!("Stopped casting with {} events left over", leftover);
            self.emit_status(false, leftover);
        }
    }

    /// Is a casting session currently emitting events?
    pub fn is_casting(&self) -> bool {
        self.session
            .lock()
            .as_ref()
            .is_some_and(|session| session.active.load(Ordering::SeqCst))
    }

    /// Stop casting and drop the session. Idempotent.
    pub fn shutdown(&self) {
        self.stop_casting();
    }

    fn emit_status(&self, active: bool, leftover: usize) {
        let _ = self.status_tx.send(FeedStatusEvent {
            source: FEED_SOURCE_NAME,
            active,
            leftover,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tokio::time::timeout;

    fn write_fixture(entries: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("create fixture file");
        file.write_all(entries.as_bytes()).expect("write fixture");
        file
    }

    const TWO_GOOD_ONE_BAD: &str = r#"[
        {"id": "acct1", "accountType": "account", "tokens": 100, "callbackTimeMs": 10, "version": 1},
        {"id": "acct2", "accountType": "escrow", "tokens": 200, "callbackTimeMs": 10, "version": 1},
        {"id": "acct3", "accountType": "warlock", "tokens": 300, "callbackTimeMs": 10, "version": 1}
    ]"#;

    #[tokio::test]
    async fn test_load_skips_undecodable_entries() {
        let fixture = write_fixture(TWO_GOOD_ONE_BAD);
        let feed = MockEventFeed::new(fixture.path().to_string_lossy(), 5);

        let events = feed.load_events().await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].id, "acct1");
        assert_eq!(events[1].id, "acct2");
    }

    #[tokio::test]
    async fn test_load_fails_on_missing_file() {
        let feed = MockEventFeed::new("/definitely/not/here.json", 5);
        assert!(feed.load_events().await.is_err());
    }

    #[tokio::test]
    async fn test_casts_all_events_then_reports_exhaustion() {
        let fixture = write_fixture(TWO_GOOD_ONE_BAD);
        let feed = MockEventFeed::new(fixture.path().to_string_lossy(), 5);

        let mut updates = feed.subscribe_updates();
        let mut status = feed.subscribe_status();

        let count = feed.start_casting().await.unwrap();
        assert_eq!(count, 2);

        let started = timeout(Duration::from_secs(1), status.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(started.active);
        assert_eq!(started.leftover, 2);

        // Events arrive in file order
        let first = timeout(Duration::from_secs(1), updates.recv())
            .await
            .unwrap()
            .unwrap();
        let second = timeout(Duration::from_secs(1), updates.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.id, "acct1");
        assert_eq!(second.id, "acct2");

        let exhausted = timeout(Duration::from_secs(1), status.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!exhausted.active);
        assert_eq!(exhausted.leftover, 0);
        assert!(!feed.is_casting());
    }

    #[tokio::test]
    async fn test_stop_reports_leftover_and_halts_emissions() {
        let fixture = write_fixture(TWO_GOOD_ONE_BAD);
        // Long delays: the stop lands before the first event is cast
        let feed = MockEventFeed::new(fixture.path().to_string_lossy(), 60_000);

        let mut updates = feed.subscribe_updates();
        let mut status = feed.subscribe_status();

        feed.start_casting().await.unwrap();
        let _ = status.recv().await.unwrap(); // started

        feed.stop_casting();
        feed.stop_casting(); // idempotent

        let stopped = timeout(Duration::from_secs(1), status.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!stopped.active);
        assert_eq!(stopped.leftover, 2);

        // No update ever comes through
        assert!(timeout(Duration::from_millis(100), updates.recv())
            .await
            .is_err());
    }
}
