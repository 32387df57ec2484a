//! Debounced per-account callbacks.
//!
//! Every accepted update (re)arms a single delayed callback for its account
//! id: a newer update arriving before the delay elapses cancels the pending
//! one and restarts the clock. Shutdown cancels everything; nothing fires
//! afterwards.
//!
//! Timers are plain `tokio::time::sleep` tasks, so the scheduler must live
//! inside a Tokio runtime. Cancel-then-reschedule is made atomic with respect
//! to firing through a per-entry generation: a superseded timer that already
//! woke re-checks its generation under the lock and exits without firing.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::models::{AccountUpdate, CallbackStatus};

struct PendingCallback {
    generation: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct SchedulerInner {
    /// `account.id` -> the single pending callback for that account
    pending: HashMap<String, PendingCallback>,
    next_generation: u64,
}

#[derive(Default)]
pub struct DebounceScheduler {
    inner: Arc<Mutex<SchedulerInner>>,
    fired: Arc<AtomicU64>,
}

impl DebounceScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one accepted account update: cancel any pending callback for
    /// the account, then arm a fresh one firing after `callback_time_ms`.
    pub fn process(&self, update: &AccountUpdate) -> anyhow::Result<bool> {
        let issues = update.validate();
        if !issues.is_empty() {
            warn!(
                "Ignoring {} v{} - no callback scheduled: {}",
                update.id,
                update.version,
                issues.join("; ")
            );
            return Ok(false);
        }

        let mut inner = self.inner.lock();

        if let Some(previous) = inner.pending.remove(&update.id) {
            previous.handle.abort();
            info!("Callback CANCELLED for {} (replaced)", update.id);
        }

        let generation = inner.next_generation;
        inner.next_generation += 1;

        let account_id = update.id.clone();
        let version = update.version;
        let delay = Duration::from_millis(update.callback_time_ms);
        let task_inner = Arc::clone(&self.inner);
        let fired = Arc::clone(&self.fired);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut inner = task_inner.lock();
            // Fire only if this timer is still the current one for the account
            let current = inner
                .pending
                .get(&account_id)
                .is_some_and(|pending| pending.generation == generation);
            if current {
                inner.pending.remove(&account_id);
                fired.fetch_add(1, Ordering::SeqCst);
                info!("Callback TRIGGERED for {} v{}", account_id, version);
            }
        });

        inner.pending.insert(
            update.id.clone(),
            PendingCallback { generation, handle },
        );

        Ok(true)
    }

    /// Pending-callback count, their account ids, and the fired total
    pub fn report_status(&self) -> CallbackStatus {
        let inner = self.inner.lock();
        let mut accounts: Vec<String> = inner.pending.keys().cloned().collect();
        accounts.sort();
        CallbackStatus {
            callbacks: inner.pending.len(),
            accounts,
            fired: self.fired.load(Ordering::SeqCst),
        }
    }

    /// Cancel every pending callback without firing any, then clear the map.
    /// Idempotent.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        let cancelled = inner.pending.len();
        for (_, pending) in inner.pending.drain() {
            pending.handle.abort();
        }
        if cancelled > 0 {
            info!("Cancelled {} pending callbacks on shutdown", cancelled);
        }
    }
}

impl crate::ingest::UpdateObserver for DebounceScheduler {
    fn name(&self) -> &'static str {
        "debounce-scheduler"
    }

    fn process(&self, update: &AccountUpdate) -> anyhow::Result<bool> {
        DebounceScheduler::process(self, update)
    }
}
