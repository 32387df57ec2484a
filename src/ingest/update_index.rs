//! Account-update ingestion: versioned last-write-wins index + observer fan-out.
//!
//! Only the latest update per account id is indexed, decided by the on-chain
//! `version` number (strictly higher wins, equal or lower is stale). Accepted
//! updates are handed to every registered observer in registration order; an
//! observer failure is isolated so the remaining observers still run.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::models::{AccountUpdate, IndexedAccount};

/// Capability implemented by components that react to accepted updates.
///
/// Observers own state disjoint from the index; `process` reports whether the
/// update actually changed the observer's state.
pub trait UpdateObserver: Send + Sync {
    /// Short component name, used in fan-out logs
    fn name(&self) -> &'static str;

    fn process(&self, update: &AccountUpdate) -> anyhow::Result<bool>;
}

#[derive(Default)]
struct IndexInner {
    /// `account.id` -> most up-to-date accepted update
    accounts: HashMap<String, AccountUpdate>,
    observers: Vec<Arc<dyn UpdateObserver>>,
}

/// Authoritative last-known-state index over the account-update stream
#[derive(Default)]
pub struct UpdateIndex {
    inner: RwLock<IndexInner>,
}

impl UpdateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one update event.
    ///
    /// Invalid events are logged and dropped without touching the index.
    /// Stale versions (<= the stored one) are dropped silently. Acceptance is
    /// decided and applied under the write lock, so two racing updates for
    /// the same id can never both be accepted out of version order, and the
    /// observer fan-out stays serialized in arrival order.
    pub fn ingest(&self, update: AccountUpdate) {
        let issues = update.validate();
        if !issues.is_empty() {
            warn!(
                "Ignoring AccountUpdate {} v{} - not indexing: {}",
                update.id,
                update.version,
                issues.join("; ")
            );
            return;
        }

        let mut inner = self.inner.write();

        if let Some(indexed) = inner.accounts.get(&update.id) {
            if update.version <= indexed.version {
                debug!(
                    "Superseded AccountUpdate {} v{} (indexed v{})",
                    update.id, update.version, indexed.version
                );
                return;
            }
        }

        info!("Indexing update v{} for {}", update.version, update.id);
        inner.accounts.insert(update.id.clone(), update.clone());

        for observer in &inner.observers {
            match observer.process(&update) {
                Ok(applied) => {
                    debug!(
                        "Observer {} processed {} v{}: applied={}",
                        observer.name(),
                        update.id,
                        update.version,
                        applied
                    );
                }
                Err(err) => {
                    error!(
                        "Observer {} failed on {} v{}: {:#}",
                        observer.name(),
                        update.id,
                        update.version,
                        err
                    );
                }
            }
        }
    }

    /// Register an observer; it will be notified of every subsequently
    /// accepted update, in registration order.
    pub fn register_observer(&self, observer: Arc<dyn UpdateObserver>) {
        self.inner.write().observers.push(observer);
    }

    /// Snapshot all indexed states and clear the index, e.g. to reset
    /// between two casting sessions.
    pub fn flush(&self) -> Vec<IndexedAccount> {
        let mut inner = self.inner.write();
        let flushed: Vec<IndexedAccount> = inner
            .accounts
            .drain()
            .map(|(account_id, last_update)| IndexedAccount {
                account_id,
                last_update,
            })
            .collect();
        info!("Flushed {} indexed account updates", flushed.len());
        flushed
    }

    /// Read-only snapshot of the indexed accounts
    pub fn report_status(&self) -> Vec<IndexedAccount> {
        self.inner
            .read()
            .accounts
            .iter()
            .map(|(account_id, last_update)| IndexedAccount {
                account_id: account_id.clone(),
                last_update: last_update.clone(),
            })
            .collect()
    }

    pub fn indexed_count(&self) -> usize {
        self.inner.read().accounts.len()
    }

    /// Drop all observers and indexed state. Idempotent.
    pub fn shutdown(&self) {
        let mut inner = self.inner.write();
        inner.observers.clear();
        inner.accounts.clear();
    }
}
