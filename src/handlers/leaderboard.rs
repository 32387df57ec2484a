//! Per-account-type leaderboard of top token holders.
//!
//! For every account type the tracker keeps a bounded, descending-sorted list
//! of the biggest known holders, plus an append-only history of "who holds
//! rank 0" changes that can be queried at any point in time.

use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{info, warn};

use crate::models::{
    AccountType, AccountTypeHistory, AccountTypeLeaders, AccountUpdate, LeaderEntry,
    LeaderboardStatus, LeadershipInterval, TopOwnerAtTime,
};
use crate::ranked::{rank_descending, search_insert};

/// Max number of leaders to report on, per account type
pub const LEADERBOARD_LIST_SIZE: usize = 3;

/// Extra entries retained internally beyond the published size, so that
/// churn around the min boundary does not immediately evict candidates
pub const LEADERBOARD_SIZE_BUFFER: usize = 2;

/// Retention bound of each account type's top-owner history
pub const TOP_OWNERS_HISTORY_MAX_SIZE: usize = 200;

const INTERNAL_LIST_SIZE: usize = LEADERBOARD_LIST_SIZE + LEADERBOARD_SIZE_BUFFER;

type ClockFn = dyn Fn() -> i64 + Send + Sync;

#[derive(Default)]
struct TrackerInner {
    /// Account ids and their token balances, grouped by account type.
    /// Descending by tokens, at most `INTERNAL_LIST_SIZE` entries.
    max_token_owners: HashMap<AccountType, Vec<LeaderEntry>>,
    /// Rank-0 changes over time, per account type. Ascending `from`.
    top_owner_over_time: HashMap<AccountType, Vec<LeadershipInterval>>,
}

pub struct LeaderboardTracker {
    inner: RwLock<TrackerInner>,
    /// Wall-clock source (epoch ms); injectable for deterministic tests
    clock: Box<ClockFn>,
}

impl Default for LeaderboardTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl LeaderboardTracker {
    pub fn new() -> Self {
        Self::with_clock(|| chrono::Utc::now().timestamp_millis())
    }

    pub fn with_clock(clock: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Self {
            inner: RwLock::new(TrackerInner::default()),
            clock: Box::new(clock),
        }
    }

    /// Process one accepted account update.
    ///
    /// Returns whether the update changed the leaderboard for its account
    /// type. The event is re-validated here so the tracker stays safe when
    /// exercised directly, independent of the ingestion index.
    pub fn process(&self, update: &AccountUpdate) -> anyhow::Result<bool> {
        let issues = update.validate();
        if !issues.is_empty() {
            warn!(
                "Ignoring {} v{} - not processing: {}",
                update.id,
                update.version,
                issues.join("; ")
            );
            return Ok(false);
        }

        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let leaders = inner
            .max_token_owners
            .entry(update.account_type)
            .or_default();

        let mut recorded = false;

        // Already ranked: refresh the balance in place
        if let Some(entry) = leaders.iter_mut().find(|entry| entry.id == update.id) {
            entry.tokens = update.tokens;
            recorded = true;
        } else if leaders.len() < INTERNAL_LIST_SIZE {
            // Free room left
            leaders.push(LeaderEntry {
                id: update.id.clone(),
                tokens: update.tokens,
            });
            recorded = true;
        } else if let Some(last_runner) = leaders.last() {
            // Full: only a balance above the current minimum makes the cut
            if update.tokens > last_runner.tokens {
                leaders.push(LeaderEntry {
                    id: update.id.clone(),
                    tokens: update.tokens,
                });
                recorded = true;
            }
        }

        if !recorded {
            return Ok(false);
        }

        rank_descending(leaders, |entry| entry.tokens, INTERNAL_LIST_SIZE);

        // Record a leadership change if rank 0 now belongs to someone else
        let top = leaders[0].clone();
        let history = inner
            .top_owner_over_time
            .entry(update.account_type)
            .or_default();

        let last_top_owner = history.last().map(|interval| interval.account_id.as_str());
        if last_top_owner != Some(top.id.as_str()) {
            let mut from = (self.clock)();
            // `from` values must stay strictly increasing for the binary search
            if let Some(last) = history.last() {
                if from <= last.from {
                    from = last.from + 1;
                }
            }
            info!(
                "New top {} owner: {} ({} tokens)",
                update.account_type, top.id, top.tokens
            );
            history.push(LeadershipInterval {
                account_id: top.id,
                from,
            });
            if history.len() > TOP_OWNERS_HISTORY_MAX_SIZE {
                history.remove(0);
            }
        }

        Ok(recorded)
    }

    /// Which account was the top token owner of `account_type` at `time_ms`?
    ///
    /// An unknown account type, or a time before the first recorded change,
    /// yields the absent result (`account_id: None`, sentinel `-1` times).
    pub fn retrieve_top_owner_at_time(
        &self,
        account_type: AccountType,
        time_ms: i64,
    ) -> TopOwnerAtTime {
        let inner = self.inner.read();

        if let Some(history) = inner.top_owner_over_time.get(&account_type) {
            let start_times: Vec<i64> = history.iter().map(|interval| interval.from).collect();
            let mut index = search_insert(&start_times, &time_ms);
            // An exact hit on a start time belongs to the interval opening at
            // that instant, not the one ending there
            if index < start_times.len() && start_times[index] == time_ms {
                index += 1;
            }
            if index > 0 {
                return TopOwnerAtTime {
                    account_id: Some(history[index - 1].account_id.clone()),
                    from: history[index - 1].from,
                    until: if index < start_times.len() {
                        history[index].from
                    } else {
                        -1
                    },
                };
            }
        }

        TopOwnerAtTime {
            account_id: None,
            from: -1,
            until: -1,
        }
    }

    /// Published leaderboard: the top-K holders per account type. The internal
    /// buffer entries beyond K are never exposed.
    pub fn report_leaderboard(&self) -> Vec<AccountTypeLeaders> {
        let inner = self.inner.read();
        let mut leaderboard: Vec<AccountTypeLeaders> = inner
            .max_token_owners
            .iter()
            .map(|(account_type, leaders)| AccountTypeLeaders {
                account_type: *account_type,
                accounts: leaders.iter().take(LEADERBOARD_LIST_SIZE).cloned().collect(),
            })
            .collect();
        leaderboard.sort_by_key(|entry| entry.account_type);
        leaderboard
    }

    /// Full snapshot: published leaderboard plus the per-type history
    pub fn report_status(&self) -> LeaderboardStatus {
        let leaderboard = self.report_leaderboard();

        let inner = self.inner.read();
        let mut history: Vec<AccountTypeHistory> = inner
            .top_owner_over_time
            .iter()
            .map(|(account_type, intervals)| AccountTypeHistory {
                account_type: *account_type,
                history: intervals.clone(),
            })
            .collect();
        history.sort_by_key(|entry| entry.account_type);

        LeaderboardStatus {
            leaderboard,
            history,
        }
    }

    /// Drop all tracked state. Idempotent.
    pub fn shutdown(&self) {
        let mut inner = self.inner.write();
        inner.max_token_owners.clear();
        inner.top_owner_over_time.clear();
    }
}

impl crate::ingest::UpdateObserver for LeaderboardTracker {
    fn name(&self) -> &'static str {
        "leaderboard-tracker"
    }

    fn process(&self, update: &AccountUpdate) -> anyhow::Result<bool> {
        LeaderboardTracker::process(self, update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn tracker_with_manual_clock() -> (LeaderboardTracker, Arc<AtomicI64>) {
        let now = Arc::new(AtomicI64::new(0));
        let clock_now = now.clone();
        let tracker = LeaderboardTracker::with_clock(move || clock_now.load(Ordering::SeqCst));
        (tracker, now)
    }

    fn update(id: &str, tokens: u64) -> AccountUpdate {
        AccountUpdate {
            schema_version: None,
            id: id.to_string(),
            account_type: AccountType::Account,
            tokens,
            callback_time_ms: 0,
            data: None,
            version: 1,
        }
    }

    #[test]
    fn test_rejects_invalid_update() {
        let (tracker, _) = tracker_with_manual_clock();
        assert!(!tracker.process(&update("", 10)).unwrap());
        assert!(tracker.report_leaderboard().is_empty());
    }

    #[test]
    fn test_known_account_updated_in_place() {
        let (tracker, _) = tracker_with_manual_clock();
        assert!(tracker.process(&update("alice", 100)).unwrap());
        assert!(tracker.process(&update("alice", 40)).unwrap());

        let board = tracker.report_leaderboard();
        assert_eq!(board[0].accounts.len(), 1);
        assert_eq!(board[0].accounts[0].tokens, 40);
    }

    #[test]
    fn test_internal_list_bounded_and_sorted_descending() {
        let (tracker, _) = tracker_with_manual_clock();
        for (i, tokens) in [50u64, 10, 80, 30, 70, 60, 20].iter().enumerate() {
            tracker.process(&update(&format!("acct{i}"), *tokens)).unwrap();
        }

        let status = tracker.report_status();
        // Published list is capped at K even though K+B entries are retained
        assert_eq!(status.leaderboard[0].accounts.len(), LEADERBOARD_LIST_SIZE);
        let tokens: Vec<u64> = status.leaderboard[0]
            .accounts
            .iter()
            .map(|entry| entry.tokens)
            .collect();
        assert_eq!(tokens, vec![80, 70, 60]);
    }

    #[test]
    fn test_candidate_below_minimum_not_recorded() {
        let (tracker, now) = tracker_with_manual_clock();
        for (i, tokens) in [90u64, 80, 70, 60, 50].iter().enumerate() {
            now.fetch_add(10, Ordering::SeqCst);
            tracker.process(&update(&format!("acct{i}"), *tokens)).unwrap();
        }
        let history_len_before = tracker.report_status().history[0].history.len();

        // List is at K+B capacity and 40 < the minimum (50)
        now.fetch_add(10, Ordering::SeqCst);
        assert!(!tracker.process(&update("loser", 40)).unwrap());

        let status = tracker.report_status();
        assert!(!status.leaderboard[0]
            .accounts
            .iter()
            .any(|entry| entry.id == "loser"));
        // A rejected candidate never touches the history either
        assert_eq!(status.history[0].history.len(), history_len_before);
    }

    #[test]
    fn test_candidate_above_minimum_evicts_smallest() {
        let (tracker, _) = tracker_with_manual_clock();
        for (i, tokens) in [90u64, 80, 70, 60, 50].iter().enumerate() {
            tracker.process(&update(&format!("acct{i}"), *tokens)).unwrap();
        }

        assert!(tracker.process(&update("challenger", 55)).unwrap());

        let board = tracker.report_leaderboard();
        assert_eq!(board[0].accounts.len(), LEADERBOARD_LIST_SIZE);
        assert_eq!(board[0].accounts[0].tokens, 90);

        // The challenger stayed in the internal buffer: an in-place bump can
        // promote it into the published top K
        assert!(tracker.process(&update("challenger", 85)).unwrap());
        assert_eq!(tracker.report_leaderboard()[0].accounts[1].id, "challenger");

        // acct4 (50 tokens) was evicted: coming back below the new minimum is
        // a plain rejected candidate now, not an in-place update
        assert!(!tracker.process(&update("acct4", 54)).unwrap());
    }

    #[test]
    fn test_equal_tokens_keep_insertion_order() {
        let (tracker, _) = tracker_with_manual_clock();
        tracker.process(&update("first", 10)).unwrap();
        tracker.process(&update("second", 10)).unwrap();
        tracker.process(&update("third", 10)).unwrap();

        let board = tracker.report_leaderboard();
        let ids: Vec<&str> = board[0]
            .accounts
            .iter()
            .map(|entry| entry.id.as_str())
            .collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_history_appends_only_on_leader_change() {
        let (tracker, now) = tracker_with_manual_clock();

        now.store(100, Ordering::SeqCst);
        tracker.process(&update("alice", 100)).unwrap();
        now.store(200, Ordering::SeqCst);
        tracker.process(&update("alice", 150)).unwrap(); // still leader: no new interval
        now.store(300, Ordering::SeqCst);
        tracker.process(&update("bob", 500)).unwrap();

        let history = &tracker.report_status().history[0].history;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].account_id, "alice");
        assert_eq!(history[0].from, 100);
        assert_eq!(history[1].account_id, "bob");
        assert_eq!(history[1].from, 300);
    }

    #[test]
    fn test_history_timestamps_strictly_increasing() {
        let (tracker, now) = tracker_with_manual_clock();
        now.store(100, Ordering::SeqCst);

        // Two leadership changes within the same clock millisecond
        tracker.process(&update("alice", 100)).unwrap();
        tracker.process(&update("bob", 200)).unwrap();

        let history = &tracker.report_status().history[0].history;
        assert!(history[1].from > history[0].from);
    }

    #[test]
    fn test_history_overflow_drops_oldest() {
        let (tracker, now) = tracker_with_manual_clock();

        // Alternate the leader on every update: each one is a change
        for i in 0..(TOP_OWNERS_HISTORY_MAX_SIZE as u64 + 1) {
            now.store((i as i64 + 1) * 10, Ordering::SeqCst);
            let id = if i % 2 == 0 { "alice" } else { "bob" };
            tracker.process(&update(id, 1000 + i)).unwrap();
        }

        let history = &tracker.report_status().history[0].history;
        assert_eq!(history.len(), TOP_OWNERS_HISTORY_MAX_SIZE);
        // The very first interval (from=10) was dropped, FIFO
        assert_eq!(history[0].from, 20);
    }

    #[test]
    fn test_point_query_cases() {
        let (tracker, now) = tracker_with_manual_clock();

        now.store(100, Ordering::SeqCst);
        tracker.process(&update("alice", 100)).unwrap();
        now.store(300, Ordering::SeqCst);
        tracker.process(&update("bob", 500)).unwrap();

        let before = tracker.retrieve_top_owner_at_time(AccountType::Account, 50);
        assert_eq!(before.account_id, None);
        assert_eq!((before.from, before.until), (-1, -1));

        let first = tracker.retrieve_top_owner_at_time(AccountType::Account, 150);
        assert_eq!(first.account_id.as_deref(), Some("alice"));
        assert_eq!((first.from, first.until), (100, 300));

        // Exactly on the first change: alice's interval opens here
        let opening = tracker.retrieve_top_owner_at_time(AccountType::Account, 100);
        assert_eq!(opening.account_id.as_deref(), Some("alice"));
        assert_eq!((opening.from, opening.until), (100, 300));

        let boundary = tracker.retrieve_top_owner_at_time(AccountType::Account, 300);
        assert_eq!(boundary.account_id.as_deref(), Some("bob"));
        assert_eq!((boundary.from, boundary.until), (300, -1));

        let after = tracker.retrieve_top_owner_at_time(AccountType::Account, 999);
        assert_eq!(after.account_id.as_deref(), Some("bob"));
        assert_eq!((after.from, after.until), (300, -1));
    }

    #[test]
    fn test_unknown_account_type_query_is_absent_not_error() {
        let (tracker, _) = tracker_with_manual_clock();
        let result = tracker.retrieve_top_owner_at_time(AccountType::Escrow, 12345);
        assert_eq!(result.account_id, None);
        assert_eq!((result.from, result.until), (-1, -1));
    }

    #[test]
    fn test_types_tracked_independently() {
        let (tracker, _) = tracker_with_manual_clock();
        tracker.process(&update("alice", 10)).unwrap();

        let mut escrow_upd = update("escrowking", 999);
        escrow_upd.account_type = AccountType::Escrow;
        tracker.process(&escrow_upd).unwrap();

        let board = tracker.report_leaderboard();
        assert_eq!(board.len(), 2);
        assert_eq!(board[0].account_type, AccountType::Account);
        assert_eq!(board[1].account_type, AccountType::Escrow);
    }

    #[test]
    fn test_shutdown_clears_all_state() {
        let (tracker, _) = tracker_with_manual_clock();
        tracker.process(&update("alice", 10)).unwrap();

        tracker.shutdown();
        tracker.shutdown(); // idempotent

        assert!(tracker.report_leaderboard().is_empty());
        assert!(tracker.report_status().history.is_empty());
    }
}
