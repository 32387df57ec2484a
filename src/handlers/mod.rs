pub mod debounce;
pub mod leaderboard;

pub use debounce::DebounceScheduler;
pub use leaderboard::LeaderboardTracker;
