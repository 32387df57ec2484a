pub mod mock_feed;

pub use mock_feed::{MockEventFeed, EVENT_CASTING_MAX_INTERVAL_MS};
