use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported on-chain account types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccountType {
    Account,
    Metadata,
    Mint,
    Auction,
    AuctionData,
    MasterEdition,
    Escrow,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Account => "account",
            AccountType::Metadata => "metadata",
            AccountType::Mint => "mint",
            AccountType::Auction => "auction",
            AccountType::AuctionData => "auctionData",
            AccountType::MasterEdition => "masterEdition",
            AccountType::Escrow => "escrow",
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account" => Ok(AccountType::Account),
            "metadata" => Ok(AccountType::Metadata),
            "mint" => Ok(AccountType::Mint),
            "auction" => Ok(AccountType::Auction),
            "auctionData" => Ok(AccountType::AuctionData),
            "masterEdition" => Ok(AccountType::MasterEdition),
            "escrow" => Ok(AccountType::Escrow),
            other => Err(format!("unknown account type '{other}'")),
        }
    }
}

/// Optional payload attached to an account update
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub img: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mint_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_bid: Option<f64>,
}

/// One logged account-state update event.
///
/// Field names follow the JSON event-log schema (camelCase). `version` orders
/// updates for a given account id: higher wins, equal is stale.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdate {
    /// Data model version of the log entry itself
    #[serde(rename = "_version", default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<u64>,
    /// Unique identifier of the account
    pub id: String,
    pub account_type: AccountType,
    /// Amount of tokens held by the account
    pub tokens: u64,
    /// Quiescence delay before the update callback fires
    pub callback_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<AccountData>,
    /// Version of the account on chain
    pub version: u64,
}

impl AccountUpdate {
    /// Structural/field validation. Returns the list of issues found; an empty
    /// list means the event is valid.
    ///
    /// Unknown account types never reach this point: they are rejected when
    /// the raw JSON is deserialized into the typed event.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if self.id.is_empty() {
            issues.push("id must not be empty".to_string());
        } else {
            if !self.id.chars().all(|c| c.is_ascii_alphanumeric()) {
                issues.push(format!("id '{}' must be alphanumeric", self.id));
            }
            if self.id.len() > 50 {
                issues.push(format!("id length {} exceeds 50", self.id.len()));
            }
        }

        if let Some(data) = &self.data {
            if let Some(img) = &data.img {
                if img.len() < 6 || img.len() > 256 {
                    issues.push(format!("data.img length {} outside 6..=256", img.len()));
                }
            }
            if let Some(mint_id) = &data.mint_id {
                if mint_id.is_empty() || mint_id.len() > 256 {
                    issues.push(format!(
                        "data.mintId length {} outside 1..=256",
                        mint_id.len()
                    ));
                }
            }
            if let Some(expiry) = data.expiry {
                if expiry < -1 {
                    issues.push(format!("data.expiry {} below -1", expiry));
                }
            }
        }

        issues
    }
}

// ===== Component report payloads =====

/// One indexed account and its last accepted update
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedAccount {
    pub account_id: String,
    pub last_update: AccountUpdate,
}

/// Leaderboard entry: an account and its token balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderEntry {
    pub id: String,
    pub tokens: u64,
}

/// Start of a leadership span: `account_id` became top holder at `from` (epoch ms)
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadershipInterval {
    pub account_id: String,
    pub from: i64,
}

/// Answer to a point-in-time top-owner query. `account_id` is absent and the
/// times are `-1` when no leader is known at the queried time; `until == -1`
/// on the open-ended current interval.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopOwnerAtTime {
    pub account_id: Option<String>,
    pub from: i64,
    pub until: i64,
}

/// Published (top-K) leaderboard for one account type
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountTypeLeaders {
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub accounts: Vec<LeaderEntry>,
}

/// Leadership-change history for one account type
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountTypeHistory {
    #[serde(rename = "type")]
    pub account_type: AccountType,
    pub history: Vec<LeadershipInterval>,
}

/// Full leaderboard-tracker snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardStatus {
    pub leaderboard: Vec<AccountTypeLeaders>,
    pub history: Vec<AccountTypeHistory>,
}

/// Debounce-scheduler snapshot: pending callback count, the account ids they
/// belong to, and how many callbacks have fired since startup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackStatus {
    pub callbacks: usize,
    pub accounts: Vec<String>,
    pub fired: u64,
}

/// Feed lifecycle event: emitted when casting starts, stops or runs dry
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatusEvent {
    pub source: &'static str,
    pub active: bool,
    pub leftover: usize,
    pub at: DateTime<Utc>,
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// URL or local path of the mock event-log JSON
    pub feed_source: String,
    /// Upper bound of the random delay between two cast events
    pub feed_max_interval_ms: u64,
    /// Shut the whole app down once the mock stream is exhausted
    pub exit_on_stream_end: bool,
    /// Budget for draining pending callbacks on shutdown
    pub shutdown_drain_ms: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv::dotenv().ok();

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let feed_source = std::env::var("FEED_SOURCE")
            .unwrap_or_else(|_| "./coding-challenge-input.json".to_string());

        let feed_max_interval_ms = std::env::var("FEED_MAX_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(crate::feed::EVENT_CASTING_MAX_INTERVAL_MS);

        let exit_on_stream_end = std::env::var("EXIT_ON_STREAM_END")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
            .unwrap_or(false);

        let shutdown_drain_ms = std::env::var("SHUTDOWN_DRAIN_MS")
            .unwrap_or_else(|_| "10000".to_string())
            .parse()
            .unwrap_or(10_000);

        Ok(Self {
            port,
            feed_source,
            feed_max_interval_ms,
            exit_on_stream_end,
            shutdown_drain_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_update() -> AccountUpdate {
        AccountUpdate {
            schema_version: Some(1),
            id: "GzbXUY1JQwRVUf3j3myg2NbDRwD3Y3N30UMaPpSeSZFB".to_string(),
            account_type: AccountType::Escrow,
            tokens: 500,
            callback_time_ms: 400,
            data: None,
            version: 3,
        }
    }

    #[test]
    fn test_valid_update_has_no_issues() {
        assert!(sample_update().validate().is_empty());
    }

    #[test]
    fn test_empty_id_rejected() {
        let mut upd = sample_update();
        upd.id = String::new();
        assert_eq!(upd.validate().len(), 1);
    }

    #[test]
    fn test_non_alphanumeric_id_rejected() {
        let mut upd = sample_update();
        upd.id = "bad-id-with-dashes".to_string();
        assert!(!upd.validate().is_empty());
    }

    #[test]
    fn test_oversized_id_rejected() {
        let mut upd = sample_update();
        upd.id = "a".repeat(51);
        assert!(!upd.validate().is_empty());
    }

    #[test]
    fn test_data_subfields_checked_when_present() {
        let mut upd = sample_update();
        upd.data = Some(AccountData {
            img: Some("x".to_string()), // too short
            ..Default::default()
        });
        assert!(!upd.validate().is_empty());
    }

    #[test]
    fn test_deserializes_camel_case_log_entry() {
        let raw = r#"{
            "id": "GzbXUY1JQwRVUf3j3myg2NbDRwD3Y3N30UMaPpSeSZFB",
            "accountType": "auctionData",
            "tokens": 1000,
            "callbackTimeMs": 400,
            "data": { "expiry": -1, "currentBid": 2.1 },
            "version": 7
        }"#;
        let upd: AccountUpdate = serde_json::from_str(raw).unwrap();
        assert_eq!(upd.account_type, AccountType::AuctionData);
        assert_eq!(upd.callback_time_ms, 400);
        assert_eq!(upd.data.as_ref().unwrap().expiry, Some(-1));
    }

    #[test]
    fn test_unknown_account_type_fails_deserialization() {
        let raw = r#"{
            "id": "GzbXUY1JQwRVUf3j3myg2NbDRwD3Y3N30UMaPpSeSZFB",
            "accountType": "warlock",
            "tokens": 1,
            "callbackTimeMs": 1,
            "version": 1
        }"#;
        assert!(serde_json::from_str::<AccountUpdate>(raw).is_err());
    }
}
