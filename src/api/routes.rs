//! Minimal REST surface over the ingestion components: status snapshots,
//! the leaderboard queries and the mock-feed recast control.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, put},
    Router,
};
use serde::Serialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::feed::MockEventFeed;
use crate::handlers::{DebounceScheduler, LeaderboardTracker};
use crate::ingest::UpdateIndex;
use crate::models::{
    AccountType, AccountTypeLeaders, CallbackStatus, IndexedAccount, LeaderboardStatus,
    TopOwnerAtTime,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub index: Arc<UpdateIndex>,
    pub leaderboard: Arc<LeaderboardTracker>,
    pub callbacks: Arc<DebounceScheduler>,
    pub feed: Arc<MockEventFeed>,
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/status", get(get_status))
        .route("/api/accounts/leaderboard", get(get_leaderboard))
        .route(
            "/api/accounts/maxhodler/:account_type/:time_ms",
            get(get_top_owner_at_time),
        )
        .route("/api/mock/recast", put(recast))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ===== Route Handlers =====

/// Health check endpoint
async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Complete snapshot of the app components' states
async fn get_status(State(state): State<AppState>) -> Json<AppStatusResponse> {
    Json(AppStatusResponse {
        accounts: state.index.report_status(),
        maxtokens: state.leaderboard.report_status(),
        pending: state.callbacks.report_status(),
    })
}

/// Top token owners per account type (top K only)
async fn get_leaderboard(State(state): State<AppState>) -> Json<Vec<AccountTypeLeaders>> {
    Json(state.leaderboard.report_leaderboard())
}

/// Which account owned the most tokens of the given type at a point in time.
/// Unknown types are a client error; an unknown time yields the absent
/// sentinel payload, not an error.
async fn get_top_owner_at_time(
    State(state): State<AppState>,
    Path((account_type, time_ms)): Path<(String, i64)>,
) -> Result<Json<TopOwnerAtTime>, ApiError> {
    let account_type = AccountType::from_str(&account_type).map_err(ApiError::BadRequest)?;
    Ok(Json(
        state.leaderboard.retrieve_top_owner_at_time(account_type, time_ms),
    ))
}

/// Flush the index and replay the mock event set from the top
async fn recast(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let flushed = state.index.flush();
    let casting = state
        .feed
        .start_casting()
        .await
        .map_err(|err| ApiError::Internal(format!("{err:#}")))?;
    info!(
        "Recast requested: flushed {} indexed accounts, casting {} events",
        flushed.len(),
        casting
    );
    Ok(Json(json!({ "flushed": flushed.len(), "casting": casting })))
}

// ===== Request/Response Types =====

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct AppStatusResponse {
    accounts: Vec<IndexedAccount>,
    maxtokens: LeaderboardStatus,
    pending: CallbackStatus,
}

// ===== Error Handling =====

enum ApiError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
