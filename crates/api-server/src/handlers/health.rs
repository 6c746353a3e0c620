//! Health check handler.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use scheduler::SystemStatus;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// Coarse system status.
    pub status: String,
    /// Service version.
    pub version: String,
    /// Current timestamp.
    pub timestamp: DateTime<Utc>,
    /// Seconds since the scheduler started.
    pub uptime_secs: i64,
    /// Current scheduler mode, if running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    /// Start time of the most recent completed cycle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<DateTime<Utc>>,
    /// Whether an emergency stop has been requested.
    pub emergency_stop_pending: bool,
    /// Per-adapter connectivity from the latest cycle.
    pub adapters: AdapterStatus,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AdapterStatus {
    pub broker: bool,
    pub candidates: bool,
    pub persistence: bool,
    pub notifications: bool,
}

/// Health check endpoint. Reports 503 once the scheduler has stopped.
#[utoipa::path(
    get,
    path = "/health",
    tag = "monitoring",
    responses(
        (status = 200, description = "Scheduler is running", body = HealthResponse),
        (status = 503, description = "Scheduler is stopped", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.latest();

    let status = match snapshot.status {
        SystemStatus::EmergencyStopped | SystemStatus::Stopped => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };

    let body = HealthResponse {
        status: snapshot.status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        uptime_secs: (Utc::now() - snapshot.started_at).num_seconds().max(0),
        mode: snapshot.mode.map(|m| m.to_string()),
        last_cycle_at: snapshot.last_cycle_at,
        emergency_stop_pending: snapshot.emergency_stop_pending,
        adapters: AdapterStatus {
            broker: snapshot.adapters.broker,
            candidates: snapshot.adapters.candidates,
            persistence: snapshot.adapters.persistence,
            notifications: snapshot.adapters.notifications,
        },
    };

    (status, Json(body))
}
