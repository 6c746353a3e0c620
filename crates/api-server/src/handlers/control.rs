//! Emergency-stop handler.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;

use systemx_core::StopActor;

use crate::state::AppState;

/// Emergency stop request body.
#[derive(Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct EmergencyStopBody {
    /// Free-text reason recorded with the halt.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Emergency stop acknowledgement.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EmergencyStopResponse {
    /// True when this request initiated the stop.
    pub accepted: bool,
    /// True when a stop was already pending; the request was a no-op.
    pub already_pending: bool,
    pub message: String,
}

/// Emergency stop endpoint. Idempotent: repeated calls acknowledge without
/// producing a second halt.
#[utoipa::path(
    post,
    path = "/emergency-stop",
    tag = "control",
    request_body = EmergencyStopBody,
    responses(
        (status = 200, description = "Stop initiated or already pending", body = EmergencyStopResponse)
    )
)]
pub async fn emergency_stop(
    State(state): State<Arc<AppState>>,
    body: Option<Json<EmergencyStopBody>>,
) -> Json<EmergencyStopResponse> {
    let reason = body
        .and_then(|Json(b)| b.reason)
        .unwrap_or_else(|| "dashboard emergency stop".to_string());

    warn!(%reason, "Emergency stop requested via API");
    let accepted = state.stop.trigger(reason, StopActor::Dashboard);

    Json(EmergencyStopResponse {
        accepted,
        already_pending: !accepted,
        message: if accepted {
            "emergency stop initiated; all accounts halting".to_string()
        } else {
            "emergency stop already pending".to_string()
        },
    })
}
