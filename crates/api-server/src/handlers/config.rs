//! Running-configuration handler.

use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::state::AppState;

/// Running configuration, with the webhook URL elided.
#[utoipa::path(
    get,
    path = "/config",
    tag = "monitoring",
    responses(
        (status = 200, description = "Active configuration")
    )
)]
pub async fn get_config(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut value = serde_json::to_value(state.config.as_ref())?;

    // The webhook URL embeds a credential; report presence only.
    if let Some(monitoring) = value.get_mut("monitoring").and_then(|m| m.as_object_mut()) {
        let configured = monitoring
            .get("webhook_url")
            .map(|v| !v.is_null())
            .unwrap_or(false);
        monitoring.insert("webhook_url".to_string(), serde_json::Value::Null);
        monitoring.insert(
            "webhook_configured".to_string(),
            serde_json::Value::Bool(configured),
        );
    }

    Ok(Json(value))
}
