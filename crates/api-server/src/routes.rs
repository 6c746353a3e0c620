//! API route definitions.

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::handlers::{candidates, config, control, health, metrics};
use crate::state::AppState;

/// OpenAPI documentation.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "System X Control API",
        version = "1.0.0",
        description = "Monitoring and control surface for the autonomous trading core"
    ),
    paths(
        health::health_check,
        metrics::get_metrics,
        config::get_config,
        candidates::qualified_stocks,
        control::emergency_stop,
    ),
    components(
        schemas(
            crate::error::ErrorResponse,
            health::HealthResponse,
            health::AdapterStatus,
            metrics::MetricsResponse,
            metrics::AccountMetricsResponse,
            metrics::RiskMetricsResponse,
            metrics::BacktestSummaryResponse,
            candidates::QualifiedStocksResponse,
            candidates::CandidateResponse,
            control::EmergencyStopBody,
            control::EmergencyStopResponse,
        )
    ),
    tags(
        (name = "monitoring", description = "Read-only scheduler and portfolio state"),
        (name = "control", description = "Operator control actions"),
    )
)]
pub struct ApiDoc;

/// Create the main router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::get_metrics))
        .route("/config", get(config::get_config))
        .route("/qualified-stocks", get(candidates::qualified_stocks))
        .route("/emergency-stop", post(control::emergency_stop))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
}
