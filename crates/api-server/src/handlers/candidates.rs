//! Qualified-candidate handler.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct QualifiedStocksResponse {
    /// When the listed candidates were last refreshed.
    pub as_of: DateTime<Utc>,
    pub count: usize,
    pub candidates: Vec<CandidateResponse>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CandidateResponse {
    pub symbol: String,
    #[schema(value_type = f64)]
    pub score: Decimal,
    #[schema(value_type = f64)]
    pub confidence: Decimal,
}

/// Current qualified stock candidates, as of the last completed cycle.
#[utoipa::path(
    get,
    path = "/qualified-stocks",
    tag = "monitoring",
    responses(
        (status = 200, description = "Candidates from the last cycle", body = QualifiedStocksResponse)
    )
)]
pub async fn qualified_stocks(State(state): State<Arc<AppState>>) -> Json<QualifiedStocksResponse> {
    let snapshot = state.latest();
    Json(QualifiedStocksResponse {
        as_of: snapshot.generated_at,
        count: snapshot.qualified_candidates.len(),
        candidates: snapshot
            .qualified_candidates
            .iter()
            .map(|c| CandidateResponse {
                symbol: c.symbol.clone(),
                score: c.score,
                confidence: c.confidence,
            })
            .collect(),
    })
}
