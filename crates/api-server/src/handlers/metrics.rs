//! Portfolio metrics handler.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use scheduler::MetricsSnapshot;

use crate::state::AppState;

/// Full metrics view for the dashboard.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MetricsResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    pub cycle_seq: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_cycle_duration_ms: Option<u64>,
    pub generated_at: DateTime<Utc>,
    pub accounts: Vec<AccountMetricsResponse>,
    pub risk: RiskMetricsResponse,
    pub recent_backtests: Vec<BacktestSummaryResponse>,
}

/// Per-account books at the last cycle boundary.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct AccountMetricsResponse {
    pub account_id: String,
    #[schema(value_type = f64)]
    pub equity: Decimal,
    #[schema(value_type = f64)]
    pub cash: Decimal,
    #[schema(value_type = f64)]
    pub exposure_pct: Decimal,
    #[schema(value_type = f64)]
    pub daily_realized_pnl: Decimal,
    pub open_positions: usize,
    pub trades_today: u32,
    pub day_trades_today: u32,
    pub consecutive_losses: u32,
    pub circuit_breaker_open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub circuit_breaker_reason: Option<String>,
}

/// Annualized risk statistics over the rolling daily-return window.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RiskMetricsResponse {
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub var_95: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BacktestSummaryResponse {
    pub strategy: String,
    #[schema(value_type = f64)]
    pub total_return_pct: Decimal,
    pub trades: u32,
}

impl MetricsResponse {
    pub fn from_snapshot(snapshot: &MetricsSnapshot) -> Self {
        Self {
            status: snapshot.status.to_string(),
            mode: snapshot.mode.map(|m| m.to_string()),
            cycle_seq: snapshot.cycle_seq,
            last_cycle_at: snapshot.last_cycle_at,
            last_cycle_duration_ms: snapshot.last_cycle_duration_ms,
            generated_at: snapshot.generated_at,
            accounts: snapshot
                .accounts
                .iter()
                .map(|a| AccountMetricsResponse {
                    account_id: a.account_id.clone(),
                    equity: a.equity,
                    cash: a.cash,
                    exposure_pct: a.exposure_pct,
                    daily_realized_pnl: a.daily_realized_pnl,
                    open_positions: a.open_positions,
                    trades_today: a.trades_today,
                    day_trades_today: a.day_trades_today,
                    consecutive_losses: a.consecutive_losses,
                    circuit_breaker_open: a.breaker.is_open(),
                    circuit_breaker_reason: match &a.breaker {
                        systemx_core::BreakerStatus::Open { reason, .. } => {
                            Some(format!("{reason:?}"))
                        }
                        systemx_core::BreakerStatus::Closed => None,
                    },
                })
                .collect(),
            risk: RiskMetricsResponse {
                sharpe_ratio: snapshot.risk.sharpe_ratio,
                sortino_ratio: snapshot.risk.sortino_ratio,
                var_95: snapshot.risk.var_95,
                max_drawdown: snapshot.risk.max_drawdown,
            },
            recent_backtests: snapshot
                .recent_backtests
                .iter()
                .map(|s| BacktestSummaryResponse {
                    strategy: s.strategy.clone(),
                    total_return_pct: s.total_return_pct,
                    trades: s.trades,
                })
                .collect(),
        }
    }
}

/// Portfolio metrics endpoint.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "monitoring",
    responses(
        (status = 200, description = "Current portfolio metrics", body = MetricsResponse)
    )
)]
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsResponse> {
    let snapshot = state.latest();
    Json(MetricsResponse::from_snapshot(&snapshot))
}
