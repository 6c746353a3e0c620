//! Capability interfaces the control core consumes.
//!
//! Broker, market data, candidate scoring, persistence, notifications, and
//! the strategy/backtest collaborators are all external; the core calls these
//! narrow traits and never reaches past them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::types::{
    Account, Candidate, CycleResult, OrderRecord, OrderSide, Position, StrategySummary,
    TradeIntent, TripReason,
};
use crate::Result;

/// Notification severity, used both for log level mapping and alert routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Order placement and account/position reads against the brokerage.
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    async fn get_positions(&self, account_id: &str) -> Result<Vec<Position>>;

    async fn get_prices(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>>;

    /// Submit a market order; returns the broker-assigned order id.
    async fn submit_order(
        &self,
        account_id: &str,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<Uuid>;

    async fn cancel_order(&self, order_id: Uuid) -> Result<()>;
}

/// Externally-scored stock candidates, refreshed at most once per cycle.
#[async_trait]
pub trait CandidateSource: Send + Sync {
    async fn get_qualified_candidates(&self) -> Result<Vec<Candidate>>;
}

/// A circuit-breaker event bound for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerEvent {
    pub account_id: String,
    pub reason: TripReason,
    pub tripped_at: DateTime<Utc>,
    pub daily_realized_pnl: Decimal,
    pub consecutive_losses: u32,
}

/// Fire-and-log audit trail. Failures are recorded and retried by callers;
/// they never block order submission.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync {
    async fn record_cycle(&self, cycle: &CycleResult) -> Result<()>;

    async fn record_order(&self, order: &OrderRecord) -> Result<()>;

    async fn record_circuit_breaker_event(&self, event: &BreakerEvent) -> Result<()>;
}

/// Best-effort operator alerting, rate-limited by the caller.
#[async_trait]
pub trait NotificationAdapter: Send + Sync {
    async fn notify(&self, severity: Severity, message: &str) -> Result<()>;
}

#[async_trait]
impl<N: NotificationAdapter + ?Sized> NotificationAdapter for std::sync::Arc<N> {
    async fn notify(&self, severity: Severity, message: &str) -> Result<()> {
        (**self).notify(severity, message).await
    }
}

/// The excluded strategy collaborator: proposes candidate actions for one
/// account. The core only gates them through the risk engine.
#[async_trait]
pub trait StrategyCollaborator: Send + Sync {
    async fn propose(
        &self,
        account: &Account,
        candidates: &[Candidate],
        prices: &HashMap<String, Decimal>,
    ) -> Result<Vec<TradeIntent>>;
}

/// The excluded backtesting collaborator: evaluates strategies against
/// historical data while the market is closed.
#[async_trait]
pub trait BacktestRunner: Send + Sync {
    async fn run(&self, candidates: &[Candidate]) -> Result<Vec<StrategySummary>>;
}
