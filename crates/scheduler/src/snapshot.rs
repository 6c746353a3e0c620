//! Read-only state published to the monitoring surface.
//!
//! The scheduler builds a fresh [`MetricsSnapshot`] after every cycle and
//! swaps it into a watch channel as a single `Arc`. Readers always observe a
//! complete snapshot from one instant; a cycle in progress is never visible.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use systemx_core::{BreakerStatus, Candidate, Mode, StrategySummary};

use crate::metrics::RiskMetrics;
use crate::registry::ManagedAccount;

/// Coarse system status derived from scheduler state and adapter health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemStatus {
    Starting,
    Operational,
    /// Running, but an adapter is down or a circuit breaker is open.
    Degraded,
    EmergencyStopped,
    Stopped,
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemStatus::Starting => write!(f, "starting"),
            SystemStatus::Operational => write!(f, "operational"),
            SystemStatus::Degraded => write!(f, "degraded"),
            SystemStatus::EmergencyStopped => write!(f, "emergency_stopped"),
            SystemStatus::Stopped => write!(f, "stopped"),
        }
    }
}

/// Last-observed outcome of each adapter family.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AdapterHealth {
    pub broker: bool,
    pub candidates: bool,
    pub persistence: bool,
    pub notifications: bool,
}

impl Default for AdapterHealth {
    /// Optimistic until a call has actually failed.
    fn default() -> Self {
        Self {
            broker: true,
            candidates: true,
            persistence: true,
            notifications: true,
        }
    }
}

impl AdapterHealth {
    pub fn all_connected(&self) -> bool {
        self.broker && self.candidates && self.persistence && self.notifications
    }
}

/// Per-account view inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountMetrics {
    pub account_id: String,
    pub equity: Decimal,
    pub cash: Decimal,
    pub exposure_pct: Decimal,
    pub daily_realized_pnl: Decimal,
    pub open_positions: usize,
    pub trades_today: u32,
    pub day_trades_today: u32,
    pub consecutive_losses: u32,
    pub breaker: BreakerStatus,
}

impl AccountMetrics {
    pub fn from_managed(managed: &ManagedAccount) -> Self {
        Self {
            account_id: managed.account.id.clone(),
            equity: managed.account.equity(),
            cash: managed.account.cash,
            exposure_pct: managed.account.exposure_fraction() * Decimal::new(100, 0),
            daily_realized_pnl: managed.risk.daily_realized_pnl,
            open_positions: managed.account.positions.len(),
            trades_today: managed.risk.trades_today,
            day_trades_today: managed.risk.day_trades_today,
            consecutive_losses: managed.risk.consecutive_losses,
            breaker: managed.risk.breaker.clone(),
        }
    }
}

/// Complete monitoring state at one instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub status: SystemStatus,
    pub mode: Option<Mode>,
    pub cycle_seq: u64,
    pub started_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_cycle_duration_ms: Option<u64>,
    pub emergency_stop_pending: bool,
    pub accounts: Vec<AccountMetrics>,
    pub risk: RiskMetrics,
    pub adapters: AdapterHealth,
    pub qualified_candidates: Vec<Candidate>,
    pub recent_backtests: Vec<StrategySummary>,
}

impl MetricsSnapshot {
    /// Initial snapshot published before the first cycle completes.
    pub fn startup(started_at: DateTime<Utc>) -> Self {
        Self {
            status: SystemStatus::Starting,
            mode: None,
            cycle_seq: 0,
            started_at,
            generated_at: started_at,
            last_cycle_at: None,
            last_cycle_duration_ms: None,
            emergency_stop_pending: false,
            accounts: Vec::new(),
            risk: RiskMetrics::default(),
            adapters: AdapterHealth::default(),
            qualified_candidates: Vec::new(),
            recent_backtests: Vec::new(),
        }
    }

    pub fn uptime_secs(&self) -> i64 {
        (self.generated_at - self.started_at).num_seconds().max(0)
    }
}
