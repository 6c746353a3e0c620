//! Core data model shared across the control core.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AccountRiskConfig;

/// Operating mode selected by the market-session oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Trading,
    Backtesting,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Trading => write!(f, "trading"),
            Mode::Backtesting => write!(f, "backtesting"),
        }
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// One open holding within an account.
///
/// Quantity is signed: positive is long, negative is short. A fully closed
/// position is removed from the account, never kept at zero quantity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub quantity: Decimal,
    pub entry_price: Decimal,
    pub current_price: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn new(symbol: impl Into<String>, quantity: Decimal, entry_price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            quantity,
            entry_price,
            current_price: entry_price,
            opened_at: Utc::now(),
        }
    }

    /// Absolute market value of the holding.
    pub fn market_value(&self) -> Decimal {
        (self.quantity * self.current_price).abs()
    }

    /// Unrealized P&L as a fraction of entry cost (e.g. -0.05 = down 5%).
    pub fn unrealized_pnl_pct(&self) -> Decimal {
        if self.entry_price.is_zero() {
            return Decimal::ZERO;
        }
        let raw = (self.current_price - self.entry_price) / self.entry_price;
        // Short positions profit when price falls.
        if self.quantity < Decimal::ZERO {
            -raw
        } else {
            raw
        }
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        (self.current_price - self.entry_price) * self.quantity
    }
}

/// One brokerage account under management.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub starting_equity: Decimal,
    pub cash: Decimal,
    pub positions: Vec<Position>,
    pub risk: AccountRiskConfig,
}

impl Account {
    pub fn new(id: impl Into<String>, starting_equity: Decimal, risk: AccountRiskConfig) -> Self {
        Self {
            id: id.into(),
            starting_equity,
            cash: starting_equity,
            positions: Vec::new(),
            risk,
        }
    }

    /// Current equity: cash plus marked-to-market positions.
    pub fn equity(&self) -> Decimal {
        self.cash + self.positions.iter().map(|p| p.market_value()).sum::<Decimal>()
    }

    /// Sum of position market values.
    pub fn exposure(&self) -> Decimal {
        self.positions.iter().map(|p| p.market_value()).sum()
    }

    /// Exposure as a fraction of equity.
    pub fn exposure_fraction(&self) -> Decimal {
        let equity = self.equity();
        if equity <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        self.exposure() / equity
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.iter().find(|p| p.symbol == symbol)
    }

    pub fn position_mut(&mut self, symbol: &str) -> Option<&mut Position> {
        self.positions.iter_mut().find(|p| p.symbol == symbol)
    }

    /// Remove a fully closed position. Positions are removed, not zeroed.
    pub fn remove_position(&mut self, symbol: &str) -> Option<Position> {
        let idx = self.positions.iter().position(|p| p.symbol == symbol)?;
        Some(self.positions.remove(idx))
    }
}

/// Why the circuit breaker latched open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripReason {
    /// Daily realized loss limit exceeded.
    DailyLossLimit,
    /// Too many consecutive losing trades.
    ConsecutiveLosses,
    /// Repeated adapter failures for this account (systemic risk).
    AdapterFailures,
    /// Operator or dashboard emergency stop.
    EmergencyStop,
    /// Manual halt.
    Manual,
}

/// Circuit-breaker status. Once open, only a session reset or manual
/// override returns it to closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum BreakerStatus {
    Closed,
    Open {
        reason: TripReason,
        tripped_at: DateTime<Utc>,
    },
}

impl BreakerStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerStatus::Open { .. })
    }
}

/// Per-account rolling risk bookkeeping, reset at each session start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskState {
    pub trades_today: u32,
    pub day_trades_today: u32,
    pub consecutive_losses: u32,
    pub daily_realized_pnl: Decimal,
    pub breaker: BreakerStatus,
}

impl Default for RiskState {
    fn default() -> Self {
        Self {
            trades_today: 0,
            day_trades_today: 0,
            consecutive_losses: 0,
            daily_realized_pnl: Decimal::ZERO,
            breaker: BreakerStatus::Closed,
        }
    }
}

impl RiskState {
    /// Record a realized trade result against the daily books.
    pub fn record_trade(&mut self, realized_pnl: Decimal, day_trade: bool) {
        self.trades_today += 1;
        if day_trade {
            self.day_trades_today += 1;
        }
        self.daily_realized_pnl += realized_pnl;
        if realized_pnl < Decimal::ZERO {
            self.consecutive_losses += 1;
        } else {
            self.consecutive_losses = 0;
        }
    }

    /// Start-of-session reset. This is the only non-manual path that returns
    /// an open breaker to closed.
    pub fn reset_session(&mut self) {
        *self = RiskState::default();
    }
}

/// What the strategy collaborator wants to do with a position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseTrigger {
    StopLoss,
    TakeProfit,
    Signal,
}

/// Candidate action kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum IntentKind {
    Open,
    Resize,
    Close { trigger: CloseTrigger },
}

impl IntentKind {
    /// Risk-reducing actions bypass the exposure checks.
    pub fn is_risk_reducing(&self) -> bool {
        matches!(
            self,
            IntentKind::Close {
                trigger: CloseTrigger::StopLoss | CloseTrigger::TakeProfit
            }
        )
    }
}

/// A candidate action proposed by the strategy collaborator, before it has
/// passed the risk engine's admission gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeIntent {
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub kind: IntentKind,
    /// Edge estimate from the strategy collaborator; consumed only when
    /// Kelly sizing is enabled. The risk engine clamps, it never computes.
    pub kelly_fraction: Option<Decimal>,
    pub reason: String,
}

/// An externally scored stock candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    pub score: Decimal,
    pub confidence: Decimal,
}

/// Outcome of submitting one admitted order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRecord {
    pub order_id: Uuid,
    pub account_id: String,
    pub symbol: String,
    pub side: OrderSide,
    pub quantity: Decimal,
    pub price: Decimal,
    pub reason: String,
    pub submitted_at: DateTime<Utc>,
}

/// Per-account slot inside a [`CycleResult`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountCycleReport {
    pub account_id: String,
    pub orders_attempted: u32,
    pub orders_filled: u32,
    pub orders_rejected: u32,
    pub errors: Vec<String>,
    pub breaker_open: bool,
}

impl AccountCycleReport {
    pub fn new(account_id: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            ..Default::default()
        }
    }

    /// A slot is fully failed when every adapter step errored and nothing
    /// was processed.
    pub fn fully_failed(&self) -> bool {
        !self.errors.is_empty() && self.orders_attempted == 0 && self.orders_filled == 0
    }
}

/// One per-strategy backtest outcome reported by the collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySummary {
    pub strategy: String,
    pub total_return_pct: Decimal,
    pub trades: u32,
}

/// Immutable outcome of one scheduler iteration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleResult {
    pub seq: u64,
    pub mode: Mode,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub accounts: Vec<AccountCycleReport>,
    pub backtests: Vec<StrategySummary>,
    /// Cycle-scoped failures not attributable to one account (candidate
    /// refresh, backtest collaborator).
    pub errors: Vec<String>,
}

impl CycleResult {
    pub fn orders_attempted(&self) -> u32 {
        self.accounts.iter().map(|a| a.orders_attempted).sum()
    }

    pub fn orders_filled(&self) -> u32 {
        self.accounts.iter().map(|a| a.orders_filled).sum()
    }

    pub fn orders_rejected(&self) -> u32 {
        self.accounts.iter().map(|a| a.orders_rejected).sum()
    }

    pub fn error_count(&self) -> usize {
        self.accounts.iter().map(|a| a.errors.len()).sum()
    }
}

/// Who asked for the emergency stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopActor {
    Dashboard,
    CircuitBreaker,
    Operator,
}

/// A one-shot halt signal, consumed exactly once by the scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyStopRequest {
    pub reason: String,
    pub actor: StopActor,
    pub requested_at: DateTime<Utc>,
}

impl EmergencyStopRequest {
    pub fn new(reason: impl Into<String>, actor: StopActor) -> Self {
        Self {
            reason: reason.into(),
            actor,
            requested_at: Utc::now(),
        }
    }
}
