//! Per-account circuit breaker: a one-way latch for the trading session.
//!
//! Evaluation runs once per cycle per account, reading only that account's
//! books. Once open, the breaker stays open until an explicit session reset
//! or a manual override; there is no automatic cooldown re-entry.

use chrono::Utc;
use rust_decimal::Decimal;
use tracing::error;

use systemx_core::config::{AccountRiskConfig, RiskManagementConfig};
use systemx_core::{BreakerStatus, RiskState, TripReason};

/// Threshold evaluation. Returns the reason the breaker should trip, or
/// None when the account is within its budget or the breaker is already
/// open (the latch never re-trips).
pub fn evaluate(
    state: &RiskState,
    equity: Decimal,
    account_risk: &AccountRiskConfig,
    global: &RiskManagementConfig,
) -> Option<TripReason> {
    if !global.circuit_breaker_enabled || state.breaker.is_open() {
        return None;
    }

    let loss_limit = account_risk.daily_loss_limit * equity;
    if state.daily_realized_pnl < Decimal::ZERO && state.daily_realized_pnl.abs() >= loss_limit {
        return Some(TripReason::DailyLossLimit);
    }

    if state.consecutive_losses >= global.max_consecutive_losses {
        return Some(TripReason::ConsecutiveLosses);
    }

    None
}

/// Latch the breaker open. Returns true on the CLOSED -> OPEN transition,
/// false when it was already open (callers notify only on the transition).
pub fn trip(state: &mut RiskState, account_id: &str, reason: TripReason) -> bool {
    if state.breaker.is_open() {
        return false;
    }

    state.breaker = BreakerStatus::Open {
        reason: reason.clone(),
        tripped_at: Utc::now(),
    };

    error!(
        account_id,
        reason = ?reason,
        daily_pnl = %state.daily_realized_pnl,
        consecutive_losses = state.consecutive_losses,
        "Circuit breaker TRIPPED - trading halted for account"
    );
    true
}
