//! The admission gate between strategy intent and the broker.
//!
//! Every candidate action is answered with ALLOW (possibly at a clamped
//! quantity) or REJECT with a reason. Checks are ordered and short-circuit:
//! the first failing check wins. All reads and writes touch only the one
//! account under evaluation, so one account's losses can never influence
//! another's sizing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use systemx_core::config::TradingConfig;
use systemx_core::{Account, IntentKind, OrderSide, RiskState, TradeIntent};

use crate::sizing::kelly_target_quantity;

/// Why an intent was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Circuit breaker is open for this account.
    AccountHalted,
    /// Another day trade would exceed the PDT limit.
    DayTradeLimit,
    /// Clamped quantity rounds to zero shares.
    BelowMinimumSize,
    /// Resulting total exposure would exceed the configured fraction.
    ExposureLimit,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::AccountHalted => write!(f, "account halted"),
            RejectReason::DayTradeLimit => write!(f, "PDT limit"),
            RejectReason::BelowMinimumSize => write!(f, "below minimum size"),
            RejectReason::ExposureLimit => write!(f, "exposure limit"),
        }
    }
}

/// Admission verdict for one candidate action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum Admission {
    /// Admitted, possibly at a quantity clamped below the request.
    Allow { quantity: Decimal },
    Reject { reason: RejectReason },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow { .. })
    }
}

/// Gate one candidate action against the account's risk budget.
pub fn admit(
    account: &Account,
    state: &RiskState,
    intent: &TradeIntent,
    trading: &TradingConfig,
) -> Admission {
    // 1. Halted accounts trade nothing.
    if state.breaker.is_open() {
        return Admission::Reject {
            reason: RejectReason::AccountHalted,
        };
    }

    // 2. PDT compliance. Closing a same-day position is the action that
    // completes a day trade, so only closes consume the budget.
    if matches!(intent.kind, IntentKind::Close { .. })
        && would_be_day_trade(account, intent)
        && state.day_trades_today >= trading.max_day_trades
    {
        return Admission::Reject {
            reason: RejectReason::DayTradeLimit,
        };
    }

    // Risk-reducing closes bypass the sizing and exposure checks entirely;
    // a stop-loss must never be blocked by the budget it is shrinking. The
    // admitted quantity is always an unsigned share count, even when the
    // position being unwound is short.
    if intent.kind.is_risk_reducing() {
        return Admission::Allow {
            quantity: intent.quantity.abs(),
        };
    }

    let equity = account.equity();
    if equity <= Decimal::ZERO || intent.price <= Decimal::ZERO {
        return Admission::Reject {
            reason: RejectReason::BelowMinimumSize,
        };
    }

    // Plain closes reduce exposure; admit at the requested share count.
    if matches!(intent.kind, IntentKind::Close { .. }) {
        return Admission::Allow {
            quantity: intent.quantity.abs(),
        };
    }

    // 3. Per-position budget. Kelly mode retargets the quantity first; the
    // clamp then applies either way, rejecting only when it rounds to zero.
    let requested = match (trading.kelly_enabled, intent.kelly_fraction) {
        (true, Some(fraction)) => {
            kelly_target_quantity(equity, intent.price, fraction, &account.risk)
        }
        _ => intent.quantity,
    };

    let existing_value = account
        .position(&intent.symbol)
        .map(|p| p.market_value())
        .unwrap_or(Decimal::ZERO);
    let position_budget = account.risk.max_position_size * equity;
    let headroom = (position_budget - existing_value).max(Decimal::ZERO);
    let max_quantity = (headroom / intent.price).floor();
    let quantity = requested.min(max_quantity);

    if quantity < Decimal::ONE {
        return Admission::Reject {
            reason: RejectReason::BelowMinimumSize,
        };
    }

    if quantity < requested {
        debug!(
            account_id = %account.id,
            symbol = %intent.symbol,
            requested = %requested,
            clamped = %quantity,
            "Clamped intent to position budget"
        );
    }

    // 4. Total exposure, existing plus candidate.
    let resulting_exposure = account.exposure() + quantity * intent.price;
    if resulting_exposure > trading.max_total_exposure * equity {
        return Admission::Reject {
            reason: RejectReason::ExposureLimit,
        };
    }

    Admission::Allow { quantity }
}

/// A close completes a day trade when the position it unwinds was opened in
/// the current session.
fn would_be_day_trade(account: &Account, intent: &TradeIntent) -> bool {
    account
        .position(&intent.symbol)
        .map(|p| p.opened_at.date_naive() == chrono::Utc::now().date_naive())
        .unwrap_or(false)
}

/// Convenience used by tests and the scheduler to express a signal close.
pub fn close_intent(symbol: &str, quantity: Decimal, price: Decimal, kind: IntentKind) -> TradeIntent {
    TradeIntent {
        symbol: symbol.to_string(),
        side: if quantity >= Decimal::ZERO {
            OrderSide::Sell
        } else {
            OrderSide::Buy
        },
        quantity: quantity.abs(),
        price,
        kind,
        kelly_fraction: None,
        reason: String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use systemx_core::{
        AccountRiskConfig, BreakerStatus, CloseTrigger, Position, TripReason,
    };

    fn account_30k() -> Account {
        Account::new("PRIMARY_30K", Decimal::new(30_000, 0), AccountRiskConfig::default())
    }

    fn open_intent(symbol: &str, quantity: i64, price: i64) -> TradeIntent {
        TradeIntent {
            symbol: symbol.to_string(),
            side: OrderSide::Buy,
            quantity: Decimal::new(quantity, 0),
            price: Decimal::new(price, 0),
            kind: IntentKind::Open,
            kelly_fraction: None,
            reason: "test".to_string(),
        }
    }

    #[test]
    fn halted_account_rejects_everything() {
        let account = account_30k();
        let state = RiskState {
            breaker: BreakerStatus::Open {
                reason: TripReason::DailyLossLimit,
                tripped_at: Utc::now(),
            },
            ..Default::default()
        };

        let verdict = admit(&account, &state, &open_intent("AAPL", 10, 100), &TradingConfig::default());
        assert_eq!(verdict, Admission::Reject { reason: RejectReason::AccountHalted });
    }

    #[test]
    fn oversized_order_is_clamped_not_rejected() {
        // $30,000 equity, max_position_size 0.15, candidate sized at 20% of
        // equity ($6,000): clamp to $4,500 notional.
        let account = account_30k();
        let state = RiskState::default();
        let intent = open_intent("AAPL", 600, 10); // $6,000

        let verdict = admit(&account, &state, &intent, &TradingConfig::default());
        match verdict {
            Admission::Allow { quantity } => {
                assert_eq!(quantity * Decimal::new(10, 0), Decimal::new(4_500, 0));
            }
            other => panic!("expected clamp, got {other:?}"),
        }
    }

    #[test]
    fn clamp_to_zero_rejects_below_minimum() {
        let mut account = account_30k();
        // Position already at the per-symbol budget.
        account.cash = Decimal::new(25_500, 0);
        account.positions.push(Position::new(
            "AAPL",
            Decimal::new(45, 0),
            Decimal::new(100, 0),
        ));

        let verdict = admit(
            &account,
            &RiskState::default(),
            &open_intent("AAPL", 10, 100),
            &TradingConfig::default(),
        );
        assert_eq!(verdict, Admission::Reject { reason: RejectReason::BelowMinimumSize });
    }

    #[test]
    fn exposure_limit_rejects_after_clamp() {
        let mut account = account_30k();
        // Five positions at ~14.6% each put exposure near the 75% cap.
        account.cash = Decimal::new(8_000, 0);
        for symbol in ["AAA", "BBB", "CCC", "DDD", "EEE"] {
            account.positions.push(Position::new(
                symbol,
                Decimal::new(44, 0),
                Decimal::new(100, 0),
            ));
        }

        let verdict = admit(
            &account,
            &RiskState::default(),
            &open_intent("FFF", 40, 100),
            &TradingConfig::default(),
        );
        assert_eq!(verdict, Admission::Reject { reason: RejectReason::ExposureLimit });
    }

    #[test]
    fn stop_loss_close_admitted_at_full_exposure() {
        let mut account = account_30k();
        // Exposure pinned at 100% of the configured cap.
        account.cash = Decimal::new(7_500, 0);
        account.positions.push(Position::new(
            "AAPL",
            Decimal::new(225, 0),
            Decimal::new(100, 0),
        ));

        let intent = close_intent(
            "AAPL",
            Decimal::new(225, 0),
            Decimal::new(100, 0),
            IntentKind::Close { trigger: CloseTrigger::StopLoss },
        );
        let verdict = admit(&account, &RiskState::default(), &intent, &TradingConfig::default());
        assert!(verdict.is_allowed());
    }

    #[test]
    fn take_profit_close_admitted_at_full_exposure() {
        let mut account = account_30k();
        account.cash = Decimal::ZERO;
        account.positions.push(Position::new(
            "TSLA",
            Decimal::new(300, 0),
            Decimal::new(100, 0),
        ));

        let intent = close_intent(
            "TSLA",
            Decimal::new(300, 0),
            Decimal::new(110, 0),
            IntentKind::Close { trigger: CloseTrigger::TakeProfit },
        );
        let verdict = admit(&account, &RiskState::default(), &intent, &TradingConfig::default());
        assert!(verdict.is_allowed());
    }

    #[test]
    fn short_close_admits_an_unsigned_share_count() {
        let mut account = account_30k();
        account.positions.push(Position::new(
            "GME",
            Decimal::new(-50, 0),
            Decimal::new(40, 0),
        ));

        // A buy-to-cover carrying the position's signed quantity must never
        // reach the broker as a negative share count.
        let intent = TradeIntent {
            symbol: "GME".to_string(),
            side: OrderSide::Buy,
            quantity: Decimal::new(-50, 0),
            price: Decimal::new(42, 0),
            kind: IntentKind::Close { trigger: CloseTrigger::StopLoss },
            kelly_fraction: None,
            reason: "buy to cover".to_string(),
        };
        let verdict = admit(&account, &RiskState::default(), &intent, &TradingConfig::default());
        assert_eq!(verdict, Admission::Allow { quantity: Decimal::new(50, 0) });

        let plain = TradeIntent {
            kind: IntentKind::Close { trigger: CloseTrigger::Signal },
            ..intent
        };
        let verdict = admit(&account, &RiskState::default(), &plain, &TradingConfig::default());
        assert_eq!(verdict, Admission::Allow { quantity: Decimal::new(50, 0) });
    }

    #[test]
    fn day_trade_limit_rejects_same_day_close() {
        let mut account = account_30k();
        account.positions.push(Position::new(
            "AAPL",
            Decimal::new(10, 0),
            Decimal::new(100, 0),
        ));
        let state = RiskState {
            day_trades_today: 3,
            ..Default::default()
        };

        let intent = close_intent(
            "AAPL",
            Decimal::new(10, 0),
            Decimal::new(100, 0),
            IntentKind::Close { trigger: CloseTrigger::Signal },
        );
        let verdict = admit(&account, &state, &intent, &TradingConfig::default());
        assert_eq!(verdict, Admission::Reject { reason: RejectReason::DayTradeLimit });
    }

    #[test]
    fn kelly_mode_retargets_quantity() {
        let account = account_30k();
        let mut intent = open_intent("AAPL", 1, 10);
        intent.kelly_fraction = Some(Decimal::new(10, 2)); // 10% edge

        let verdict = admit(&account, &RiskState::default(), &intent, &TradingConfig::default());
        match verdict {
            // 0.10 * 30000 = $3,000 => 300 shares at $10.
            Admission::Allow { quantity } => assert_eq!(quantity, Decimal::new(300, 0)),
            other => panic!("expected allow, got {other:?}"),
        }
    }

    #[test]
    fn kelly_disabled_uses_requested_quantity() {
        let account = account_30k();
        let mut intent = open_intent("AAPL", 5, 10);
        intent.kelly_fraction = Some(Decimal::new(10, 2));

        let trading = TradingConfig {
            kelly_enabled: false,
            ..Default::default()
        };
        let verdict = admit(&account, &RiskState::default(), &intent, &trading);
        assert_eq!(verdict, Admission::Allow { quantity: Decimal::new(5, 0) });
    }
}
