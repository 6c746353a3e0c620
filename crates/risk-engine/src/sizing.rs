//! Position sizing under the optional Kelly-criterion mode.
//!
//! The edge estimate (`kelly_fraction`) comes from the strategy collaborator;
//! this module only clamps it into the account's risk budget. It never
//! computes odds.

use rust_decimal::Decimal;
use systemx_core::AccountRiskConfig;

/// Hard cap on the applied Kelly fraction, independent of the collaborator's
/// estimate. Full-Kelly sizing is too volatile for unattended operation.
const KELLY_FRACTION_CAP: Decimal = Decimal::from_parts(25, 0, 0, false, 2); // 0.25

/// Whole-share quantity targeted by Kelly sizing, clamped to
/// `[0, max_position_size x equity]`.
pub fn kelly_target_quantity(
    equity: Decimal,
    price: Decimal,
    kelly_fraction: Decimal,
    risk: &AccountRiskConfig,
) -> Decimal {
    if price <= Decimal::ZERO || equity <= Decimal::ZERO {
        return Decimal::ZERO;
    }

    let fraction = kelly_fraction.clamp(Decimal::ZERO, KELLY_FRACTION_CAP);

    // Without aggressive sizing the multiplier can only shrink positions.
    let multiplier = if risk.aggressive_sizing_enabled {
        risk.risk_multiplier
    } else {
        risk.risk_multiplier.min(Decimal::ONE)
    };

    let target_notional =
        (multiplier * fraction * equity).clamp(Decimal::ZERO, risk.max_position_size * equity);

    (target_notional / price).floor()
}
