//! Rolling performance bookkeeping behind the `/metrics` surface.
//!
//! The buffer keeps a bounded window of daily equity marks and recent cycle
//! results. Risk statistics are recomputed from the window on demand; they
//! are observational only and never feed back into admission decisions.

use std::collections::VecDeque;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use systemx_core::{CycleResult, StrategySummary};

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Statistics stay at zero until the window has enough samples to mean
/// anything.
const MIN_SAMPLES: usize = 30;

/// How many recent cycle results to retain for the monitoring surface.
const RECENT_CYCLES: usize = 64;

/// Annualized portfolio risk statistics over the rolling window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetrics {
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    /// 95% one-day value-at-risk, as a (negative) return fraction.
    pub var_95: f64,
    /// Worst peak-to-trough equity drawdown, as a positive fraction.
    pub max_drawdown: f64,
}

/// Bounded history of cycles and equity marks.
#[derive(Debug, Clone)]
pub struct MetricsBuffer {
    window: usize,
    last_equity: Option<f64>,
    equity_curve: VecDeque<f64>,
    daily_returns: VecDeque<f64>,
    recent_cycles: VecDeque<CycleResult>,
}

impl MetricsBuffer {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            last_equity: None,
            equity_curve: VecDeque::with_capacity(window + 1),
            daily_returns: VecDeque::with_capacity(window),
            recent_cycles: VecDeque::with_capacity(RECENT_CYCLES),
        }
    }

    pub fn record_cycle(&mut self, cycle: CycleResult) {
        if self.recent_cycles.len() == RECENT_CYCLES {
            self.recent_cycles.pop_front();
        }
        self.recent_cycles.push_back(cycle);
    }

    /// Mark total equity at the end of a trading cycle.
    pub fn record_equity(&mut self, total_equity: Decimal) {
        let equity = total_equity.to_f64().unwrap_or(0.0);

        if let Some(last) = self.last_equity {
            if last > 0.0 {
                if self.daily_returns.len() == self.window {
                    self.daily_returns.pop_front();
                }
                self.daily_returns.push_back((equity - last) / last);
            }
        }
        self.last_equity = Some(equity);

        if self.equity_curve.len() == self.window + 1 {
            self.equity_curve.pop_front();
        }
        self.equity_curve.push_back(equity);
    }

    pub fn last_cycle(&self) -> Option<&CycleResult> {
        self.recent_cycles.back()
    }

    /// Most recently reported backtest summaries, if any cycle produced them.
    pub fn recent_backtests(&self) -> Vec<StrategySummary> {
        self.recent_cycles
            .iter()
            .rev()
            .find(|c| !c.backtests.is_empty())
            .map(|c| c.backtests.clone())
            .unwrap_or_default()
    }

    pub fn sample_count(&self) -> usize {
        self.daily_returns.len()
    }

    pub fn risk_metrics(&self) -> RiskMetrics {
        if self.daily_returns.len() < MIN_SAMPLES {
            return RiskMetrics::default();
        }

        let returns: Vec<f64> = self.daily_returns.iter().copied().collect();
        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();

        let sharpe_ratio = if std > 0.0 {
            mean / std * TRADING_DAYS_PER_YEAR.sqrt()
        } else {
            0.0
        };

        // Sortino penalizes only downside deviation.
        let downside_var = returns
            .iter()
            .map(|r| r.min(0.0).powi(2))
            .sum::<f64>()
            / n;
        let downside_std = downside_var.sqrt();
        let sortino_ratio = if downside_std > 0.0 {
            mean / downside_std * TRADING_DAYS_PER_YEAR.sqrt()
        } else {
            0.0
        };

        RiskMetrics {
            sharpe_ratio,
            sortino_ratio,
            var_95: percentile(&returns, 0.05),
            max_drawdown: self.max_drawdown(),
        }
    }

    fn max_drawdown(&self) -> f64 {
        let mut peak = f64::MIN;
        let mut worst = 0.0f64;
        for &equity in &self.equity_curve {
            peak = peak.max(equity);
            if peak > 0.0 {
                let drawdown = (peak - equity) / peak;
                worst = worst.max(drawdown);
            }
        }
        worst
    }
}

/// Linear-interpolated percentile of an unsorted sample, `q` in [0, 1].
fn percentile(sample: &[f64], q: f64) -> f64 {
    if sample.is_empty() {
        return 0.0;
    }
    let mut sorted = sample.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let weight = rank - lo as f64;
    sorted[lo] * (1.0 - weight) + sorted[hi] * weight
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark_series(buffer: &mut MetricsBuffer, marks: &[i64]) {
        for &m in marks {
            buffer.record_equity(Decimal::new(m, 0));
        }
    }

    #[test]
    fn metrics_stay_zero_below_minimum_samples() {
        let mut buffer = MetricsBuffer::new(252);
        mark_series(&mut buffer, &[30_000, 30_100, 29_900, 30_050]);
        assert_eq!(buffer.risk_metrics(), RiskMetrics::default());
    }

    #[test]
    fn alternating_returns_produce_finite_statistics() {
        let mut buffer = MetricsBuffer::new(252);
        let mut equity = 30_000i64;
        buffer.record_equity(Decimal::new(equity, 0));
        for i in 0..60 {
            equity += if i % 2 == 0 { 300 } else { -150 };
            buffer.record_equity(Decimal::new(equity, 0));
        }

        let metrics = buffer.risk_metrics();
        assert!(metrics.sharpe_ratio > 0.0, "net-up series has positive Sharpe");
        assert!(metrics.sortino_ratio > metrics.sharpe_ratio);
        assert!(metrics.var_95 < 0.0, "5th percentile of mixed returns is a loss");
        assert!(metrics.max_drawdown > 0.0);
        assert!(metrics.max_drawdown < 0.02);
    }

    #[test]
    fn monotonic_equity_has_zero_drawdown_and_zero_sortino() {
        let mut buffer = MetricsBuffer::new(252);
        let mut equity = 30_000i64;
        for _ in 0..40 {
            buffer.record_equity(Decimal::new(equity, 0));
            equity += 100;
        }

        let metrics = buffer.risk_metrics();
        assert_eq!(metrics.max_drawdown, 0.0);
        // No losing days: downside deviation is zero and Sortino stays 0.
        assert_eq!(metrics.sortino_ratio, 0.0);
    }

    #[test]
    fn window_is_bounded() {
        let mut buffer = MetricsBuffer::new(10);
        for i in 0..100 {
            buffer.record_equity(Decimal::new(30_000 + i, 0));
        }
        assert_eq!(buffer.sample_count(), 10);
    }

    #[test]
    fn percentile_interpolates() {
        let sample: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let p5 = percentile(&sample, 0.05);
        assert!((p5 - 5.95).abs() < 1e-9);
        assert_eq!(percentile(&sample, 0.0), 1.0);
        assert_eq!(percentile(&sample, 1.0), 100.0);
    }
}
