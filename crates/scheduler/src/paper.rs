//! Paper collaborators: in-memory implementations of the adapter traits.
//!
//! Used by the binary when no live brokerage is wired in, and by tests. The
//! broker fills every admitted order instantly at the quoted price.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use systemx_core::config::TradingConfig;
use systemx_core::{
    Account, BacktestRunner, BreakerEvent, BrokerAdapter, Candidate, CandidateSource,
    CloseTrigger, CycleResult, IntentKind, OrderRecord, OrderSide, PersistenceAdapter, Position,
    Result, StrategyCollaborator, StrategySummary, TradeIntent,
};

/// Candidate quality floor, matching the screener's qualification bar.
const MIN_SCORE: Decimal = Decimal::from_parts(70, 0, 0, false, 0);
const MIN_CONFIDENCE: Decimal = Decimal::from_parts(75, 0, 0, false, 1);

/// Simulated brokerage: positions per account, instant fills at the quote.
pub struct PaperBroker {
    positions: Mutex<HashMap<String, Vec<Position>>>,
    prices: Mutex<HashMap<String, Decimal>>,
    default_price: Decimal,
    fills: AtomicU64,
}

impl Default for PaperBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl PaperBroker {
    pub fn new() -> Self {
        Self {
            positions: Mutex::new(HashMap::new()),
            prices: Mutex::new(HashMap::new()),
            default_price: Decimal::new(10, 0),
            fills: AtomicU64::new(0),
        }
    }

    pub fn with_prices(prices: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        let broker = Self::new();
        *broker.prices.try_lock().expect("fresh broker") = prices.into_iter().collect();
        broker
    }

    pub async fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().await.insert(symbol.to_string(), price);
    }

    pub fn fill_count(&self) -> u64 {
        self.fills.load(Ordering::SeqCst)
    }

    async fn quote(&self, symbol: &str) -> Decimal {
        self.prices
            .lock()
            .await
            .get(symbol)
            .copied()
            .unwrap_or(self.default_price)
    }
}

#[async_trait]
impl BrokerAdapter for PaperBroker {
    async fn get_positions(&self, account_id: &str) -> Result<Vec<Position>> {
        Ok(self
            .positions
            .lock()
            .await
            .get(account_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_prices(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>> {
        let prices = self.prices.lock().await;
        Ok(symbols
            .iter()
            .map(|s| (s.clone(), prices.get(s).copied().unwrap_or(self.default_price)))
            .collect())
    }

    async fn submit_order(
        &self,
        account_id: &str,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<Uuid> {
        let price = self.quote(symbol).await;
        let mut book = self.positions.lock().await;
        let positions = book.entry(account_id.to_string()).or_default();

        match side {
            OrderSide::Buy => {
                if let Some(position) = positions.iter_mut().find(|p| p.symbol == symbol) {
                    let combined = position.quantity + quantity;
                    if !combined.is_zero() {
                        position.entry_price =
                            (position.entry_price * position.quantity + price * quantity)
                                / combined;
                    }
                    position.quantity = combined;
                    position.current_price = price;
                } else {
                    positions.push(Position::new(symbol, quantity, price));
                }
            }
            OrderSide::Sell => {
                if let Some(position) = positions.iter_mut().find(|p| p.symbol == symbol) {
                    position.quantity -= quantity;
                    position.current_price = price;
                } else {
                    positions.push(Position::new(symbol, -quantity, price));
                }
            }
        }
        // Quantities are signed; only a flat book entry disappears.
        positions.retain(|p| !p.quantity.is_zero());

        self.fills.fetch_add(1, Ordering::SeqCst);
        Ok(Uuid::new_v4())
    }

    async fn cancel_order(&self, _order_id: Uuid) -> Result<()> {
        Ok(())
    }
}

/// Fixed candidate list.
pub struct StaticCandidates {
    candidates: Vec<Candidate>,
}

impl StaticCandidates {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self { candidates }
    }
}

#[async_trait]
impl CandidateSource for StaticCandidates {
    async fn get_qualified_candidates(&self) -> Result<Vec<Candidate>> {
        Ok(self.candidates.clone())
    }
}

/// Persistence that only writes structured logs, counting records for tests.
#[derive(Debug, Default)]
pub struct PaperPersistence {
    cycles: AtomicU64,
    orders: AtomicU64,
    breaker_events: AtomicU64,
}

impl PaperPersistence {
    pub fn cycle_count(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    pub fn order_count(&self) -> u64 {
        self.orders.load(Ordering::SeqCst)
    }

    pub fn breaker_event_count(&self) -> u64 {
        self.breaker_events.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PersistenceAdapter for PaperPersistence {
    async fn record_cycle(&self, cycle: &CycleResult) -> Result<()> {
        self.cycles.fetch_add(1, Ordering::SeqCst);
        info!(
            target: "systemx::audit",
            seq = cycle.seq,
            mode = %cycle.mode,
            filled = cycle.orders_filled(),
            "cycle recorded"
        );
        Ok(())
    }

    async fn record_order(&self, order: &OrderRecord) -> Result<()> {
        self.orders.fetch_add(1, Ordering::SeqCst);
        info!(
            target: "systemx::audit",
            order_id = %order.order_id,
            account_id = %order.account_id,
            symbol = %order.symbol,
            quantity = %order.quantity,
            "order recorded"
        );
        Ok(())
    }

    async fn record_circuit_breaker_event(&self, event: &BreakerEvent) -> Result<()> {
        self.breaker_events.fetch_add(1, Ordering::SeqCst);
        info!(
            target: "systemx::audit",
            account_id = %event.account_id,
            reason = ?event.reason,
            "circuit-breaker event recorded"
        );
        Ok(())
    }
}

/// Rule-based strategy: exits on the stop-loss/take-profit thresholds, opens
/// qualified candidates the account does not already hold.
pub struct ThresholdStrategy {
    trading: TradingConfig,
}

impl ThresholdStrategy {
    pub fn new(trading: TradingConfig) -> Self {
        Self { trading }
    }
}

#[async_trait]
impl StrategyCollaborator for ThresholdStrategy {
    async fn propose(
        &self,
        account: &Account,
        candidates: &[Candidate],
        prices: &HashMap<String, Decimal>,
    ) -> Result<Vec<TradeIntent>> {
        let mut intents = Vec::new();

        // Exits first: stop-loss and take-profit checks on every holding.
        for position in &account.positions {
            let price = prices
                .get(&position.symbol)
                .copied()
                .unwrap_or(position.current_price);
            if position.entry_price.is_zero() {
                continue;
            }
            let pnl_pct = (price - position.entry_price) / position.entry_price;

            let trigger = if pnl_pct <= -self.trading.stop_loss_pct {
                Some((CloseTrigger::StopLoss, "stop-loss"))
            } else if pnl_pct >= self.trading.take_profit_pct {
                Some((CloseTrigger::TakeProfit, "take-profit"))
            } else {
                None
            };

            if let Some((trigger, label)) = trigger {
                intents.push(TradeIntent {
                    symbol: position.symbol.clone(),
                    side: OrderSide::Sell,
                    quantity: position.quantity,
                    price,
                    kind: IntentKind::Close { trigger },
                    kelly_fraction: None,
                    reason: format!("{label} at {:.2}%", pnl_pct * Decimal::new(100, 0)),
                });
            }
        }

        // Entries: qualified candidates not already held.
        for candidate in candidates {
            if candidate.score < MIN_SCORE || candidate.confidence < MIN_CONFIDENCE {
                continue;
            }
            if account.position(&candidate.symbol).is_some() {
                continue;
            }
            let price = match prices.get(&candidate.symbol) {
                Some(p) if *p > Decimal::ZERO => *p,
                _ => continue,
            };

            let budget = account.risk.max_position_size * account.equity();
            let quantity = (budget / price).floor();
            if quantity < Decimal::ONE {
                continue;
            }

            intents.push(TradeIntent {
                symbol: candidate.symbol.clone(),
                side: OrderSide::Buy,
                quantity,
                price,
                kind: IntentKind::Open,
                // Confidence on a 0-10 scale maps to an edge fraction; the
                // risk engine clamps it.
                kelly_fraction: Some(candidate.confidence / Decimal::new(100, 0)),
                reason: format!(
                    "qualified candidate (score {}, confidence {})",
                    candidate.score, candidate.confidence
                ),
            });
        }

        Ok(intents)
    }
}

/// Backtester that reports a fixed set of strategy summaries.
pub struct StaticBacktester {
    summaries: Vec<StrategySummary>,
}

impl StaticBacktester {
    pub fn new(summaries: Vec<StrategySummary>) -> Self {
        Self { summaries }
    }
}

#[async_trait]
impl BacktestRunner for StaticBacktester {
    async fn run(&self, _candidates: &[Candidate]) -> Result<Vec<StrategySummary>> {
        Ok(self.summaries.clone())
    }
}
