//! The mode scheduler: the single task that owns all trading state.
//!
//! One strictly sequential loop asks the session oracle which mode applies,
//! runs a trading or backtesting cycle, publishes a snapshot, then sleeps
//! until the next cycle or an earlier wake-up (mode boundary, emergency
//! stop, shutdown). A cycle in flight always completes its current account
//! step; cancellation is cooperative between steps, never mid-order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use risk_engine::{admit, breaker, Admission};
use systemx_core::calendar::SessionOracle;
use systemx_core::config::SystemConfig;
use systemx_core::{
    AccountCycleReport, BacktestRunner, BreakerEvent, BrokerAdapter, Candidate, CandidateSource,
    CooldownNotifier, CycleResult, EmergencyStopRequest, IntentKind, Mode, NotificationAdapter,
    OrderRecord, PersistenceAdapter, Position, Result, RetryPolicy, Severity,
    StrategyCollaborator, TradeIntent, TripReason,
};

use crate::control::EmergencyStopHandle;
use crate::metrics::MetricsBuffer;
use crate::registry::AccountRegistry;
use crate::snapshot::{AccountMetrics, AdapterHealth, MetricsSnapshot, SystemStatus};

/// Fully-failed account cycles tolerated before the breaker trips on
/// systemic adapter failure.
const MAX_FAILED_CYCLES: u32 = 3;

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Starting,
    Running(Mode),
    Stopping,
    Stopped,
}

/// External collaborators wired in at startup.
pub struct Collaborators {
    pub broker: Arc<dyn BrokerAdapter>,
    pub candidates: Arc<dyn CandidateSource>,
    pub persistence: Arc<dyn PersistenceAdapter>,
    pub strategy: Arc<dyn StrategyCollaborator>,
    pub backtester: Arc<dyn BacktestRunner>,
    pub notifier: Arc<CooldownNotifier<Arc<dyn NotificationAdapter>>>,
}

/// Control handles given to the monitoring surface and the binary.
pub struct SchedulerHandle {
    pub snapshot: watch::Receiver<Arc<MetricsSnapshot>>,
    pub stop: EmergencyStopHandle,
    shutdown_tx: watch::Sender<bool>,
}

impl SchedulerHandle {
    /// Graceful shutdown: the current cycle completes, then the loop exits.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

pub struct Scheduler {
    config: Arc<SystemConfig>,
    oracle: Arc<dyn SessionOracle>,
    collab: Collaborators,
    registry: AccountRegistry,
    metrics: MetricsBuffer,
    retry: RetryPolicy,
    state: SchedulerState,
    seq: u64,
    started_at: chrono::DateTime<Utc>,
    session_date: Option<NaiveDate>,
    adapter_health: AdapterHealth,
    last_candidates: Vec<Candidate>,
    snapshot_tx: watch::Sender<Arc<MetricsSnapshot>>,
    stop_pending: Arc<AtomicBool>,
    stop_rx: mpsc::Receiver<EmergencyStopRequest>,
    stop_request: Option<EmergencyStopRequest>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        config: Arc<SystemConfig>,
        oracle: Arc<dyn SessionOracle>,
        collab: Collaborators,
    ) -> (Self, SchedulerHandle) {
        let started_at = Utc::now();
        let (snapshot_tx, snapshot_rx) =
            watch::channel(Arc::new(MetricsSnapshot::startup(started_at)));
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stop_pending = Arc::new(AtomicBool::new(false));

        let scheduler = Self {
            registry: AccountRegistry::from_config(&config),
            metrics: MetricsBuffer::new(config.monitoring.metrics_window),
            retry: RetryPolicy::with_timeout(Duration::from_secs(
                config.schedule.adapter_timeout_secs,
            )),
            state: SchedulerState::Starting,
            seq: 0,
            started_at,
            session_date: None,
            adapter_health: AdapterHealth::default(),
            last_candidates: Vec::new(),
            snapshot_tx,
            stop_pending: stop_pending.clone(),
            stop_rx,
            stop_request: None,
            shutdown_rx,
            config,
            oracle,
            collab,
        };
        let handle = SchedulerHandle {
            snapshot: scheduler.snapshot_tx.subscribe(),
            stop: EmergencyStopHandle::new(stop_pending, stop_tx),
            shutdown_tx,
        };
        (scheduler, handle)
    }

    /// Drive cycles until shutdown or emergency stop.
    pub async fn run(mut self) {
        info!(
            accounts = self.registry.len(),
            trading_interval_secs = self.config.schedule.trading_interval_secs,
            backtest_interval_secs = self.config.schedule.backtest_interval_secs,
            "Scheduler starting"
        );
        self.publish_snapshot();

        loop {
            if self.should_stop() {
                break;
            }

            let mode = self.select_mode();
            self.enter_mode(mode);

            let cycle = match mode {
                Mode::Trading => self.run_trading_cycle().await,
                Mode::Backtesting => self.run_backtest_cycle().await,
            };
            info!(
                seq = cycle.seq,
                mode = %cycle.mode,
                duration_ms = cycle.duration_ms,
                filled = cycle.orders_filled(),
                rejected = cycle.orders_rejected(),
                errors = cycle.error_count() + cycle.errors.len(),
                "Cycle complete"
            );

            self.persist_cycle(&cycle).await;
            self.metrics.record_cycle(cycle);
            self.publish_snapshot();

            if self.should_stop() {
                break;
            }
            self.sleep_until_next(mode).await;
        }

        self.halt().await;
    }

    fn should_stop(&self) -> bool {
        self.stop_pending.load(Ordering::SeqCst) || *self.shutdown_rx.borrow()
    }

    /// Oracle errors mean CLOSED: an unknown session state must never start
    /// a trading cycle.
    fn select_mode(&self) -> Mode {
        match self.oracle.is_market_open(Utc::now()) {
            Ok(true) => Mode::Trading,
            Ok(false) => Mode::Backtesting,
            Err(err) => {
                warn!(error = %err, "Session oracle failed; treating market as closed");
                Mode::Backtesting
            }
        }
    }

    fn enter_mode(&mut self, mode: Mode) {
        match self.state {
            SchedulerState::Running(current) if current == mode => {}
            SchedulerState::Running(current) => {
                info!(from = %current, to = %mode, "Mode transition");
                self.state = SchedulerState::Running(mode);
            }
            _ => {
                info!(%mode, "Scheduler running");
                self.state = SchedulerState::Running(mode);
            }
        }
    }

    async fn run_trading_cycle(&mut self) -> CycleResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        self.seq += 1;
        self.maybe_reset_session();

        let mut errors = Vec::new();
        match self.refresh_candidates().await {
            Ok(candidates) => self.last_candidates = candidates,
            Err(err) => errors.push(format!("candidates: {err}")),
        }

        let mut reports = Vec::with_capacity(self.registry.len());
        for idx in 0..self.registry.len() {
            if self.stop_pending.load(Ordering::SeqCst) {
                info!("Emergency stop pending; cancelling remaining account steps");
                break;
            }
            let report = self.process_account(idx).await;
            self.settle_account(idx, &report).await;
            reports.push(report);
        }

        let total_equity: Decimal = self.registry.iter().map(|m| m.account.equity()).sum();
        self.metrics.record_equity(total_equity);

        CycleResult {
            seq: self.seq,
            mode: Mode::Trading,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            accounts: reports,
            backtests: Vec::new(),
            errors,
        }
    }

    async fn run_backtest_cycle(&mut self) -> CycleResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        self.seq += 1;

        let mut errors = Vec::new();
        match self.refresh_candidates().await {
            Ok(candidates) => self.last_candidates = candidates,
            Err(err) => errors.push(format!("candidates: {err}")),
        }

        let backtester = Arc::clone(&self.collab.backtester);
        let candidates = self.last_candidates.clone();
        let backtests = match self
            .retry
            .call("backtester.run", || {
                let backtester = backtester.clone();
                let candidates = candidates.clone();
                async move { backtester.run(&candidates).await }
            })
            .await
        {
            Ok(summaries) => summaries,
            Err(err) => {
                warn!(error = %err, "Backtest run failed");
                errors.push(format!("backtest: {err}"));
                Vec::new()
            }
        };

        CycleResult {
            seq: self.seq,
            mode: Mode::Backtesting,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            accounts: Vec::new(),
            backtests,
            errors,
        }
    }

    /// One account's slice of a trading cycle. Every failure is recorded on
    /// the report; nothing here can abort the cycle for other accounts.
    async fn process_account(&mut self, idx: usize) -> AccountCycleReport {
        let account_id = self.registry.get(idx).account.id.clone();
        let mut report = AccountCycleReport::new(&account_id);
        let broker = Arc::clone(&self.collab.broker);

        // Refresh positions from the broker; it is authoritative.
        let positions = match self
            .retry
            .call("broker.get_positions", || {
                let broker = broker.clone();
                let account_id = account_id.clone();
                async move { broker.get_positions(&account_id).await }
            })
            .await
        {
            Ok(positions) => positions,
            Err(err) => {
                self.adapter_health.broker = false;
                warn!(account_id, error = %err, "Position refresh failed");
                report.errors.push(format!("positions: {err}"));
                return report;
            }
        };

        let mut symbols: Vec<String> = positions.iter().map(|p| p.symbol.clone()).collect();
        for candidate in &self.last_candidates {
            if !symbols.contains(&candidate.symbol) {
                symbols.push(candidate.symbol.clone());
            }
        }

        let prices: HashMap<String, Decimal> = if symbols.is_empty() {
            HashMap::new()
        } else {
            match self
                .retry
                .call("broker.get_prices", || {
                    let broker = broker.clone();
                    let symbols = symbols.clone();
                    async move { broker.get_prices(&symbols).await }
                })
                .await
            {
                Ok(prices) => prices,
                Err(err) => {
                    self.adapter_health.broker = false;
                    warn!(account_id, error = %err, "Price refresh failed");
                    report.errors.push(format!("prices: {err}"));
                    return report;
                }
            }
        };
        self.adapter_health.broker = true;

        {
            let managed = self.registry.get_mut(idx);
            managed.account.positions = positions;
            for position in managed.account.positions.iter_mut() {
                if let Some(price) = prices.get(&position.symbol) {
                    position.current_price = *price;
                }
            }
            if managed.risk.breaker.is_open() {
                report.breaker_open = true;
                return report;
            }
        }

        let account_view = self.registry.get(idx).account.clone();
        let strategy = Arc::clone(&self.collab.strategy);
        let candidates = self.last_candidates.clone();
        let intents = match self
            .retry
            .call("strategy.propose", || {
                let strategy = strategy.clone();
                let account = account_view.clone();
                let candidates = candidates.clone();
                let prices = prices.clone();
                async move { strategy.propose(&account, &candidates, &prices).await }
            })
            .await
        {
            Ok(intents) => intents,
            Err(err) => {
                warn!(account_id, error = %err, "Strategy collaborator failed");
                report.errors.push(format!("strategy: {err}"));
                return report;
            }
        };

        for intent in intents {
            if self.stop_pending.load(Ordering::SeqCst) {
                break;
            }

            let verdict = {
                let managed = self.registry.get(idx);
                admit(
                    &managed.account,
                    &managed.risk,
                    &intent,
                    &self.config.trading,
                )
            };
            match verdict {
                Admission::Reject { reason } => {
                    report.orders_rejected += 1;
                    info!(
                        account_id,
                        symbol = %intent.symbol,
                        %reason,
                        "Intent rejected by risk engine"
                    );
                }
                Admission::Allow { quantity } => {
                    report.orders_attempted += 1;
                    match self.submit_order(&account_id, &intent, quantity).await {
                        Ok(()) => report.orders_filled += 1,
                        Err(err) => {
                            self.adapter_health.broker = false;
                            warn!(
                                account_id,
                                symbol = %intent.symbol,
                                error = %err,
                                "Order submission failed"
                            );
                            report.errors.push(format!("submit {}: {err}", intent.symbol));
                        }
                    }
                }
            }
        }

        report
    }

    async fn submit_order(
        &mut self,
        account_id: &str,
        intent: &TradeIntent,
        quantity: Decimal,
    ) -> Result<()> {
        let broker = Arc::clone(&self.collab.broker);
        let order_id = self
            .retry
            .call("broker.submit_order", || {
                let broker = broker.clone();
                let account_id = account_id.to_string();
                let symbol = intent.symbol.clone();
                let side = intent.side;
                async move { broker.submit_order(&account_id, &symbol, side, quantity).await }
            })
            .await?;

        info!(
            account_id,
            symbol = %intent.symbol,
            side = ?intent.side,
            %quantity,
            price = %intent.price,
            %order_id,
            reason = %intent.reason,
            "Order filled"
        );

        let record = OrderRecord {
            order_id,
            account_id: account_id.to_string(),
            symbol: intent.symbol.clone(),
            side: intent.side,
            quantity,
            price: intent.price,
            reason: intent.reason.clone(),
            submitted_at: Utc::now(),
        };

        self.apply_fill(account_id, intent, quantity);

        // The audit trail is best effort; a persistence outage never blocks
        // order flow.
        if let Err(err) = self.collab.persistence.record_order(&record).await {
            self.adapter_health.persistence = false;
            warn!(error = %err, order_id = %record.order_id, "Failed to persist order");
        }
        Ok(())
    }

    /// Apply a confirmed fill to the local books.
    fn apply_fill(&mut self, account_id: &str, intent: &TradeIntent, quantity: Decimal) {
        let today = Utc::now().date_naive();
        let idx = match (0..self.registry.len())
            .find(|&i| self.registry.get(i).account.id == account_id)
        {
            Some(idx) => idx,
            None => return,
        };
        let managed = self.registry.get_mut(idx);

        match &intent.kind {
            IntentKind::Open | IntentKind::Resize => {
                managed.account.cash -= quantity * intent.price;
                if let Some(position) = managed.account.position_mut(&intent.symbol) {
                    let combined = position.quantity + quantity;
                    if !combined.is_zero() {
                        position.entry_price = (position.entry_price * position.quantity
                            + intent.price * quantity)
                            / combined;
                    }
                    position.quantity = combined;
                    position.current_price = intent.price;
                } else {
                    managed
                        .account
                        .positions
                        .push(Position::new(intent.symbol.clone(), quantity, intent.price));
                }
            }
            IntentKind::Close { .. } => {
                let mut settled = None;
                if let Some(position) = managed.account.position_mut(&intent.symbol) {
                    let short = position.quantity < Decimal::ZERO;
                    let closed = quantity.abs().min(position.quantity.abs());
                    let realized = if short {
                        (position.entry_price - intent.price) * closed
                    } else {
                        (intent.price - position.entry_price) * closed
                    };
                    let day_trade = position.opened_at.date_naive() == today;
                    // Move the signed quantity toward zero, never past it.
                    position.quantity += if short { closed } else { -closed };
                    position.current_price = intent.price;
                    let emptied = position.quantity.is_zero();
                    settled = Some((short, closed, realized, day_trade, emptied));
                }
                if let Some((short, closed, realized, day_trade, emptied)) = settled {
                    // Covering a short spends cash; selling a long raises it.
                    if short {
                        managed.account.cash -= closed * intent.price;
                    } else {
                        managed.account.cash += closed * intent.price;
                    }
                    if emptied {
                        managed.account.remove_position(&intent.symbol);
                    }
                    managed.risk.record_trade(realized, day_trade);
                }
            }
        }
    }

    /// Post-step bookkeeping: adapter-failure escalation and circuit-breaker
    /// threshold evaluation for one account.
    async fn settle_account(&mut self, idx: usize, report: &AccountCycleReport) {
        let tripped = {
            let risk_management = self.config.risk_management.clone();
            let managed = self.registry.get_mut(idx);
            if report.fully_failed() {
                managed.failed_cycles += 1;
                warn!(
                    account_id = %managed.account.id,
                    failed_cycles = managed.failed_cycles,
                    "Account cycle fully failed"
                );
            } else {
                managed.failed_cycles = 0;
            }

            let mut reason = None;
            if managed.failed_cycles >= MAX_FAILED_CYCLES && !managed.risk.breaker.is_open() {
                reason = Some(TripReason::AdapterFailures);
            } else if let Some(threshold) = breaker::evaluate(
                &managed.risk,
                managed.account.equity(),
                &managed.account.risk,
                &risk_management,
            ) {
                reason = Some(threshold);
            }

            reason.and_then(|reason| {
                if breaker::trip(&mut managed.risk, &managed.account.id, reason.clone()) {
                    Some(BreakerEvent {
                        account_id: managed.account.id.clone(),
                        reason,
                        tripped_at: Utc::now(),
                        daily_realized_pnl: managed.risk.daily_realized_pnl,
                        consecutive_losses: managed.risk.consecutive_losses,
                    })
                } else {
                    None
                }
            })
        };

        if let Some(event) = tripped {
            self.record_breaker_event(&event).await;
            let key = format!("breaker.{}", event.account_id);
            let message = format!(
                "Circuit breaker tripped for {}: {:?} (daily P&L {}, {} consecutive losses)",
                event.account_id, event.reason, event.daily_realized_pnl, event.consecutive_losses
            );
            // Risk-limit breaches page at full severity, never debounced.
            self.notify(&key, Severity::Critical, &message).await;
        }
    }

    async fn record_breaker_event(&mut self, event: &BreakerEvent) {
        if let Err(err) = self.collab.persistence.record_circuit_breaker_event(event).await {
            self.adapter_health.persistence = false;
            warn!(error = %err, "Failed to persist circuit-breaker event");
        }
    }

    async fn refresh_candidates(&mut self) -> Result<Vec<Candidate>> {
        let source = Arc::clone(&self.collab.candidates);
        let result = self
            .retry
            .call("candidates.get_qualified", || {
                let source = source.clone();
                async move { source.get_qualified_candidates().await }
            })
            .await;
        self.adapter_health.candidates = result.is_ok();
        result
    }

    async fn persist_cycle(&mut self, cycle: &CycleResult) {
        match self.collab.persistence.record_cycle(cycle).await {
            Ok(()) => self.adapter_health.persistence = true,
            Err(err) => {
                self.adapter_health.persistence = false;
                warn!(error = %err, seq = cycle.seq, "Failed to persist cycle result");
            }
        }
    }

    async fn notify(&mut self, key: &str, severity: Severity, message: &str) {
        match self.collab.notifier.notify_keyed(key, severity, message).await {
            Ok(()) => self.adapter_health.notifications = true,
            Err(err) => {
                self.adapter_health.notifications = false;
                warn!(error = %err, "Notification delivery failed");
            }
        }
    }

    /// Risk counters and breaker latches reset at the first cycle of each
    /// new calendar day.
    fn maybe_reset_session(&mut self) {
        let today = Utc::now().date_naive();
        if self.session_date == Some(today) {
            return;
        }
        if self.session_date.is_some() {
            for managed in self.registry.iter_mut() {
                managed.risk.reset_session();
                managed.failed_cycles = 0;
            }
            info!("New trading session; per-account risk state reset");
        }
        self.session_date = Some(today);
    }

    /// Sleep until the next cycle, waking early for shutdown, emergency
    /// stop, or a session-boundary flip. Heartbeat snapshots keep uptime and
    /// status fresh for the monitoring surface during long waits.
    async fn sleep_until_next(&mut self, mode: Mode) {
        let interval = match mode {
            Mode::Trading => self.config.schedule.trading_interval_secs,
            Mode::Backtesting => self.config.schedule.backtest_interval_secs,
        };
        let heartbeat = Duration::from_secs(self.config.schedule.health_check_interval_secs.max(1));
        let deadline = Instant::now() + Duration::from_secs(interval);

        loop {
            if self.should_stop() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            let chunk = (deadline - now).min(heartbeat);

            tokio::select! {
                _ = tokio::time::sleep(chunk) => {}
                _ = self.shutdown_rx.changed() => return,
                request = self.stop_rx.recv() => {
                    self.stop_request = request;
                    return;
                }
            }

            if self.select_mode() != mode {
                info!("Session boundary during wait; starting next cycle early");
                return;
            }
            self.publish_snapshot();
        }
    }

    /// Final transition. An emergency stop latches every breaker and pages
    /// the operator; a graceful shutdown just drains and exits.
    async fn halt(&mut self) {
        self.state = SchedulerState::Stopping;

        if self.stop_pending.load(Ordering::SeqCst) {
            let request = self
                .stop_request
                .take()
                .or_else(|| self.stop_rx.try_recv().ok());
            let (reason, actor) = request
                .map(|r| (r.reason, format!("{:?}", r.actor)))
                .unwrap_or_else(|| ("unspecified".to_string(), "unknown".to_string()));

            error!(reason = %reason, actor = %actor, "EMERGENCY STOP - halting all accounts");

            for idx in 0..self.registry.len() {
                let event = {
                    let managed = self.registry.get_mut(idx);
                    if breaker::trip(
                        &mut managed.risk,
                        &managed.account.id,
                        TripReason::EmergencyStop,
                    ) {
                        Some(BreakerEvent {
                            account_id: managed.account.id.clone(),
                            reason: TripReason::EmergencyStop,
                            tripped_at: Utc::now(),
                            daily_realized_pnl: managed.risk.daily_realized_pnl,
                            consecutive_losses: managed.risk.consecutive_losses,
                        })
                    } else {
                        None
                    }
                };
                if let Some(event) = event {
                    self.record_breaker_event(&event).await;
                }
            }

            let message = format!("EMERGENCY STOP executed ({actor}): {reason}");
            self.notify("emergency_stop", Severity::Critical, &message).await;
        } else {
            info!("Scheduler shutting down");
        }

        self.state = SchedulerState::Stopped;
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        let _ = self.snapshot_tx.send(Arc::new(self.build_snapshot()));
    }

    fn build_snapshot(&self) -> MetricsSnapshot {
        let emergency = self.stop_pending.load(Ordering::SeqCst);
        let any_breaker_open = self.registry.iter().any(|m| m.risk.breaker.is_open());
        let status = match self.state {
            SchedulerState::Starting => SystemStatus::Starting,
            SchedulerState::Running(_) => {
                if !self.adapter_health.all_connected() || any_breaker_open {
                    SystemStatus::Degraded
                } else {
                    SystemStatus::Operational
                }
            }
            SchedulerState::Stopping | SchedulerState::Stopped => {
                if emergency {
                    SystemStatus::EmergencyStopped
                } else {
                    SystemStatus::Stopped
                }
            }
        };
        let mode = match self.state {
            SchedulerState::Running(mode) => Some(mode),
            _ => None,
        };
        let last_cycle = self.metrics.last_cycle();

        MetricsSnapshot {
            status,
            mode,
            cycle_seq: self.seq,
            started_at: self.started_at,
            generated_at: Utc::now(),
            last_cycle_at: last_cycle.map(|c| c.started_at),
            last_cycle_duration_ms: last_cycle.map(|c| c.duration_ms),
            emergency_stop_pending: emergency,
            accounts: self
                .registry
                .iter()
                .map(AccountMetrics::from_managed)
                .collect(),
            risk: self.metrics.risk_metrics(),
            adapters: self.adapter_health,
            qualified_candidates: self.last_candidates.clone(),
            recent_backtests: self.metrics.recent_backtests(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;
    use systemx_core::{
        BreakerStatus, CloseTrigger, Error, MarketCalendar, OrderSide, StopActor, StrategySummary,
    };
    use uuid::Uuid;

    use crate::paper::{PaperBroker, PaperPersistence, StaticBacktester, StaticCandidates, ThresholdStrategy};

    struct FailingBroker;

    #[async_trait]
    impl BrokerAdapter for FailingBroker {
        async fn get_positions(&self, _account_id: &str) -> Result<Vec<Position>> {
            Err(Error::Broker("connection refused".to_string()))
        }

        async fn get_prices(
            &self,
            _symbols: &[String],
        ) -> Result<HashMap<String, Decimal>> {
            Err(Error::Broker("connection refused".to_string()))
        }

        async fn submit_order(
            &self,
            _account_id: &str,
            _symbol: &str,
            _side: systemx_core::OrderSide,
            _quantity: Decimal,
        ) -> Result<Uuid> {
            Err(Error::Broker("connection refused".to_string()))
        }

        async fn cancel_order(&self, _order_id: Uuid) -> Result<()> {
            Err(Error::Broker("connection refused".to_string()))
        }
    }

    struct CountingNotifier(Arc<AtomicU32>);

    #[async_trait]
    impl NotificationAdapter for CountingNotifier {
        async fn notify(&self, _severity: Severity, _message: &str) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_retry_config() -> Arc<SystemConfig> {
        let mut config = SystemConfig::test_config();
        config.schedule.adapter_timeout_secs = 1;
        Arc::new(config)
    }

    fn notifier(
        counter: Arc<AtomicU32>,
    ) -> Arc<CooldownNotifier<Arc<dyn NotificationAdapter>>> {
        let inner: Arc<dyn NotificationAdapter> = Arc::new(CountingNotifier(counter));
        Arc::new(CooldownNotifier::new(inner, Duration::from_secs(900)))
    }

    fn paper_collaborators(
        broker: Arc<dyn BrokerAdapter>,
        counter: Arc<AtomicU32>,
        config: &SystemConfig,
    ) -> Collaborators {
        Collaborators {
            broker,
            candidates: Arc::new(StaticCandidates::new(vec![Candidate {
                symbol: "AAPL".to_string(),
                score: Decimal::new(85, 0),
                confidence: Decimal::new(85, 1),
            }])),
            persistence: Arc::new(PaperPersistence::default()),
            strategy: Arc::new(ThresholdStrategy::new(config.trading.clone())),
            backtester: Arc::new(StaticBacktester::new(vec![StrategySummary {
                strategy: "momentum".to_string(),
                total_return_pct: Decimal::new(42, 1),
                trades: 12,
            }])),
            notifier: notifier(counter),
        }
    }

    #[tokio::test]
    async fn trading_cycle_fills_candidate_orders() {
        let config = fast_retry_config();
        let broker = Arc::new(PaperBroker::with_prices([(
            "AAPL".to_string(),
            Decimal::new(100, 0),
        )]));
        let counter = Arc::new(AtomicU32::new(0));
        let collab = paper_collaborators(broker.clone(), counter, &config);
        let (mut scheduler, _handle) =
            Scheduler::new(config, Arc::new(MarketCalendar::new()), collab);

        let cycle = scheduler.run_trading_cycle().await;
        assert_eq!(cycle.orders_filled(), 1);
        assert_eq!(cycle.error_count(), 0);

        // The fill lands in the local books and at the broker.
        let managed = scheduler.registry.find("PRIMARY_30K").unwrap();
        let position = managed.account.position("AAPL").unwrap();
        assert!(position.quantity > Decimal::ZERO);
        assert!(managed.account.cash < Decimal::new(30_000, 0));
        assert_eq!(broker.fill_count(), 1);
    }

    #[tokio::test]
    async fn three_failed_cycles_trip_the_breaker_once() {
        let config = fast_retry_config();
        let counter = Arc::new(AtomicU32::new(0));
        let collab = paper_collaborators(Arc::new(FailingBroker), counter.clone(), &config);
        let (mut scheduler, _handle) =
            Scheduler::new(config, Arc::new(MarketCalendar::new()), collab);

        for _ in 0..2 {
            let cycle = scheduler.run_trading_cycle().await;
            assert!(cycle.accounts[0].fully_failed());
        }
        assert!(!scheduler.registry.get(0).risk.breaker.is_open());

        scheduler.run_trading_cycle().await;
        match &scheduler.registry.get(0).risk.breaker {
            BreakerStatus::Open { reason, .. } => {
                assert_eq!(*reason, TripReason::AdapterFailures);
            }
            BreakerStatus::Closed => panic!("breaker should be open"),
        }

        // Further failed cycles do not re-trip or re-notify.
        scheduler.run_trading_cycle().await;
        scheduler.run_trading_cycle().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn breaker_trip_pages_at_critical_severity() {
        struct Recorder(Arc<std::sync::Mutex<Vec<Severity>>>);

        #[async_trait]
        impl NotificationAdapter for Recorder {
            async fn notify(&self, severity: Severity, _message: &str) -> Result<()> {
                self.0.lock().unwrap().push(severity);
                Ok(())
            }
        }

        let config = fast_retry_config();
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let inner: Arc<dyn NotificationAdapter> = Arc::new(Recorder(seen.clone()));
        let mut collab =
            paper_collaborators(Arc::new(FailingBroker), Arc::new(AtomicU32::new(0)), &config);
        collab.notifier = Arc::new(CooldownNotifier::new(inner, Duration::from_secs(900)));
        let (mut scheduler, _handle) =
            Scheduler::new(config, Arc::new(MarketCalendar::new()), collab);

        for _ in 0..3 {
            scheduler.run_trading_cycle().await;
        }

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], Severity::Critical);
    }

    #[tokio::test]
    async fn covering_a_short_spends_cash_and_books_the_signed_pnl() {
        let config = fast_retry_config();
        let counter = Arc::new(AtomicU32::new(0));
        let collab = paper_collaborators(Arc::new(PaperBroker::new()), counter, &config);
        let (mut scheduler, _handle) =
            Scheduler::new(config, Arc::new(MarketCalendar::new()), collab);

        {
            let managed = scheduler.registry.get_mut(0);
            managed.account.positions.push(Position::new(
                "GME",
                Decimal::new(-50, 0),
                Decimal::new(40, 0),
            ));
        }
        let cash_before = scheduler.registry.get(0).account.cash;

        let intent = TradeIntent {
            symbol: "GME".to_string(),
            side: OrderSide::Buy,
            quantity: Decimal::new(50, 0),
            price: Decimal::new(35, 0),
            kind: IntentKind::Close {
                trigger: CloseTrigger::StopLoss,
            },
            kelly_fraction: None,
            reason: "buy to cover".to_string(),
        };
        scheduler.apply_fill("PRIMARY_30K", &intent, Decimal::new(50, 0));

        let managed = scheduler.registry.find("PRIMARY_30K").unwrap();
        // The short is flat, not doubled down or zeroed at the wrong sign.
        assert!(managed.account.position("GME").is_none());
        // Buying back 50 shares at $35 spends cash.
        assert_eq!(managed.account.cash, cash_before - Decimal::new(1_750, 0));
        // Entered at $40, covered at $35: a $250 gain.
        assert_eq!(managed.risk.daily_realized_pnl, Decimal::new(250, 0));
        assert_eq!(managed.risk.consecutive_losses, 0);
    }

    #[tokio::test]
    async fn emergency_stop_is_idempotent_and_halts_every_account() {
        let config = fast_retry_config();
        let broker = Arc::new(PaperBroker::new());
        let counter = Arc::new(AtomicU32::new(0));
        let collab = paper_collaborators(broker, counter.clone(), &config);
        let (mut scheduler, handle) =
            Scheduler::new(config, Arc::new(MarketCalendar::new()), collab);

        assert!(handle.stop.trigger("manual halt", StopActor::Dashboard));
        assert!(!handle.stop.trigger("double press", StopActor::Dashboard));
        assert!(scheduler.should_stop());

        scheduler.halt().await;
        for managed in scheduler.registry.iter() {
            match &managed.risk.breaker {
                BreakerStatus::Open { reason, .. } => {
                    assert_eq!(*reason, TripReason::EmergencyStop);
                }
                BreakerStatus::Closed => panic!("account not halted"),
            }
        }
        // Exactly one operator page despite the double press.
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        let snapshot = handle.snapshot.borrow().clone();
        assert_eq!(snapshot.status, SystemStatus::EmergencyStopped);
        assert!(snapshot.emergency_stop_pending);
    }

    #[tokio::test]
    async fn backtest_cycle_reports_summaries() {
        let config = fast_retry_config();
        let counter = Arc::new(AtomicU32::new(0));
        let collab = paper_collaborators(Arc::new(PaperBroker::new()), counter, &config);
        let (mut scheduler, _handle) =
            Scheduler::new(config, Arc::new(MarketCalendar::new()), collab);

        let cycle = scheduler.run_backtest_cycle().await;
        assert_eq!(cycle.mode, Mode::Backtesting);
        assert_eq!(cycle.backtests.len(), 1);
        assert!(cycle.accounts.is_empty());
        assert!(cycle.errors.is_empty());
    }

    #[tokio::test]
    async fn snapshot_reflects_cycle_outcome() {
        let config = fast_retry_config();
        let broker = Arc::new(PaperBroker::with_prices([(
            "AAPL".to_string(),
            Decimal::new(100, 0),
        )]));
        let counter = Arc::new(AtomicU32::new(0));
        let collab = paper_collaborators(broker, counter, &config);
        let (mut scheduler, handle) =
            Scheduler::new(config, Arc::new(MarketCalendar::new()), collab);

        scheduler.enter_mode(Mode::Trading);
        let cycle = scheduler.run_trading_cycle().await;
        scheduler.metrics.record_cycle(cycle);
        scheduler.publish_snapshot();

        let snapshot = handle.snapshot.borrow().clone();
        assert_eq!(snapshot.status, SystemStatus::Operational);
        assert_eq!(snapshot.mode, Some(Mode::Trading));
        assert_eq!(snapshot.cycle_seq, 1);
        assert_eq!(snapshot.accounts.len(), 1);
        assert_eq!(snapshot.qualified_candidates.len(), 1);

        // Cash plus exposure always reconstructs equity: no torn state.
        let account = &snapshot.accounts[0];
        assert_eq!(account.account_id, "PRIMARY_30K");
        assert!(account.equity > Decimal::ZERO);
        assert_eq!(account.open_positions, 1);
    }
}
