//! Integration tests driving the full scheduler against paper adapters.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

use risk_engine::{admit, Admission};
use scheduler::paper::{
    PaperBroker, PaperPersistence, StaticBacktester, StaticCandidates, ThresholdStrategy,
};
use scheduler::{Collaborators, Scheduler, SchedulerHandle, SystemStatus};
use systemx_core::calendar::SessionOracle;
use systemx_core::config::SystemConfig;
use systemx_core::{
    Account, AccountRiskConfig, BreakerStatus, Candidate, CooldownNotifier, IntentKind,
    NotificationAdapter, OrderSide, Position, Result, RiskState, Severity, StopActor,
    StrategySummary, TradeIntent, TripReason,
};

/// Oracle whose answer flips under test control.
struct FlipOracle {
    open: AtomicBool,
}

impl FlipOracle {
    fn new(open: bool) -> Arc<Self> {
        Arc::new(Self {
            open: AtomicBool::new(open),
        })
    }

    fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }
}

impl SessionOracle for FlipOracle {
    fn is_market_open(&self, _now: DateTime<Utc>) -> Result<bool> {
        Ok(self.open.load(Ordering::SeqCst))
    }

    fn next_boundary(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        Ok(now + chrono::Duration::seconds(1))
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

struct Harness {
    handle: SchedulerHandle,
    task: tokio::task::JoinHandle<()>,
    persistence: Arc<PaperPersistence>,
    notifications: Arc<AtomicU32>,
}

fn spawn_scheduler(oracle: Arc<FlipOracle>, candidates: Vec<Candidate>) -> Harness {
    let config = Arc::new(SystemConfig::test_config());
    let persistence = Arc::new(PaperPersistence::default());
    let notifications = Arc::new(AtomicU32::new(0));
    let inner: Arc<dyn NotificationAdapter> =
        Arc::new(CountingNotifier(notifications.clone()));

    let collab = Collaborators {
        broker: Arc::new(PaperBroker::with_prices([(
            "AAPL".to_string(),
            Decimal::new(100, 0),
        )])),
        candidates: Arc::new(StaticCandidates::new(candidates)),
        persistence: persistence.clone(),
        strategy: Arc::new(ThresholdStrategy::new(config.trading.clone())),
        backtester: Arc::new(StaticBacktester::new(vec![StrategySummary {
            strategy: "momentum".to_string(),
            total_return_pct: Decimal::new(31, 1),
            trades: 9,
        }])),
        notifier: Arc::new(CooldownNotifier::new(inner, Duration::from_secs(900))),
    };

    let (sched, handle) = Scheduler::new(config, oracle, collab);
    let task = tokio::spawn(sched.run());
    Harness {
        handle,
        task,
        persistence,
        notifications,
    }
}

/// Wait until the published snapshot satisfies a predicate.
async fn wait_for_snapshot<F>(handle: &SchedulerHandle, predicate: F)
where
    F: Fn(&scheduler::MetricsSnapshot) -> bool,
{
    let mut rx = handle.snapshot.clone();
    tokio::time::timeout(Duration::from_secs(30), async {
        loop {
            if predicate(&rx.borrow()) {
                return;
            }
            rx.changed().await.expect("scheduler dropped snapshot channel");
        }
    })
    .await
    .expect("snapshot condition not reached in time");
}

#[tokio::test]
async fn session_flip_switches_modes_without_dropping_a_cycle() {
    let oracle = FlipOracle::new(true);
    let harness = spawn_scheduler(
        oracle.clone(),
        vec![Candidate {
            symbol: "AAPL".to_string(),
            score: Decimal::new(85, 0),
            confidence: Decimal::new(85, 1),
        }],
    );

    // A trading cycle completes and fills the qualified candidate.
    wait_for_snapshot(&harness.handle, |s| {
        s.cycle_seq >= 1 && s.accounts.iter().any(|a| a.open_positions > 0)
    })
    .await;

    // Market closes mid-run: the next cycles are backtests.
    oracle.set_open(false);
    wait_for_snapshot(&harness.handle, |s| !s.recent_backtests.is_empty()).await;

    harness.handle.shutdown();
    tokio::time::timeout(Duration::from_secs(10), harness.task)
        .await
        .expect("scheduler did not drain")
        .unwrap();

    // Every cycle that ran was recorded: none dropped across the switch.
    let snapshot = harness.handle.snapshot.borrow().clone();
    assert_eq!(snapshot.status, SystemStatus::Stopped);
    assert_eq!(harness.persistence.cycle_count(), snapshot.cycle_seq);
    assert!(snapshot.cycle_seq >= 2);
}

#[tokio::test]
async fn emergency_stop_halts_every_account_exactly_once() {
    let oracle = FlipOracle::new(true);
    let harness = spawn_scheduler(oracle, Vec::new());

    wait_for_snapshot(&harness.handle, |s| s.cycle_seq >= 1).await;

    assert!(harness.handle.stop.trigger("integration drill", StopActor::Operator));
    assert!(!harness.handle.stop.trigger("double press", StopActor::Dashboard));

    tokio::time::timeout(Duration::from_secs(10), harness.task)
        .await
        .expect("scheduler did not halt")
        .unwrap();

    let snapshot = harness.handle.snapshot.borrow().clone();
    assert_eq!(snapshot.status, SystemStatus::EmergencyStopped);
    assert!(snapshot.emergency_stop_pending);
    for account in &snapshot.accounts {
        match &account.breaker {
            BreakerStatus::Open { reason, .. } => {
                assert_eq!(*reason, TripReason::EmergencyStop)
            }
            BreakerStatus::Closed => panic!("account {} not halted", account.account_id),
        }
    }
    // One breaker event per account, one operator page in total.
    assert_eq!(
        harness.persistence.breaker_event_count(),
        snapshot.accounts.len() as u64
    );
    assert_eq!(harness.notifications.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn snapshots_are_never_torn() {
    let oracle = FlipOracle::new(true);
    let harness = spawn_scheduler(
        oracle,
        vec![Candidate {
            symbol: "AAPL".to_string(),
            score: Decimal::new(85, 0),
            confidence: Decimal::new(85, 1),
        }],
    );

    wait_for_snapshot(&harness.handle, |s| s.cycle_seq >= 1).await;

    // Concurrent reads during live cycles: each observed snapshot must be
    // internally consistent and sequence numbers must never go backwards.
    let mut rx = harness.handle.snapshot.clone();
    let mut last_seq = 0;
    for _ in 0..50 {
        let snapshot = rx.borrow().clone();
        assert!(snapshot.cycle_seq >= last_seq, "sequence went backwards");
        last_seq = snapshot.cycle_seq;

        for account in &snapshot.accounts {
            let exposure = account.equity - account.cash;
            assert!(
                exposure >= Decimal::ZERO,
                "books torn: cash exceeds equity for {}",
                account.account_id
            );
            if account.open_positions == 0 {
                assert_eq!(exposure, Decimal::ZERO);
            } else {
                assert!(exposure > Decimal::ZERO);
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    harness.handle.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(10), harness.task).await;
}

#[tokio::test]
async fn fuzzed_admissions_never_breach_the_exposure_cap() {
    let config = SystemConfig::test_config();
    let trading = config.trading.clone();
    let mut rng = StdRng::seed_from_u64(7);

    let mut account = Account::new(
        "FUZZ",
        Decimal::new(30_000, 0),
        AccountRiskConfig::default(),
    );
    let state = RiskState::default();

    for i in 0..1_000 {
        let price = Decimal::new(rng.gen_range(1_00..500_00), 2);
        let quantity = Decimal::new(rng.gen_range(1..5_000), 0);
        let kelly = if rng.gen_bool(0.5) {
            Some(Decimal::new(rng.gen_range(0..60), 2))
        } else {
            None
        };
        let intent = TradeIntent {
            symbol: format!("SYM{i}"),
            side: OrderSide::Buy,
            quantity,
            price,
            kind: IntentKind::Open,
            kelly_fraction: kelly,
            reason: "fuzz".to_string(),
        };

        if let Admission::Allow { quantity } = admit(&account, &state, &intent, &trading) {
            // Apply the fill the way the scheduler does.
            account.cash -= quantity * price;
            account
                .positions
                .push(Position::new(intent.symbol.clone(), quantity, price));

            let cap = trading.max_total_exposure * account.equity();
            assert!(
                account.exposure() <= cap,
                "exposure {} breached cap {} after fill {}",
                account.exposure(),
                cap,
                i
            );
        }
    }
}
