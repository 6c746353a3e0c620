//! System X Core
//!
//! Shared types, validated configuration, the market-session oracle, and the
//! capability interfaces consumed by the autonomous control core.

pub mod adapters;
pub mod calendar;
pub mod config;
pub mod error;
pub mod notify;
pub mod retry;
pub mod types;

pub use adapters::{
    BacktestRunner, BreakerEvent, BrokerAdapter, CandidateSource, NotificationAdapter,
    PersistenceAdapter, Severity, StrategyCollaborator,
};
pub use calendar::{MarketCalendar, SessionOracle};
pub use config::{AccountRiskConfig, SystemConfig};
pub use error::{Error, Result};
pub use notify::{CooldownNotifier, LogNotifier, WebhookNotifier};
pub use retry::RetryPolicy;
pub use types::{
    Account, AccountCycleReport, BreakerStatus, Candidate, CloseTrigger, CycleResult,
    EmergencyStopRequest, IntentKind, Mode, OrderRecord, OrderSide, Position, RiskState,
    StopActor, StrategySummary, TradeIntent, TripReason,
};
