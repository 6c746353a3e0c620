//! Validated configuration for the control core.
//!
//! Loaded once at startup from a YAML file plus `SYSTEMX_`-prefixed
//! environment overrides, then passed around as an immutable structure.
//! Unknown keys and malformed values are startup failures, never silent
//! defaults deep in the control loop.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn default_max_position_size() -> Decimal {
    Decimal::new(15, 2) // 15% per position
}

fn default_risk_multiplier() -> Decimal {
    Decimal::ONE
}

fn default_daily_loss_limit() -> Decimal {
    Decimal::new(3, 2) // 3% of equity
}

fn default_max_total_exposure() -> Decimal {
    Decimal::new(75, 2) // 75% of equity
}

fn default_stop_loss_pct() -> Decimal {
    Decimal::new(5, 2)
}

fn default_take_profit_pct() -> Decimal {
    Decimal::new(10, 2)
}

fn default_max_day_trades() -> u32 {
    3 // PDT compliance
}

fn default_max_consecutive_losses() -> u32 {
    5
}

fn default_true() -> bool {
    true
}

fn default_trading_interval() -> u64 {
    300
}

fn default_backtest_interval() -> u64 {
    1800
}

fn default_health_check_interval() -> u64 {
    60
}

fn default_adapter_timeout() -> u64 {
    10
}

fn default_notification_cooldown() -> u64 {
    900
}

fn default_metrics_window() -> usize {
    252
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Per-account risk configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountRiskConfig {
    /// Maximum single-position size as a fraction of equity.
    #[serde(default = "default_max_position_size")]
    pub max_position_size: Decimal,
    /// Scale position sizes up on strong signals. Disabled by default after
    /// poor live results.
    #[serde(default)]
    pub aggressive_sizing_enabled: bool,
    /// Multiplier applied to Kelly-sized positions.
    #[serde(default = "default_risk_multiplier")]
    pub risk_multiplier: Decimal,
    /// Daily realized-loss fraction of equity that latches the breaker.
    #[serde(default = "default_daily_loss_limit")]
    pub daily_loss_limit: Decimal,
}

impl Default for AccountRiskConfig {
    fn default() -> Self {
        Self {
            max_position_size: default_max_position_size(),
            aggressive_sizing_enabled: false,
            risk_multiplier: default_risk_multiplier(),
            daily_loss_limit: default_daily_loss_limit(),
        }
    }
}

/// One managed account declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub id: String,
    pub starting_equity: Decimal,
    #[serde(default)]
    pub risk: AccountRiskConfig,
}

/// Global trading limits shared by all accounts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TradingConfig {
    #[serde(default = "default_max_total_exposure")]
    pub max_total_exposure: Decimal,
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,
    #[serde(default = "default_max_day_trades")]
    pub max_day_trades: u32,
    #[serde(default = "default_true")]
    pub kelly_enabled: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            max_total_exposure: default_max_total_exposure(),
            stop_loss_pct: default_stop_loss_pct(),
            take_profit_pct: default_take_profit_pct(),
            max_day_trades: default_max_day_trades(),
            kelly_enabled: true,
        }
    }
}

/// Circuit-breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskManagementConfig {
    /// Process-wide fallback daily loss fraction when an account does not
    /// override it.
    #[serde(default = "default_daily_loss_limit")]
    pub max_daily_loss: Decimal,
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
    #[serde(default = "default_true")]
    pub circuit_breaker_enabled: bool,
    /// Strict per-account isolation of risk state (always honored by the
    /// risk engine; kept as a recognized option).
    #[serde(default = "default_true")]
    pub account_isolation: bool,
}

impl Default for RiskManagementConfig {
    fn default() -> Self {
        Self {
            max_daily_loss: default_daily_loss_limit(),
            max_consecutive_losses: default_max_consecutive_losses(),
            circuit_breaker_enabled: true,
            account_isolation: true,
        }
    }
}

/// Cycle cadence and adapter deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    #[serde(default = "default_trading_interval")]
    pub trading_interval_secs: u64,
    #[serde(default = "default_backtest_interval")]
    pub backtest_interval_secs: u64,
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,
    /// Per-call deadline for adapter I/O.
    #[serde(default = "default_adapter_timeout")]
    pub adapter_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            trading_interval_secs: default_trading_interval(),
            backtest_interval_secs: default_backtest_interval(),
            health_check_interval_secs: default_health_check_interval(),
            adapter_timeout_secs: default_adapter_timeout(),
        }
    }
}

/// Monitoring surface and notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitoringConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Minimum seconds between repeated notifications for the same alert key.
    #[serde(default = "default_notification_cooldown")]
    pub notification_cooldown_secs: u64,
    /// Slack-compatible webhook URL; notifications are disabled when unset.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Rolling window for Sharpe/Sortino/VaR, in daily returns.
    #[serde(default = "default_metrics_window")]
    pub metrics_window: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            notification_cooldown_secs: default_notification_cooldown(),
            webhook_url: None,
            metrics_window: default_metrics_window(),
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SystemConfig {
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub risk_management: RiskManagementConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

impl SystemConfig {
    /// Load from a YAML file with `SYSTEMX_`-prefixed environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SYSTEMX").separator("__"))
            .build()?;

        let cfg: SystemConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Startup validation. Any violation here is fatal: the process must not
    /// start with an inconsistent risk budget.
    pub fn validate(&self) -> Result<()> {
        if self.accounts.is_empty() {
            return Err(Error::Config {
                message: "at least one account must be configured".to_string(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for account in &self.accounts {
            if account.id.trim().is_empty() {
                return Err(Error::Config {
                    message: "account id must not be empty".to_string(),
                });
            }
            if !seen.insert(account.id.as_str()) {
                return Err(Error::Config {
                    message: format!("duplicate account id: {}", account.id),
                });
            }
            if account.starting_equity <= Decimal::ZERO {
                return Err(Error::Config {
                    message: format!("account {}: starting_equity must be positive", account.id),
                });
            }
            Self::check_fraction(&account.id, "max_position_size", account.risk.max_position_size)?;
            Self::check_fraction(&account.id, "daily_loss_limit", account.risk.daily_loss_limit)?;
            if account.risk.risk_multiplier <= Decimal::ZERO {
                return Err(Error::Config {
                    message: format!("account {}: risk_multiplier must be positive", account.id),
                });
            }
        }

        Self::check_fraction("global", "max_total_exposure", self.trading.max_total_exposure)?;
        Self::check_fraction("global", "stop_loss_pct", self.trading.stop_loss_pct)?;
        Self::check_fraction("global", "take_profit_pct", self.trading.take_profit_pct)?;
        Self::check_fraction("global", "max_daily_loss", self.risk_management.max_daily_loss)?;

        if self.schedule.trading_interval_secs == 0
            || self.schedule.backtest_interval_secs == 0
            || self.schedule.adapter_timeout_secs == 0
        {
            return Err(Error::Config {
                message: "schedule intervals and adapter timeout must be nonzero".to_string(),
            });
        }

        if self.monitoring.metrics_window == 0 {
            return Err(Error::Config {
                message: "metrics_window must be nonzero".to_string(),
            });
        }

        Ok(())
    }

    fn check_fraction(scope: &str, name: &str, value: Decimal) -> Result<()> {
        if value <= Decimal::ZERO || value > Decimal::ONE {
            return Err(Error::Config {
                message: format!("{scope}: {name} must be in (0, 1], got {value}"),
            });
        }
        Ok(())
    }

    /// Minimal single-account configuration for tests.
    pub fn test_config() -> Self {
        Self {
            accounts: vec![AccountConfig {
                id: "PRIMARY_30K".to_string(),
                starting_equity: Decimal::new(30_000, 0),
                risk: AccountRiskConfig::default(),
            }],
            trading: TradingConfig::default(),
            risk_management: RiskManagementConfig::default(),
            schedule: ScheduleConfig {
                trading_interval_secs: 1,
                backtest_interval_secs: 1,
                health_check_interval_secs: 1,
                adapter_timeout_secs: 2,
            },
            monitoring: MonitoringConfig::default(),
        }
    }
}
