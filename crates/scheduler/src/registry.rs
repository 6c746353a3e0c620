//! Per-account books owned exclusively by the scheduler task.
//!
//! Nothing outside the scheduler mutates an account or its risk state; the
//! monitoring surface only ever sees published snapshots.

use systemx_core::config::SystemConfig;
use systemx_core::{Account, RiskState};

/// One account plus the scheduler-side bookkeeping attached to it.
#[derive(Debug, Clone)]
pub struct ManagedAccount {
    pub account: Account,
    pub risk: RiskState,
    /// Consecutive cycles in which every adapter step failed for this
    /// account. Escalates to a circuit-breaker trip.
    pub failed_cycles: u32,
}

impl ManagedAccount {
    fn new(account: Account) -> Self {
        Self {
            account,
            risk: RiskState::default(),
            failed_cycles: 0,
        }
    }
}

/// All managed accounts, built once from configuration at startup.
#[derive(Debug, Clone)]
pub struct AccountRegistry {
    accounts: Vec<ManagedAccount>,
}

impl AccountRegistry {
    pub fn from_config(config: &SystemConfig) -> Self {
        let accounts = config
            .accounts
            .iter()
            .map(|a| {
                ManagedAccount::new(Account::new(
                    a.id.clone(),
                    a.starting_equity,
                    a.risk.clone(),
                ))
            })
            .collect();
        Self { accounts }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn get(&self, idx: usize) -> &ManagedAccount {
        &self.accounts[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut ManagedAccount {
        &mut self.accounts[idx]
    }

    pub fn find(&self, account_id: &str) -> Option<&ManagedAccount> {
        self.accounts.iter().find(|m| m.account.id == account_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedAccount> {
        self.accounts.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ManagedAccount> {
        self.accounts.iter_mut()
    }
}
