//! Shared application state for the monitoring surface.
//!
//! Handlers are read-only observers of the scheduler: they borrow published
//! snapshots from the watch channel and can request an emergency stop, but
//! they never touch account or risk state directly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use scheduler::{EmergencyStopHandle, MetricsSnapshot};
use systemx_core::config::SystemConfig;

pub struct AppState {
    pub config: Arc<SystemConfig>,
    pub snapshot: watch::Receiver<Arc<MetricsSnapshot>>,
    pub stop: EmergencyStopHandle,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: Arc<SystemConfig>,
        snapshot: watch::Receiver<Arc<MetricsSnapshot>>,
        stop: EmergencyStopHandle,
    ) -> Self {
        Self {
            config,
            snapshot,
            stop,
            started_at: Utc::now(),
        }
    }

    /// Latest complete snapshot. Cheap: one `Arc` clone.
    pub fn latest(&self) -> Arc<MetricsSnapshot> {
        self.snapshot.borrow().clone()
    }
}
