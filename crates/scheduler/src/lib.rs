//! Mode scheduler for the autonomous control core.
//!
//! Owns all trading state in a single sequential task: session-driven mode
//! selection, per-account cycle execution through the risk engine, rolling
//! performance metrics, snapshot publishing, and the emergency-stop path.

pub mod control;
pub mod metrics;
pub mod paper;
pub mod registry;
pub mod scheduler;
pub mod snapshot;

pub use control::EmergencyStopHandle;
pub use metrics::{MetricsBuffer, RiskMetrics};
pub use registry::{AccountRegistry, ManagedAccount};
pub use scheduler::{Collaborators, Scheduler, SchedulerHandle, SchedulerState};
pub use snapshot::{AccountMetrics, AdapterHealth, MetricsSnapshot, SystemStatus};
