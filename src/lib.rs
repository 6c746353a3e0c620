//! System X: autonomous trading and backtesting control core.
//!
//! This is the root crate tying the workspace together for integration
//! tests. For actual functionality, use the individual crates directly:
//!
//! - `systemx-core`: shared types, configuration, the session oracle, and
//!   the capability interfaces
//! - `risk-engine`: admission control and the per-account circuit breaker
//! - `scheduler`: the mode scheduler, metrics buffer, and snapshot publisher
//! - `api-server`: the REST monitoring and control surface

pub use api_server as api;
pub use risk_engine as risk;
pub use scheduler as sched;
pub use systemx_core as core;
