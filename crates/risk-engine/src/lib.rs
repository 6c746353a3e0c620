//! Risk Engine
//!
//! Admission control between strategy intent and the broker, plus the
//! per-account circuit-breaker latch. All functions are pure over a single
//! account's state; cross-account coupling is structurally impossible.

pub mod admission;
pub mod breaker;
pub mod sizing;

pub use admission::{admit, Admission, RejectReason};
pub use breaker::{evaluate, trip};
pub use sizing::kelly_target_quantity;
