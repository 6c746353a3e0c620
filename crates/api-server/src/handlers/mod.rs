//! HTTP request handlers.

pub mod candidates;
pub mod config;
pub mod control;
pub mod health;
pub mod metrics;
