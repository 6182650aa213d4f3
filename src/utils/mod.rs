//! # Utility Modules
//!
//! Supporting utilities for the receive loop and the probes.
//!
//! ## Components
//! - **Duplicate**: drops back-to-back repeats of the same datagram
//! - **Metrics**: thread-safe observability counters
//! - **Timeout**: deadline wrappers mapping expiry to `TimedOut`

pub mod duplicate;
pub mod metrics;
pub mod timeout;

pub use duplicate::DuplicateGuard;
pub use metrics::{Metrics, MetricsSnapshot};
