//! # Metrics Module
//!
//! Prometheus metrics for monitoring the operator, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `controller_metrics` - Reconciliation, step, requeue and write metrics

pub mod controller_metrics;
pub mod registry;

pub use controller_metrics::*;
pub use registry::*;
