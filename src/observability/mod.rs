//! # Observability
//!
//! Prometheus metrics for the operator. Logging goes through `tracing`
//! directly; the subscriber is installed in `runtime::initialization`.

pub mod metrics;
