//! # Controller Module
//!
//! - `reconciler` - Step pipeline, convergence and the other reconciliation building blocks
//! - `grafana_operator` - Grafana operator install through OLM
//! - `uiplugin` - Console UI plugin components
//! - `backoff` - Fibonacci error backoff
//! - `server` - Metrics and probe HTTP server

pub mod backoff;
pub mod grafana_operator;
pub mod reconciler;
pub mod server;
pub mod uiplugin;
