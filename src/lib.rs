//! # Monitoring Stack Operator
//!
//! A Kubernetes operator built on a small declarative reconciliation engine.
//!
//! ## Overview
//!
//! Each reconciler is an ordered [`Pipeline`](controller::reconciler::Pipeline)
//! of steps run against an [`ObjectStore`](store::ObjectStore). A step either
//! continues, stops the pipeline, asks to be requeued, or fails. Two
//! reconcilers are built on it:
//!
//! 1. **Grafana operator install** - installs the Grafana operator through
//!    OLM (namespace, OperatorGroup, Subscription pinned to a CSV, InstallPlan
//!    approval) and converges a Grafana CR once its CRDs are served
//! 2. **UIPlugin** - deploys console plugins declared by `UIPlugin` resources
//!    and reports readiness on their status
//!
//! ## Features
//!
//! - **Idempotent convergence**: objects are only written when a managed field drifts
//! - **Optimistic concurrency**: conflicts requeue instead of failing
//! - **Capability gating**: watches on optional CRDs start once the CRDs exist
//! - **Config-driven rollouts**: ConfigMap digests stamped on pod templates
//! - **Prometheus metrics** and **health probes** over HTTP

pub mod cli;
pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod runtime;
pub mod store;
