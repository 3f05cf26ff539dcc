//! # Reconciler Core
//!
//! Building blocks shared by every reconciler in the operator.
//!
//! - `result` - step outcomes and reconciler errors
//! - `pipeline` - ordered, short-circuiting step execution
//! - `managed` - per-kind managed fields and drift detection
//! - `updater` - convergence of a single managed resource
//! - `watch_gate` - watches started once a CRD is served
//! - `install_plan` - OLM install plan approval
//! - `config_hash` - config digests that roll workloads

pub mod config_hash;
pub mod install_plan;
pub mod managed;
pub mod pipeline;
pub mod result;
pub mod updater;
pub mod watch_gate;

pub use config_hash::{config_digest, config_map_digest, stamp_template};
pub use install_plan::{plan_state, ApproveInstallPlan, PlanState};
pub use managed::{apply_managed, drifted_fields, is_converged, ManagedField, ManagedResource, Matching};
pub use pipeline::{Pipeline, ReconcileContext, Step};
pub use result::{creation_result, update_result, ReconcileResult, ReconcilerError, Requeue, WatchError};
pub use updater::{converge, Updater};
pub use watch_gate::{WatchContext, WatchGate, WatchRegistrar};
