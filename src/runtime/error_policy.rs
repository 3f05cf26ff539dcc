//! # Error Policy
//!
//! Error handling and backoff for the UIPlugin controller.
//! Backoff state is tracked per plugin so one failing plugin does not delay
//! the others.

use std::sync::Arc;

use kube_runtime::controller::Action;
use tracing::{error, info};

use crate::controller::reconciler::ReconcilerError;
use crate::controller::uiplugin::PluginContext;
use crate::crd::UIPlugin;
use crate::observability;
use crate::store::ObjectStore;

/// Handle reconciliation errors with Fibonacci backoff
pub fn handle_reconciliation_error<S: ObjectStore>(
    obj: Arc<UIPlugin>,
    error: &ReconcilerError,
    ctx: Arc<PluginContext<S>>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or("unknown");

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.uiplugin.reconciliation_error",
        resource.name = name,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for UIPlugin {}: {}", name, error);

    let delay = ctx.next_backoff(name);
    info!(
        "Retrying UIPlugin {} in {}s (trigger source: error-backoff)",
        name,
        delay.as_secs()
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}
