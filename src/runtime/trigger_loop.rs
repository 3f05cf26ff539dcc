//! # Trigger Loop
//!
//! Drives the Grafana operator install pipeline. The pipeline has a single
//! identity, so kube-runtime's `Controller` (one reconcile per primary
//! object) does not fit: triggers from the ticker, watchers and requeues are
//! funnelled into one channel, coalesced, and each burst runs the pipeline
//! once.
//!
//! Errors back off with a Fibonacci schedule that resets on success.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::controller::backoff::FibonacciBackoff;
use crate::controller::grafana_operator::GrafanaOperatorReconciler;
use crate::controller::reconciler::WatchRegistrar;
use crate::observability::metrics;
use crate::runtime::triggers::TriggerSource;
use crate::store::ObjectStore;

/// Run the install pipeline on every trigger until shutdown is signalled
/// or every trigger source is gone
pub async fn run_trigger_loop<S, R>(
    reconciler: Arc<GrafanaOperatorReconciler<S, R>>,
    mut triggers: UnboundedReceiver<TriggerSource>,
    mut backoff: FibonacciBackoff,
    mut shutdown: watch::Receiver<bool>,
) where
    S: ObjectStore + 'static,
    R: WatchRegistrar + 'static,
{
    let identity = reconciler.identity();
    let mut deadline: Option<Instant> = None;
    info!(identity = %identity, "install trigger loop started");

    loop {
        let source = tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
            trigger = triggers.recv() => match trigger {
                Some(trigger) => trigger,
                None => break,
            },
            () = wait_until(deadline) => TriggerSource::Requeue,
        };

        let coalesced = drain(&mut triggers);
        debug!(trigger = %source, coalesced, "running install pipeline");
        deadline = None;

        match reconciler.reconcile(&identity).await {
            Ok(None) => backoff.reset(),
            Ok(Some(delay)) => {
                backoff.reset();
                metrics::increment_requeues_total("requested");
                deadline = Some(Instant::now() + delay);
            }
            Err(e) => {
                let delay = backoff.next_backoff();
                error!(
                    identity = %identity,
                    error = %e,
                    retry_in_secs = delay.as_secs(),
                    "install pipeline failed"
                );
                metrics::increment_requeues_total("error-backoff");
                deadline = Some(Instant::now() + delay);
            }
        }
    }

    info!(identity = %identity, "install trigger loop stopped");
}

/// Discard triggers already queued; the next run covers them
fn drain(triggers: &mut UnboundedReceiver<TriggerSource>) -> usize {
    let mut count = 0;
    while triggers.try_recv().is_ok() {
        count += 1;
    }
    count
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
