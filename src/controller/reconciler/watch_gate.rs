//! # Watch Gate
//!
//! Starts watching a kind only once the cluster can serve it. Until a
//! capability probe (listing a kind installed by the same CRD bundle)
//! succeeds, the gate requeues after a bounded delay without reporting an
//! error. Once the probe succeeds the watch is registered and the gate stays
//! open for the lifetime of the reconciler instance.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use super::pipeline::{ReconcileContext, Step};
use super::result::{ReconcileResult, WatchError};
use crate::observability::metrics;
use crate::store::{kind_of, ObjectStore, Selector, StoreObject};

/// Starts watches on behalf of the gate
#[async_trait]
pub trait WatchRegistrar: Send + Sync {
    /// Begin delivering change notifications for kind `K`;
    /// `None` watches across all namespaces
    async fn register<K: StoreObject>(&self, namespace: Option<&str>) -> Result<(), WatchError>;
}

/// Context for pipelines containing watch gates
pub trait WatchContext: ReconcileContext {
    type Registrar: WatchRegistrar;

    fn registrar(&self) -> &Self::Registrar;

    /// Requeue delay while the probed capability is missing
    fn capability_requeue(&self) -> Duration;
}

/// Gate that probes kind `P` and, once it is served, watches kind `W`
pub struct WatchGate<P, W> {
    name: String,
    probe_namespace: String,
    watch_namespace: Option<String>,
    established: AtomicBool,
    _kinds: PhantomData<fn() -> (P, W)>,
}

impl<P, W> std::fmt::Debug for WatchGate<P, W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchGate")
            .field("name", &self.name)
            .field("probe_namespace", &self.probe_namespace)
            .field("watch_namespace", &self.watch_namespace)
            .field("established", &self.is_established())
            .finish()
    }
}

impl<P, W> WatchGate<P, W> {
    pub fn new(
        name: impl Into<String>,
        probe_namespace: impl Into<String>,
        watch_namespace: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            probe_namespace: probe_namespace.into(),
            watch_namespace,
            established: AtomicBool::new(false),
            _kinds: PhantomData,
        }
    }

    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }
}

#[async_trait]
impl<C, P, W> Step<C> for WatchGate<P, W>
where
    C: WatchContext,
    P: StoreObject,
    W: StoreObject,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &C) -> ReconcileResult {
        if self.is_established() {
            return ReconcileResult::next();
        }

        if let Err(e) = ctx
            .store()
            .list::<P>(Some(&self.probe_namespace), &Selector::everything())
            .await
        {
            let delay = ctx.capability_requeue();
            debug!(
                probe = %kind_of::<P>(),
                error = %e,
                delay_secs = delay.as_secs(),
                "capability not available yet"
            );
            metrics::increment_requeues_total("capability-missing");
            return ReconcileResult::requeue(delay);
        }

        match ctx
            .registrar()
            .register::<W>(self.watch_namespace.as_deref())
            .await
        {
            Ok(()) => {
                self.established.store(true, Ordering::Release);
                metrics::increment_watches_established(&kind_of::<W>());
                info!(kind = %kind_of::<W>(), "watch established");
                ReconcileResult::next()
            }
            Err(e) => ReconcileResult::error(e),
        }
    }
}
