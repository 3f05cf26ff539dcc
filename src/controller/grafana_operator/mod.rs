//! # Grafana Operator Install
//!
//! Installs the Grafana operator through OLM and converges the Grafana
//! instance it serves. One pipeline, one top-level identity (the operator
//! namespace), run in this order:
//!
//! 1. `namespace` - create the operator namespace; wait until it is `Active`
//! 2. `operator-group` - converge the OperatorGroup targeting the namespace
//! 3. `subscription` - create the Subscription, or re-create it when it pins
//!    a different starting CSV (removing the previously installed CSV)
//! 4. `install-plan` - approve the InstallPlan for the pinned CSV
//! 5. `grafana-watch` - once the Grafana CRDs are served, watch Grafana CRs
//! 6. `grafana` - converge the Grafana CR
//!
//! Steps that create an object stop the pipeline; the watch event for the
//! new object continues the work.

pub mod manifests;

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use tracing::{debug, info, info_span, Instrument};

use crate::config::ControllerConfig;
use crate::constants::{GRAFANA_CAPABILITY_PROBE_NAMESPACE, SUBSCRIPTION_NAME};
use crate::controller::reconciler::{
    creation_result, ApproveInstallPlan, Pipeline, ReconcileContext, ReconcileResult,
    ReconcilerError, Step, Updater, WatchContext, WatchGate, WatchRegistrar,
};
use crate::crd::{ClusterServiceVersion, Grafana, GrafanaDataSource, Subscription};
use crate::observability::metrics;
use crate::store::{ObjectKey, ObjectStore, StoreError};

/// Shared context of the install pipeline
#[derive(Debug)]
pub struct StackContext<S, R> {
    store: S,
    registrar: R,
    conflict_requeue: Duration,
    capability_requeue: Duration,
}

impl<S, R> StackContext<S, R> {
    pub fn new(store: S, registrar: R, config: &ControllerConfig) -> Self {
        Self {
            store,
            registrar,
            conflict_requeue: config.conflict_requeue(),
            capability_requeue: config.capability_requeue(),
        }
    }
}

impl<S: ObjectStore, R: WatchRegistrar> ReconcileContext for StackContext<S, R> {
    type Store = S;

    fn store(&self) -> &S {
        &self.store
    }

    fn conflict_requeue(&self) -> Duration {
        self.conflict_requeue
    }
}

impl<S: ObjectStore, R: WatchRegistrar> WatchContext for StackContext<S, R> {
    type Registrar = R;

    fn registrar(&self) -> &R {
        &self.registrar
    }

    fn capability_requeue(&self) -> Duration {
        self.capability_requeue
    }
}

/// Creates the operator namespace and waits for it to become active
#[derive(Debug, Clone)]
pub struct EnsureNamespace {
    name: String,
}

impl EnsureNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl<C: ReconcileContext> Step<C> for EnsureNamespace {
    fn name(&self) -> &str {
        "namespace"
    }

    async fn execute(&self, ctx: &C) -> ReconcileResult {
        let key = ObjectKey::cluster(&self.name);
        let namespace = match ctx.store().get::<Namespace>(&key).await {
            Ok(namespace) => namespace,
            Err(e) => return ReconcileResult::error(e),
        };

        let Some(namespace) = namespace else {
            info!(namespace = %self.name, "creating namespace");
            let result = ctx.store().create(&manifests::namespace(&self.name)).await;
            if result.is_ok() {
                metrics::increment_writes("Namespace", "create");
            }
            return creation_result(result);
        };

        let phase = namespace
            .status
            .as_ref()
            .and_then(|status| status.phase.as_deref());
        if phase != Some("Active") {
            info!(namespace = %self.name, phase = ?phase, "namespace is present but not active");
            return ReconcileResult::end();
        }
        ReconcileResult::next()
    }
}

/// Keeps the Grafana operator Subscription pinned to the target CSV
#[derive(Debug, Clone)]
pub struct EnsureSubscription {
    desired: Subscription,
}

impl EnsureSubscription {
    pub fn new(desired: Subscription) -> Self {
        Self { desired }
    }

    async fn recreate<S: ObjectStore>(&self, store: &S, current: &Subscription) -> ReconcileResult {
        let key = ObjectKey::of(current);
        info!(subscription = %key, "deleting subscription pinned to a different version");
        if let Err(e) = ignore_not_found(store.delete::<Subscription>(&key).await) {
            return ReconcileResult::error(e);
        }
        metrics::increment_writes("Subscription", "delete");

        let installed = current
            .status
            .as_ref()
            .and_then(|status| status.installed_csv.as_deref())
            .filter(|csv| !csv.is_empty());
        if let Some(csv) = installed {
            let csv_key = ObjectKey {
                namespace: key.namespace.clone(),
                name: csv.to_string(),
            };
            info!(csv = %csv_key, "deleting installed cluster service version");
            if let Err(e) = ignore_not_found(store.delete::<ClusterServiceVersion>(&csv_key).await) {
                return ReconcileResult::error(e);
            }
            metrics::increment_writes("ClusterServiceVersion", "delete");
        }

        info!(subscription = %key, csv = %self.desired.spec.starting_csv, "creating subscription");
        let result = store.create(&self.desired).await;
        if result.is_ok() {
            metrics::increment_writes("Subscription", "create");
        }
        creation_result(result)
    }
}

fn ignore_not_found(result: Result<(), StoreError>) -> Result<(), StoreError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

#[async_trait]
impl<C: ReconcileContext> Step<C> for EnsureSubscription {
    fn name(&self) -> &str {
        "subscription"
    }

    async fn execute(&self, ctx: &C) -> ReconcileResult {
        let key = ObjectKey::of(&self.desired);
        let current = match ctx.store().get::<Subscription>(&key).await {
            Ok(current) => current,
            Err(e) => return ReconcileResult::error(e),
        };

        match current {
            None => {
                info!(subscription = %key, "creating Grafana operator subscription");
                let result = ctx.store().create(&self.desired).await;
                if result.is_ok() {
                    metrics::increment_writes("Subscription", "create");
                }
                creation_result(result)
            }
            Some(current) if current.spec.starting_csv == self.desired.spec.starting_csv => {
                debug!(subscription = %key, "subscription pinned to target version");
                ReconcileResult::next()
            }
            Some(current) => self.recreate(ctx.store(), &current).await,
        }
    }
}

/// Reconciler for the Grafana operator install
pub struct GrafanaOperatorReconciler<S, R>
where
    S: ObjectStore,
    R: WatchRegistrar,
{
    namespace: String,
    ctx: StackContext<S, R>,
    pipeline: Pipeline<StackContext<S, R>>,
}

impl<S, R> std::fmt::Debug for GrafanaOperatorReconciler<S, R>
where
    S: ObjectStore,
    R: WatchRegistrar,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrafanaOperatorReconciler")
            .field("namespace", &self.namespace)
            .field("pipeline", &self.pipeline)
            .finish_non_exhaustive()
    }
}

impl<S, R> GrafanaOperatorReconciler<S, R>
where
    S: ObjectStore + 'static,
    R: WatchRegistrar + 'static,
{
    pub fn new(store: S, registrar: R, config: &ControllerConfig) -> Self {
        let namespace = config.operator_namespace.clone();
        let pipeline = Pipeline::new("grafana-operator")
            .step(EnsureNamespace::new(&namespace))
            .step(Updater::named(
                "operator-group",
                manifests::operator_group(&namespace),
            ))
            .step(EnsureSubscription::new(manifests::subscription(
                &namespace,
                &config.grafana_csv,
            )))
            .step(ApproveInstallPlan::new(&namespace, &config.grafana_csv))
            .step(WatchGate::<GrafanaDataSource, Grafana>::new(
                "grafana-watch",
                GRAFANA_CAPABILITY_PROBE_NAMESPACE,
                Some(namespace.clone()),
            ))
            .step(Updater::named("grafana", manifests::grafana(&namespace)));

        Self {
            namespace,
            ctx: StackContext::new(store, registrar, config),
            pipeline,
        }
    }

    /// Identity every trigger of this reconciler maps to
    pub fn identity(&self) -> ObjectKey {
        ObjectKey::cluster(&self.namespace)
    }

    pub fn context(&self) -> &StackContext<S, R> {
        &self.ctx
    }

    pub fn pipeline(&self) -> &Pipeline<StackContext<S, R>> {
        &self.pipeline
    }

    /// Run the install pipeline once
    ///
    /// Returns the requeue delay, if any (`Duration::ZERO` means immediately),
    /// or the error that stopped the pipeline.
    pub async fn reconcile(&self, identity: &ObjectKey) -> Result<Option<Duration>, ReconcilerError> {
        let span = info_span!(
            "grafana_operator.reconcile",
            identity = %identity,
            subscription = SUBSCRIPTION_NAME
        );
        async {
            debug!("reconciling Grafana operator install");
            let outcome = self.pipeline.run(&self.ctx).await.into_outcome();
            match &outcome {
                Ok(Some(delay)) => debug!(delay_ms = delay.as_millis() as u64, "requeue requested"),
                Ok(None) => debug!("reconciled"),
                Err(_) => {}
            }
            outcome
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn test_ignore_not_found() {
        let missing = Err(StoreError::NotFound {
            kind: "ClusterServiceVersion".to_string(),
            key: ObjectKey::namespaced("ns", "csv"),
        });
        assert!(ignore_not_found(missing).is_ok());
        let down = Err(StoreError::Unavailable {
            kind: "ClusterServiceVersion".to_string(),
            message: "down".to_string(),
        });
        assert!(ignore_not_found(down).is_err());
    }

    struct NoopRegistrar;

    #[async_trait]
    impl WatchRegistrar for NoopRegistrar {
        async fn register<K: crate::store::StoreObject>(
            &self,
            _namespace: Option<&str>,
        ) -> Result<(), crate::controller::reconciler::WatchError> {
            Ok(())
        }
    }

    #[test]
    fn test_pipeline_order() {
        let reconciler =
            GrafanaOperatorReconciler::new(MemoryStore::new(), NoopRegistrar, &ControllerConfig::default());
        assert_eq!(
            reconciler.pipeline().step_names(),
            vec![
                "namespace",
                "operator-group",
                "subscription",
                "install-plan",
                "grafana-watch",
                "grafana"
            ]
        );
    }
}
