//! # Grafana Operator Install Tests
//!
//! Runs the install pipeline end to end against the in-memory store:
//! - namespace creation and the wait for `Active`
//! - re-pinning a subscription to a new starting CSV
//! - install plan approval and the Grafana watch gate

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, NamespaceStatus};
use kube::api::ObjectMeta;

use monitoring_stack_operator::config::ControllerConfig;
use monitoring_stack_operator::constants::{OPERATOR_GROUP_NAME, SUBSCRIPTION_NAME};
use monitoring_stack_operator::controller::grafana_operator::{manifests, GrafanaOperatorReconciler};
use monitoring_stack_operator::controller::reconciler::{
    ReconcileContext, WatchContext, WatchError, WatchRegistrar,
};
use monitoring_stack_operator::crd::{
    BundleLookup, ClusterServiceVersion, ClusterServiceVersionSpec, Grafana, GrafanaDataSource,
    InstallPlan, InstallPlanSpec, InstallPlanStatus, OperatorGroup, Subscription,
    SubscriptionStatus,
};
use monitoring_stack_operator::store::{
    kind_of, Fault, MemoryStore, ObjectKey, Operation, StoreObject, Verb,
};

const NS: &str = "monitoring-stack-operator";
const CSV: &str = "grafana-operator.v4.1.0";

#[derive(Default)]
struct RecordingRegistrar {
    registered: Mutex<Vec<(String, Option<String>)>>,
}

impl RecordingRegistrar {
    fn registrations(&self) -> Vec<(String, Option<String>)> {
        self.registered.lock().unwrap().clone()
    }
}

#[async_trait]
impl WatchRegistrar for RecordingRegistrar {
    async fn register<K: StoreObject>(&self, namespace: Option<&str>) -> Result<(), WatchError> {
        self.registered
            .lock()
            .unwrap()
            .push((kind_of::<K>(), namespace.map(str::to_string)));
        Ok(())
    }
}

type Reconciler = GrafanaOperatorReconciler<MemoryStore, RecordingRegistrar>;

fn reconciler() -> Reconciler {
    GrafanaOperatorReconciler::new(
        MemoryStore::new(),
        RecordingRegistrar::default(),
        &ControllerConfig::default(),
    )
}

fn store(reconciler: &Reconciler) -> &MemoryStore {
    reconciler.context().store()
}

fn activate_namespace(store: &MemoryStore) {
    store
        .modify::<Namespace>(&ObjectKey::cluster(NS), |ns| {
            ns.status = Some(NamespaceStatus {
                phase: Some("Active".to_string()),
                ..Default::default()
            });
        })
        .expect("namespace exists");
}

fn active_namespace() -> Namespace {
    let mut ns = manifests::namespace(NS);
    ns.status = Some(NamespaceStatus {
        phase: Some("Active".to_string()),
        ..Default::default()
    });
    ns
}

fn resolved_plan(name: &str, csv: &str) -> InstallPlan {
    let mut plan = InstallPlan::new(
        name,
        InstallPlanSpec {
            cluster_service_version_names: vec![csv.to_string()],
            ..Default::default()
        },
    );
    plan.metadata.namespace = Some(NS.to_string());
    plan.status = Some(InstallPlanStatus {
        phase: Some("RequiresApproval".to_string()),
        bundle_lookups: vec![BundleLookup {
            path: format!("quay.io/operatorhubio/{csv}"),
            identifier: csv.to_string(),
            replaces: None,
        }],
    });
    plan
}

#[tokio::test]
async fn test_namespace_created_then_waited_on_until_active() {
    let reconciler = reconciler();
    let identity = reconciler.identity();

    let outcome = reconciler.reconcile(&identity).await.unwrap();
    assert_eq!(outcome, None);
    assert!(store(&reconciler).contains::<Namespace>(&ObjectKey::cluster(NS)));
    assert_eq!(store(&reconciler).write_count(), 1);

    // Created but not yet Active: wait without writing
    let outcome = reconciler.reconcile(&identity).await.unwrap();
    assert_eq!(outcome, None);
    assert_eq!(store(&reconciler).write_count(), 1);

    activate_namespace(store(&reconciler));
    store(&reconciler).clear_writes();
    reconciler.reconcile(&identity).await.unwrap();

    let writes = store(&reconciler).writes();
    assert!(writes.iter().all(|w| w.kind != "Namespace"), "namespace re-created: {writes:?}");
    assert!(store(&reconciler)
        .contains::<OperatorGroup>(&ObjectKey::namespaced(NS, OPERATOR_GROUP_NAME)));
}

#[tokio::test]
async fn test_nothing_created_inside_namespace_before_it_exists() {
    let reconciler = reconciler();
    reconciler.reconcile(&reconciler.identity()).await.unwrap();

    let writes = store(&reconciler).writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].verb, Verb::Create);
    assert_eq!(writes[0].kind, "Namespace");
    assert!(!store(&reconciler)
        .contains::<OperatorGroup>(&ObjectKey::namespaced(NS, OPERATOR_GROUP_NAME)));
    assert!(!store(&reconciler)
        .contains::<Subscription>(&ObjectKey::namespaced(NS, SUBSCRIPTION_NAME)));
}

#[tokio::test]
async fn test_stale_subscription_is_recreated_with_target_csv() {
    let reconciler = reconciler();
    let store = store(&reconciler);
    store.insert(&active_namespace());

    let mut stale = manifests::subscription(NS, "grafana-operator.v4.0.0");
    stale.status = Some(SubscriptionStatus {
        installed_csv: Some("grafana-operator.v4.0.0".to_string()),
        ..Default::default()
    });
    store.insert(&stale);
    let mut old_csv = ClusterServiceVersion::new(
        "grafana-operator.v4.0.0",
        ClusterServiceVersionSpec::default(),
    );
    old_csv.metadata.namespace = Some(NS.to_string());
    store.insert(&old_csv);

    let outcome = reconciler.reconcile(&reconciler.identity()).await.unwrap();
    assert_eq!(outcome, None);

    let sub_key = ObjectKey::namespaced(NS, SUBSCRIPTION_NAME);
    let recreated = store.snapshot::<Subscription>(&sub_key).unwrap();
    assert_eq!(recreated.spec.starting_csv, CSV);
    assert!(recreated.status.is_none());
    assert!(!store.contains::<ClusterServiceVersion>(&ObjectKey::namespaced(
        NS,
        "grafana-operator.v4.0.0"
    )));

    let writes: Vec<(Verb, String)> = store
        .writes()
        .into_iter()
        .filter(|w| w.kind != "OperatorGroup")
        .map(|w| (w.verb, w.kind))
        .collect();
    assert_eq!(
        writes,
        vec![
            (Verb::Delete, "Subscription".to_string()),
            (Verb::Delete, "ClusterServiceVersion".to_string()),
            (Verb::Create, "Subscription".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_stale_subscription_without_installed_csv_skips_csv_delete() {
    let reconciler = reconciler();
    let store = store(&reconciler);
    store.insert(&active_namespace());
    store.insert(&manifests::subscription(NS, "grafana-operator.v4.0.0"));

    reconciler.reconcile(&reconciler.identity()).await.unwrap();

    assert!(store
        .writes()
        .iter()
        .all(|w| w.kind != "ClusterServiceVersion"));
    let sub = store
        .snapshot::<Subscription>(&ObjectKey::namespaced(NS, SUBSCRIPTION_NAME))
        .unwrap();
    assert_eq!(sub.spec.starting_csv, CSV);
}

#[tokio::test]
async fn test_install_waits_for_plans_then_approves_and_opens_gate() {
    let reconciler = reconciler();
    let identity = reconciler.identity();
    let store = store(&reconciler);
    store.insert(&active_namespace());

    // Creates the operator group and the subscription, then stops on the create
    assert_eq!(reconciler.reconcile(&identity).await.unwrap(), None);
    assert!(store.contains::<Subscription>(&ObjectKey::namespaced(NS, SUBSCRIPTION_NAME)));

    // No install plans yet: wait without writing
    store.clear_writes();
    assert_eq!(reconciler.reconcile(&identity).await.unwrap(), None);
    assert_eq!(store.write_count(), 0);

    // OLM resolves a plan for the target CSV
    store.insert(&resolved_plan("install-abcde", CSV));
    assert_eq!(reconciler.reconcile(&identity).await.unwrap(), None);
    let plan = store
        .snapshot::<InstallPlan>(&ObjectKey::namespaced(NS, "install-abcde"))
        .unwrap();
    assert!(plan.spec.approved);
    assert_eq!(store.write_count(), 1);
    assert!(reconciler.context().registrar().registrations().is_empty());

    // Approved: the gate registers the Grafana watch and the Grafana CR is created
    store.clear_writes();
    assert_eq!(reconciler.reconcile(&identity).await.unwrap(), None);
    assert_eq!(
        reconciler.context().registrar().registrations(),
        vec![("Grafana".to_string(), Some(NS.to_string()))]
    );
    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].kind, "Grafana");

    // Converged: no writes, no second registration
    store.clear_writes();
    assert_eq!(reconciler.reconcile(&identity).await.unwrap(), None);
    assert_eq!(store.write_count(), 0);
    assert_eq!(reconciler.context().registrar().registrations().len(), 1);
}

#[tokio::test]
async fn test_missing_grafana_crds_requeue_without_error() {
    let reconciler = reconciler();
    let identity = reconciler.identity();
    let store = store(&reconciler);
    store.insert(&active_namespace());
    store.insert(&manifests::operator_group(NS));
    store.insert(&manifests::subscription(NS, CSV));
    let mut plan = resolved_plan("install-abcde", CSV);
    plan.spec.approved = true;
    store.insert(&plan);

    store.inject::<GrafanaDataSource>(
        Operation::List,
        Fault::Unavailable("the server could not find the requested resource".to_string()),
    );
    let outcome = reconciler.reconcile(&identity).await.unwrap();
    assert_eq!(outcome, Some(Duration::from_secs(10)));
    assert!(reconciler.context().registrar().registrations().is_empty());
    assert!(!store.contains::<Grafana>(&ObjectKey::namespaced(
        NS,
        "monitoring-stack-operator-grafana"
    )));

    assert_eq!(reconciler.reconcile(&identity).await.unwrap(), None);
    assert_eq!(reconciler.context().registrar().registrations().len(), 1);
}

#[tokio::test]
async fn test_store_outage_surfaces_as_error() {
    let reconciler = reconciler();
    reconciler
        .context()
        .store()
        .inject::<Namespace>(Operation::Get, Fault::Unavailable("connection refused".to_string()));

    let err = reconciler
        .reconcile(&reconciler.identity())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("connection refused"), "{err}");

    // The next invocation starts again from the first step
    assert_eq!(reconciler.reconcile(&reconciler.identity()).await.unwrap(), None);
    assert!(reconciler
        .context()
        .store()
        .contains::<Namespace>(&ObjectKey::cluster(NS)));
}

#[test]
fn test_namespace_manifest_is_cluster_scoped() {
    let ns = manifests::namespace(NS);
    assert_eq!(ObjectKey::of(&ns), ObjectKey::cluster(NS));
    assert_eq!(
        ns.metadata,
        ObjectMeta {
            name: Some(NS.to_string()),
            labels: Some(manifests::common_labels()),
            ..Default::default()
        }
    );
}
