//! # Watch Gate Tests
//!
//! The gate probes a capability, registers a watch once, and then stays open.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use monitoring_stack_operator::controller::reconciler::{
    ReconcileContext, Requeue, Step, WatchContext, WatchError, WatchGate, WatchRegistrar,
};
use monitoring_stack_operator::crd::{Grafana, GrafanaDataSource};
use monitoring_stack_operator::store::{kind_of, Fault, MemoryStore, Operation, StoreObject};

const CAPABILITY_DELAY: Duration = Duration::from_secs(10);

struct CountingRegistrar {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl WatchRegistrar for CountingRegistrar {
    async fn register<K: StoreObject>(&self, _namespace: Option<&str>) -> Result<(), WatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(WatchError {
                kind: kind_of::<K>(),
                message: "forbidden".to_string(),
            });
        }
        Ok(())
    }
}

struct GateContext {
    store: MemoryStore,
    registrar: CountingRegistrar,
}

impl GateContext {
    fn new(fail: bool) -> Self {
        Self {
            store: MemoryStore::new(),
            registrar: CountingRegistrar {
                calls: AtomicUsize::new(0),
                fail,
            },
        }
    }

    fn calls(&self) -> usize {
        self.registrar.calls.load(Ordering::SeqCst)
    }
}

impl ReconcileContext for GateContext {
    type Store = MemoryStore;

    fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn conflict_requeue(&self) -> Duration {
        Duration::from_secs(2)
    }
}

impl WatchContext for GateContext {
    type Registrar = CountingRegistrar;

    fn registrar(&self) -> &CountingRegistrar {
        &self.registrar
    }

    fn capability_requeue(&self) -> Duration {
        CAPABILITY_DELAY
    }
}

fn gate() -> WatchGate<GrafanaDataSource, Grafana> {
    WatchGate::new("grafana-watch", "default", Some("monitoring".to_string()))
}

#[tokio::test]
async fn test_missing_capability_requeues_without_error() {
    let ctx = GateContext::new(false);
    let gate = gate();
    ctx.store.inject::<GrafanaDataSource>(
        Operation::List,
        Fault::Unavailable("no matches for kind GrafanaDataSource".to_string()),
    );

    let result = gate.execute(&ctx).await;
    assert!(result.is_stop());
    assert!(!result.is_error());
    assert_eq!(result.requeue_after(), Requeue::After(CAPABILITY_DELAY));
    assert_eq!(ctx.calls(), 0);
    assert!(!gate.is_established());
}

#[tokio::test]
async fn test_registers_once_then_stays_open() {
    let ctx = GateContext::new(false);
    let gate = gate();

    for _ in 0..3 {
        let result = gate.execute(&ctx).await;
        assert!(!result.is_stop());
    }
    assert!(gate.is_established());
    assert_eq!(ctx.calls(), 1);
}

#[tokio::test]
async fn test_registration_failure_is_an_error_and_retried() {
    let ctx = GateContext::new(true);
    let gate = gate();

    let result = gate.execute(&ctx).await;
    assert!(result.is_error());
    assert!(!gate.is_established());

    let result = gate.execute(&ctx).await;
    assert!(result.is_error());
    assert_eq!(ctx.calls(), 2);
}

#[tokio::test]
async fn test_gates_do_not_share_state() {
    let ctx = GateContext::new(false);
    let first = gate();
    let second = gate();

    assert!(!first.execute(&ctx).await.is_stop());
    assert!(first.is_established());
    assert!(!second.is_established());
}
