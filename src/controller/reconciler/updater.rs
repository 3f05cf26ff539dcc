//! # Updater
//!
//! Converges one managed resource towards its desired state:
//!
//! 1. get the object by identity
//! 2. absent: create it, attaching the owner reference; a concurrent create
//!    (`AlreadyExists`) counts as success
//! 3. present and converged on every managed field: nothing to do
//! 4. present and drifted: copy the managed fields onto the observed object
//!    and update it; a conflict requeues without an error
//!
//! At most one write per invocation, never a delete.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use tracing::{debug, info};

use super::managed::{apply_managed, drifted_fields, ManagedResource};
use super::pipeline::{ReconcileContext, Step};
use super::result::{update_result, ReconcileResult};
use crate::observability::metrics;
use crate::store::{kind_of, ObjectKey, ObjectStore};

/// Pipeline step converging a single resource
#[derive(Debug, Clone)]
pub struct Updater<K> {
    name: String,
    desired: K,
    owner: Option<OwnerReference>,
}

impl<K: ManagedResource> Updater<K> {
    /// Step named after the resource's kind and identity
    pub fn new(desired: K) -> Self {
        let name = format!("{}/{}", kind_of::<K>(), ObjectKey::of(&desired));
        Self::named(name, desired)
    }

    pub fn named(name: impl Into<String>, desired: K) -> Self {
        Self {
            name: name.into(),
            desired,
            owner: None,
        }
    }

    /// Attribute the resource to `owner` for garbage collection
    pub fn owned_by(mut self, owner: Option<OwnerReference>) -> Self {
        self.owner = owner;
        self
    }
}

#[async_trait]
impl<C, K> Step<C> for Updater<K>
where
    C: ReconcileContext,
    K: ManagedResource,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &C) -> ReconcileResult {
        converge(
            ctx.store(),
            &self.desired,
            self.owner.as_ref(),
            ctx.conflict_requeue(),
        )
        .await
    }
}

/// Converge `desired` against the store
pub async fn converge<S, K>(
    store: &S,
    desired: &K,
    owner: Option<&OwnerReference>,
    conflict_requeue: Duration,
) -> ReconcileResult
where
    S: ObjectStore,
    K: ManagedResource,
{
    let kind = kind_of::<K>();
    let key = ObjectKey::of(desired);

    let observed = match store.get::<K>(&key).await {
        Ok(observed) => observed,
        Err(e) => return ReconcileResult::error(e),
    };

    let Some(observed) = observed else {
        let mut object = desired.clone();
        if let Some(owner) = owner {
            let refs = object.meta_mut().owner_references.get_or_insert_with(Vec::new);
            if !refs.iter().any(|r| r.uid == owner.uid) {
                refs.push(owner.clone());
            }
        }
        return match store.create(&object).await {
            Ok(_) => {
                info!(kind = %kind, resource = %key, "created");
                metrics::increment_writes(&kind, "create");
                ReconcileResult::next()
            }
            Err(e) if e.is_already_exists() => {
                debug!(kind = %kind, resource = %key, "created concurrently");
                ReconcileResult::next()
            }
            Err(e) => ReconcileResult::error(e),
        };
    };

    let drifted = match drifted_fields(desired, &observed) {
        Ok(drifted) => drifted,
        Err(e) => return ReconcileResult::error(e),
    };
    if drifted.is_empty() {
        debug!(kind = %kind, resource = %key, "converged");
        return ReconcileResult::next();
    }

    let updated = match apply_managed(desired, &observed) {
        Ok(updated) => updated,
        Err(e) => return ReconcileResult::error(e),
    };
    info!(kind = %kind, resource = %key, fields = ?drifted, "updating drifted resource");
    let result = store.update(&updated).await;
    if result.is_ok() {
        metrics::increment_writes(&kind, "update");
    }
    update_result(result, conflict_requeue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::reconciler::result::Requeue;
    use crate::store::{Fault, MemoryStore, Operation, Verb};
    use k8s_openapi::api::core::v1::ServiceAccount;
    use kube::api::ObjectMeta;
    use std::collections::BTreeMap;

    const CONFLICT: Duration = Duration::from_secs(2);

    fn service_account(team: &str) -> ServiceAccount {
        ServiceAccount {
            metadata: ObjectMeta {
                name: Some("plugin-sa".to_string()),
                namespace: Some("ns".to_string()),
                labels: Some(BTreeMap::from([("team".to_string(), team.to_string())])),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn owner() -> OwnerReference {
        OwnerReference {
            api_version: "observability.openshift.io/v1alpha1".to_string(),
            kind: "UIPlugin".to_string(),
            name: "dashboards".to_string(),
            uid: "owner-uid".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    #[tokio::test]
    async fn test_create_attaches_owner() {
        let store = MemoryStore::new();
        let result = converge(&store, &service_account("a"), Some(&owner()), CONFLICT).await;
        assert!(!result.is_stop());

        let stored: ServiceAccount = store
            .snapshot(&ObjectKey::namespaced("ns", "plugin-sa"))
            .unwrap();
        let refs = stored.metadata.owner_references.unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].uid, "owner-uid");
    }

    #[tokio::test]
    async fn test_drift_is_updated_once() {
        let store = MemoryStore::new();
        store.insert(&service_account("old"));

        let _ = converge(&store, &service_account("new"), None, CONFLICT).await;
        let _ = converge(&store, &service_account("new"), None, CONFLICT).await;

        let writes = store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].verb, Verb::Update);
    }

    #[tokio::test]
    async fn test_concurrent_create_is_benign() {
        let store = MemoryStore::new();
        store.inject::<ServiceAccount>(Operation::Create, Fault::AlreadyExists);
        let result = converge(&store, &service_account("a"), None, CONFLICT).await;
        assert!(!result.is_stop());
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_get_failure_is_error() {
        let store = MemoryStore::new();
        store.inject::<ServiceAccount>(Operation::Get, Fault::Unavailable("down".to_string()));
        let result = converge(&store, &service_account("a"), None, CONFLICT).await;
        assert!(result.is_error());
        assert_eq!(result.requeue_after(), Requeue::None);
    }
}
