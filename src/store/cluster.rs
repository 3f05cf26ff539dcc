//! # Kubernetes Store
//!
//! [`ObjectStore`] over the Kubernetes API server.
//!
//! Every kind goes through `Api<DynamicObject>` built from the kind's
//! `ApiResource`, so typed OLM, Grafana and console kinds and built-in
//! k8s-openapi kinds share one code path. Objects are namespaced or cluster
//! scoped according to their key.

use async_trait::async_trait;
use kube::api::{Api, ApiResource, DeleteParams, DynamicObject, ListParams, Patch, PatchParams, PostParams};
use kube::Client;
use tracing::debug;

use super::{kind_of, ObjectKey, ObjectStore, Selector, StoreError, StoreObject};
use crate::constants::OPERATOR_NAME;

/// Store backed by a live cluster
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api<K: StoreObject>(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        let ar = ApiResource::erase::<K>(&());
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &ar),
            None => Api::all_with(self.client.clone(), &ar),
        }
    }
}

fn to_dynamic<K: StoreObject>(obj: &K) -> Result<DynamicObject, StoreError> {
    serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(|source| StoreError::Serialization {
            kind: kind_of::<K>(),
            source,
        })
}

fn from_dynamic<K: StoreObject>(obj: DynamicObject) -> Result<K, StoreError> {
    serde_json::to_value(obj)
        .and_then(serde_json::from_value)
        .map_err(|source| StoreError::Serialization {
            kind: kind_of::<K>(),
            source,
        })
}

/// Map an API error onto the store's error classes
pub(crate) fn classify(kind: String, key: &ObjectKey, err: kube::Error) -> StoreError {
    if let kube::Error::Api(response) = &err {
        match (response.code, response.reason.as_str()) {
            (404, _) => {
                return StoreError::NotFound {
                    kind,
                    key: key.clone(),
                }
            }
            (409, "AlreadyExists") => {
                return StoreError::AlreadyExists {
                    kind,
                    key: key.clone(),
                }
            }
            (409, _) => {
                return StoreError::Conflict {
                    kind,
                    key: key.clone(),
                    message: response.message.clone(),
                }
            }
            _ => {}
        }
    }
    StoreError::Api {
        kind,
        key: key.clone(),
        source: err,
    }
}

#[async_trait]
impl ObjectStore for KubeStore {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError> {
        let api = self.api::<K>(key.namespace.as_deref());
        match api.get_opt(&key.name).await {
            Ok(Some(obj)) => from_dynamic(obj).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(classify(kind_of::<K>(), key, e)),
        }
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        selector: &Selector,
    ) -> Result<Vec<K>, StoreError> {
        let api = self.api::<K>(namespace);
        let mut params = ListParams::default();
        if !selector.is_empty() {
            params = params.labels(&selector.to_string());
        }
        let scope = ObjectKey {
            namespace: namespace.map(str::to_string),
            name: String::new(),
        };
        let list = api
            .list(&params)
            .await
            .map_err(|e| classify(kind_of::<K>(), &scope, e))?;
        debug!(
            kind = %kind_of::<K>(),
            namespace = namespace.unwrap_or("*"),
            count = list.items.len(),
            "store.list"
        );
        list.items.into_iter().map(from_dynamic).collect()
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        let api = self.api::<K>(key.namespace.as_deref());
        let created = api
            .create(&PostParams::default(), &to_dynamic(obj)?)
            .await
            .map_err(|e| classify(kind_of::<K>(), &key, e))?;
        from_dynamic(created)
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        let api = self.api::<K>(key.namespace.as_deref());
        let updated = api
            .replace(&key.name, &PostParams::default(), &to_dynamic(obj)?)
            .await
            .map_err(|e| classify(kind_of::<K>(), &key, e))?;
        from_dynamic(updated)
    }

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let api = self.api::<K>(key.namespace.as_deref());
        api.delete(&key.name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| classify(kind_of::<K>(), key, e))
    }

    async fn patch_status<K: StoreObject>(
        &self,
        key: &ObjectKey,
        status: serde_json::Value,
    ) -> Result<(), StoreError> {
        let api = self.api::<K>(key.namespace.as_deref());
        let patch = serde_json::json!({ "status": status });
        api.patch_status(
            &key.name,
            &PatchParams::apply(OPERATOR_NAME),
            &Patch::Merge(&patch),
        )
        .await
        .map(|_| ())
        .map_err(|e| classify(kind_of::<K>(), key, e))
    }
}
