//! # In-Memory Store
//!
//! [`ObjectStore`] kept in process. Mirrors the API server semantics the
//! reconcilers depend on:
//!
//! - resource versions bump on every write and `update` rejects stale versions
//! - `create` rejects duplicates
//! - `generation` bumps when anything outside metadata and status changes
//! - every write made through the trait is recorded, so callers can assert how
//!   many writes a reconciliation performed
//!
//! Faults can be queued to simulate conflicts and outages.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use super::{kind_of, ObjectKey, ObjectStore, Selector, StoreError, StoreObject};

/// Write verbs recorded in the write log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Create,
    Update,
    Delete,
    PatchStatus,
}

/// One write performed through the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteRecord {
    pub verb: Verb,
    pub kind: String,
    pub key: ObjectKey,
}

/// Operations a fault can be attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    List,
    Create,
    Update,
    Delete,
}

/// A one-shot failure returned by the next matching operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    Conflict,
    AlreadyExists,
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct StoredKey {
    kind: String,
    namespace: Option<String>,
    name: String,
}

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<StoredKey, Value>,
    next_version: u64,
    writes: Vec<WriteRecord>,
    faults: Vec<(Operation, String, Fault)>,
}

impl Inner {
    fn bump(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn take_fault(&mut self, op: Operation, kind: &str) -> Option<Fault> {
        let idx = self
            .faults
            .iter()
            .position(|(o, k, _)| *o == op && k == kind)?;
        Some(self.faults.remove(idx).2)
    }
}

/// In-process object store
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

fn stored_key<K: StoreObject>(key: &ObjectKey) -> StoredKey {
    StoredKey {
        kind: type_key::<K>(),
        namespace: key.namespace.clone(),
        name: key.name.clone(),
    }
}

fn type_key<K: StoreObject>() -> String {
    format!("{}/{}", K::api_version(&()), K::kind(&()))
}

fn encode<K: StoreObject>(obj: &K) -> Result<Value, StoreError> {
    serde_json::to_value(obj).map_err(|source| StoreError::Serialization {
        kind: kind_of::<K>(),
        source,
    })
}

fn decode<K: StoreObject>(value: Value) -> Result<K, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Serialization {
        kind: kind_of::<K>(),
        source,
    })
}

/// Everything except metadata and status, the part whose change bumps `generation`
fn spec_view(value: &Value) -> Value {
    let mut view = value.clone();
    if let Some(map) = view.as_object_mut() {
        map.remove("metadata");
        map.remove("status");
    }
    view
}

fn fault_error<K: StoreObject>(fault: Fault, key: &ObjectKey) -> StoreError {
    let kind = kind_of::<K>();
    match fault {
        Fault::Conflict => StoreError::Conflict {
            kind,
            key: key.clone(),
            message: "the object has been modified; please apply your changes to the latest version and try again".to_string(),
        },
        Fault::AlreadyExists => StoreError::AlreadyExists {
            kind,
            key: key.clone(),
        },
        Fault::Unavailable(message) => StoreError::Unavailable { kind, message },
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means a test panicked mid-write; the data is still usable.
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Seed an object as if another actor created it; not recorded as a write
    pub fn insert<K: StoreObject>(&self, obj: &K) -> K {
        let mut inner = self.lock();
        let mut obj = obj.clone();
        let version = inner.bump();
        let meta = obj.meta_mut();
        meta.resource_version = Some(version.clone());
        meta.uid.get_or_insert_with(|| format!("uid-{version}"));
        meta.generation.get_or_insert(1);
        let key = ObjectKey::of(&obj);
        let value = serde_json::to_value(&obj).unwrap_or(Value::Null);
        inner.objects.insert(stored_key::<K>(&key), value);
        obj
    }

    /// Mutate a stored object out of band (another controller, the API server);
    /// bumps the resource version but is not recorded as a write
    pub fn modify<K: StoreObject>(&self, key: &ObjectKey, f: impl FnOnce(&mut K)) -> Option<K> {
        let mut inner = self.lock();
        let skey = stored_key::<K>(key);
        let value = inner.objects.get(&skey)?.clone();
        let mut obj: K = serde_json::from_value(value).ok()?;
        f(&mut obj);
        let version = inner.bump();
        obj.meta_mut().resource_version = Some(version);
        let value = serde_json::to_value(&obj).ok()?;
        inner.objects.insert(skey, value);
        Some(obj)
    }

    /// Current stored copy of an object
    pub fn snapshot<K: StoreObject>(&self, key: &ObjectKey) -> Option<K> {
        let inner = self.lock();
        let value = inner.objects.get(&stored_key::<K>(key))?.clone();
        serde_json::from_value(value).ok()
    }

    pub fn contains<K: StoreObject>(&self, key: &ObjectKey) -> bool {
        self.lock().objects.contains_key(&stored_key::<K>(key))
    }

    /// Queue a one-shot fault for the next `op` on kind `K`
    pub fn inject<K: StoreObject>(&self, op: Operation, fault: Fault) {
        self.lock().faults.push((op, kind_of::<K>(), fault));
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.lock().writes.clone()
    }

    pub fn write_count(&self) -> usize {
        self.lock().writes.len()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError> {
        let value = {
            let mut inner = self.lock();
            if let Some(fault) = inner.take_fault(Operation::Get, &kind_of::<K>()) {
                return Err(fault_error::<K>(fault, key));
            }
            inner.objects.get(&stored_key::<K>(key)).cloned()
        };
        value.map(decode).transpose()
    }

    async fn list<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        selector: &Selector,
    ) -> Result<Vec<K>, StoreError> {
        let values: Vec<Value> = {
            let mut inner = self.lock();
            if let Some(fault) = inner.take_fault(Operation::List, &kind_of::<K>()) {
                let scope = ObjectKey {
                    namespace: namespace.map(str::to_string),
                    name: String::new(),
                };
                return Err(fault_error::<K>(fault, &scope));
            }
            let kind = type_key::<K>();
            inner
                .objects
                .iter()
                .filter(|(k, _)| k.kind == kind)
                .filter(|(k, _)| namespace.is_none() || k.namespace.as_deref() == namespace)
                .map(|(_, v)| v.clone())
                .collect()
        };
        let objects = values
            .into_iter()
            .map(decode::<K>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(objects
            .into_iter()
            .filter(|obj| selector.matches(obj.meta().labels.as_ref()))
            .collect())
    }

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        let mut inner = self.lock();
        if let Some(fault) = inner.take_fault(Operation::Create, &kind_of::<K>()) {
            return Err(fault_error::<K>(fault, &key));
        }
        let skey = stored_key::<K>(&key);
        if inner.objects.contains_key(&skey) {
            return Err(StoreError::AlreadyExists {
                kind: kind_of::<K>(),
                key,
            });
        }
        let mut created = obj.clone();
        let version = inner.bump();
        let meta = created.meta_mut();
        meta.resource_version = Some(version.clone());
        meta.uid = Some(format!("uid-{version}"));
        meta.generation = Some(1);
        inner.objects.insert(skey, encode(&created)?);
        inner.writes.push(WriteRecord {
            verb: Verb::Create,
            kind: kind_of::<K>(),
            key,
        });
        Ok(created)
    }

    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        let mut inner = self.lock();
        if let Some(fault) = inner.take_fault(Operation::Update, &kind_of::<K>()) {
            return Err(fault_error::<K>(fault, &key));
        }
        let skey = stored_key::<K>(&key);
        let Some(current) = inner.objects.get(&skey).cloned() else {
            return Err(StoreError::NotFound {
                kind: kind_of::<K>(),
                key,
            });
        };
        let current: K = decode(current)?;
        if current.meta().resource_version != obj.meta().resource_version {
            return Err(StoreError::Conflict {
                kind: kind_of::<K>(),
                key,
                message: format!(
                    "resource version {:?} is stale, current is {:?}",
                    obj.meta().resource_version,
                    current.meta().resource_version
                ),
            });
        }

        let mut updated = obj.clone();
        let spec_changed = spec_view(&encode(&current)?) != spec_view(&encode(obj)?);
        let version = inner.bump();
        let meta = updated.meta_mut();
        meta.resource_version = Some(version);
        meta.uid.clone_from(&current.meta().uid);
        let generation = current.meta().generation.unwrap_or(1);
        meta.generation = Some(if spec_changed { generation + 1 } else { generation });
        inner.objects.insert(skey, encode(&updated)?);
        inner.writes.push(WriteRecord {
            verb: Verb::Update,
            kind: kind_of::<K>(),
            key,
        });
        Ok(updated)
    }

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if let Some(fault) = inner.take_fault(Operation::Delete, &kind_of::<K>()) {
            return Err(fault_error::<K>(fault, key));
        }
        if inner.objects.remove(&stored_key::<K>(key)).is_none() {
            return Err(StoreError::NotFound {
                kind: kind_of::<K>(),
                key: key.clone(),
            });
        }
        inner.writes.push(WriteRecord {
            verb: Verb::Delete,
            kind: kind_of::<K>(),
            key: key.clone(),
        });
        Ok(())
    }

    async fn patch_status<K: StoreObject>(
        &self,
        key: &ObjectKey,
        status: Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let skey = stored_key::<K>(key);
        let version = inner.bump();
        let Some(current) = inner.objects.get_mut(&skey) else {
            return Err(StoreError::NotFound {
                kind: kind_of::<K>(),
                key: key.clone(),
            });
        };
        if let Some(map) = current.as_object_mut() {
            map.insert("status".to_string(), status);
            if let Some(meta) = map.get_mut("metadata").and_then(Value::as_object_mut) {
                meta.insert("resourceVersion".to_string(), Value::String(version));
            }
        }
        inner.writes.push(WriteRecord {
            verb: Verb::PatchStatus,
            kind: kind_of::<K>(),
            key: key.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn config_map(name: &str, value: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("k".to_string(), value.to_string())])),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_duplicate_create_fails() {
        let store = MemoryStore::new();
        store.create(&config_map("a", "1")).await.unwrap();
        let err = store.create(&config_map("a", "1")).await.unwrap_err();
        assert!(err.is_already_exists());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let store = MemoryStore::new();
        let created = store.create(&config_map("a", "1")).await.unwrap();
        let mut first = created.clone();
        first.data = Some(BTreeMap::from([("k".to_string(), "2".to_string())]));
        store.update(&first).await.unwrap();

        let mut stale = created;
        stale.data = Some(BTreeMap::from([("k".to_string(), "3".to_string())]));
        let err = store.update(&stale).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_bumps_generation_only_on_spec_change() {
        let store = MemoryStore::new();
        let created = store.create(&config_map("a", "1")).await.unwrap();

        let mut relabelled = created.clone();
        relabelled.metadata.labels = Some(BTreeMap::from([("x".to_string(), "y".to_string())]));
        let relabelled = store.update(&relabelled).await.unwrap();
        assert_eq!(relabelled.metadata.generation, Some(1));

        let mut changed = relabelled;
        changed.data = Some(BTreeMap::from([("k".to_string(), "2".to_string())]));
        let changed = store.update(&changed).await.unwrap();
        assert_eq!(changed.metadata.generation, Some(2));
    }

    #[tokio::test]
    async fn test_injected_fault_fires_once() {
        let store = MemoryStore::new();
        store.inject::<ConfigMap>(Operation::List, Fault::Unavailable("down".to_string()));
        assert!(store
            .list::<ConfigMap>(Some("ns"), &Selector::everything())
            .await
            .is_err());
        assert!(store
            .list::<ConfigMap>(Some("ns"), &Selector::everything())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .delete::<ConfigMap>(&ObjectKey::namespaced("ns", "missing"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
