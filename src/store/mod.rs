//! # Object Store
//!
//! The remote resource store as seen by the reconcilers: get, list, create,
//! update, delete and status patches over any resource kind, with the error
//! classes the reconcilers branch on (not found, already exists, conflict).
//!
//! - `cluster` - `KubeStore`, backed by the Kubernetes API server
//! - `memory` - `MemoryStore`, an in-process store with optimistic concurrency

pub mod cluster;
pub mod memory;

pub use cluster::KubeStore;
pub use memory::{Fault, MemoryStore, Operation, Verb, WriteRecord};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Any resource type the store can read and write
pub trait StoreObject:
    kube::Resource<DynamicType = ()>
    + Clone
    + Serialize
    + DeserializeOwned
    + fmt::Debug
    + Send
    + Sync
    + 'static
{
}

impl<K> StoreObject for K where
    K: kube::Resource<DynamicType = ()>
        + Clone
        + Serialize
        + DeserializeOwned
        + fmt::Debug
        + Send
        + Sync
        + 'static
{
}

/// Identity of an object within its kind: cluster scoped when `namespace` is `None`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            name: name.into(),
        }
    }

    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key of an existing object, taken from its metadata
    pub fn of<K: kube::Resource>(obj: &K) -> Self {
        let meta = obj.meta();
        Self {
            namespace: meta.namespace.clone(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}/{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Equality-based label selector; empty selects everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    labels: BTreeMap<String, String>,
}

impl Selector {
    pub fn everything() -> Self {
        Self::default()
    }

    pub fn labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn matches(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        self.labels
            .iter()
            .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in &self.labels {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{k}={v}")?;
            first = false;
        }
        Ok(())
    }
}

/// Store errors, classified by how reconcilers react to them
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: ObjectKey },
    #[error("{kind} {key} already exists")]
    AlreadyExists { kind: String, key: ObjectKey },
    #[error("conflict writing {kind} {key}: {message}")]
    Conflict {
        kind: String,
        key: ObjectKey,
        message: String,
    },
    #[error("request for {kind} {key} failed: {source}")]
    Api {
        kind: String,
        key: ObjectKey,
        #[source]
        source: kube::Error,
    },
    #[error("failed to encode or decode {kind}: {source}")]
    Serialization {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{kind} store unavailable: {message}")]
    Unavailable { kind: String, message: String },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

/// The remote store interface consumed by the reconcilers
///
/// `get` reports absence as `Ok(None)`; `create` reports duplicates as
/// [`StoreError::AlreadyExists`]; `update` reports stale resource versions as
/// [`StoreError::Conflict`].
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get<K: StoreObject>(&self, key: &ObjectKey) -> Result<Option<K>, StoreError>;

    /// List objects of a kind; `None` namespace lists across all namespaces
    async fn list<K: StoreObject>(
        &self,
        namespace: Option<&str>,
        selector: &Selector,
    ) -> Result<Vec<K>, StoreError>;

    async fn create<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError>;

    /// Replace an object; the object's resource version must be current
    async fn update<K: StoreObject>(&self, obj: &K) -> Result<K, StoreError>;

    async fn delete<K: StoreObject>(&self, key: &ObjectKey) -> Result<(), StoreError>;

    /// Merge-patch the status subresource
    async fn patch_status<K: StoreObject>(
        &self,
        key: &ObjectKey,
        status: serde_json::Value,
    ) -> Result<(), StoreError>;
}

/// Kind name of a resource type, used in logs and error messages
pub fn kind_of<K: kube::Resource<DynamicType = ()>>() -> String {
    K::kind(&()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_key_display() {
        assert_eq!(ObjectKey::namespaced("ns", "a").to_string(), "ns/a");
        assert_eq!(ObjectKey::cluster("a").to_string(), "a");
    }

    #[test]
    fn test_selector_matches_subset_of_labels() {
        let selector = Selector::labels([("app", "x")]);
        let labels = BTreeMap::from([
            ("app".to_string(), "x".to_string()),
            ("tier".to_string(), "web".to_string()),
        ]);
        assert!(selector.matches(Some(&labels)));
        assert!(!selector.matches(None));
        assert!(Selector::everything().matches(None));
    }

    #[test]
    fn test_selector_display_is_sorted() {
        let selector = Selector::labels([("b", "2"), ("a", "1")]);
        assert_eq!(selector.to_string(), "a=1,b=2");
    }
}
