//! # Managed Fields
//!
//! Per-kind declaration of which parts of an object the operator owns, and the
//! comparison used to decide whether an observed object has drifted from the
//! desired one.
//!
//! Each managed field is a JSON pointer into the serialized object with a
//! matching mode:
//!
//! - `Merge` - for metadata maps other writers also add to. Every key set in
//!   the desired map must be present and equal; applying sets those keys and
//!   keeps the rest.
//! - `Subset` - every value set in the desired object must be present and
//!   equal in the observed object. Keys the desired object leaves unset are
//!   not compared, so server-defaulted fields never read as drift. Arrays are
//!   compared element-wise and must have the same length. Applying replaces
//!   the whole slot with the desired value.
//! - `Exact` - the observed value must equal the desired value, and a value
//!   absent (or empty) in the desired object must be absent in the observed
//!   one. Applying replaces the slot, or removes it.
//!
//! `Merge` and `Subset` pointers that are absent in the desired object are not
//! managed for that object. Maps and lists nested under a `Subset` pointer
//! that the operator fully owns are declared again as `Exact`, so removing a
//! key from the desired state is seen as drift.
//!
//! Everything outside the managed fields, resource version and identity
//! included, is kept from the observed object.

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Service, ServiceAccount};
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use serde_json::{Map, Value};

use super::result::ReconcilerError;
use crate::crd::{ConsolePlugin, Grafana, OperatorGroup, Subscription};
use crate::store::{kind_of, StoreObject};

/// How a managed field is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matching {
    Merge,
    Subset,
    Exact,
}

/// A managed part of an object, addressed by JSON pointer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedField {
    pub pointer: &'static str,
    pub matching: Matching,
}

impl ManagedField {
    pub const fn merge(pointer: &'static str) -> Self {
        Self {
            pointer,
            matching: Matching::Merge,
        }
    }

    pub const fn subset(pointer: &'static str) -> Self {
        Self {
            pointer,
            matching: Matching::Subset,
        }
    }

    pub const fn exact(pointer: &'static str) -> Self {
        Self {
            pointer,
            matching: Matching::Exact,
        }
    }
}

/// A kind the operator converges
pub trait ManagedResource: StoreObject {
    const MANAGED_FIELDS: &'static [ManagedField];
}

const LABELS: ManagedField = ManagedField::merge("/metadata/labels");
const ANNOTATIONS: ManagedField = ManagedField::merge("/metadata/annotations");
const SPEC: ManagedField = ManagedField::subset("/spec");
/// Spec of a custom resource whose typed form covers every field the operator sets
const OWNED_SPEC: ManagedField = ManagedField::exact("/spec");

impl ManagedResource for Namespace {
    const MANAGED_FIELDS: &'static [ManagedField] = &[LABELS];
}

impl ManagedResource for ServiceAccount {
    const MANAGED_FIELDS: &'static [ManagedField] = &[LABELS];
}

impl ManagedResource for Deployment {
    const MANAGED_FIELDS: &'static [ManagedField] = &[
        LABELS,
        SPEC,
        ManagedField::exact("/spec/template/metadata/annotations"),
        ManagedField::exact("/spec/template/spec/nodeSelector"),
        ManagedField::exact("/spec/template/spec/tolerations"),
    ];
}

impl ManagedResource for Service {
    const MANAGED_FIELDS: &'static [ManagedField] = &[LABELS, ANNOTATIONS, SPEC];
}

impl ManagedResource for ConfigMap {
    const MANAGED_FIELDS: &'static [ManagedField] = &[LABELS, ManagedField::exact("/data")];
}

impl ManagedResource for Role {
    const MANAGED_FIELDS: &'static [ManagedField] = &[LABELS, ManagedField::exact("/rules")];
}

impl ManagedResource for ClusterRole {
    const MANAGED_FIELDS: &'static [ManagedField] = &[LABELS, ManagedField::exact("/rules")];
}

impl ManagedResource for RoleBinding {
    const MANAGED_FIELDS: &'static [ManagedField] = &[
        LABELS,
        ManagedField::exact("/roleRef"),
        ManagedField::exact("/subjects"),
    ];
}

impl ManagedResource for ClusterRoleBinding {
    const MANAGED_FIELDS: &'static [ManagedField] = &[
        LABELS,
        ManagedField::exact("/roleRef"),
        ManagedField::exact("/subjects"),
    ];
}

impl ManagedResource for OperatorGroup {
    const MANAGED_FIELDS: &'static [ManagedField] = &[LABELS, OWNED_SPEC];
}

impl ManagedResource for Subscription {
    const MANAGED_FIELDS: &'static [ManagedField] = &[LABELS, SPEC];
}

impl ManagedResource for Grafana {
    const MANAGED_FIELDS: &'static [ManagedField] = &[LABELS, OWNED_SPEC];
}

impl ManagedResource for ConsolePlugin {
    const MANAGED_FIELDS: &'static [ManagedField] = &[LABELS, SPEC];
}

fn to_value<K: StoreObject>(obj: &K) -> Result<Value, ReconcilerError> {
    serde_json::to_value(obj).map_err(|source| ReconcilerError::Serialization {
        kind: kind_of::<K>(),
        source,
    })
}

/// Managed fields on which `observed` differs from `desired`
pub fn drifted_fields<K: ManagedResource>(
    desired: &K,
    observed: &K,
) -> Result<Vec<&'static str>, ReconcilerError> {
    let desired = to_value(desired)?;
    let observed = to_value(observed)?;
    Ok(K::MANAGED_FIELDS
        .iter()
        .filter(|field| {
            let want = set_value(&desired, field.pointer);
            let have = set_value(&observed, field.pointer);
            match (field.matching, want) {
                (Matching::Merge | Matching::Subset, None) => false,
                (Matching::Merge | Matching::Subset, Some(want)) => {
                    !have.is_some_and(|have| is_subset(want, have))
                }
                (Matching::Exact, want) => want != have,
            }
        })
        .map(|field| field.pointer)
        .collect())
}

pub fn is_converged<K: ManagedResource>(desired: &K, observed: &K) -> Result<bool, ReconcilerError> {
    Ok(drifted_fields(desired, observed)?.is_empty())
}

/// Copy the desired managed fields onto the observed object
pub fn apply_managed<K: ManagedResource>(desired: &K, observed: &K) -> Result<K, ReconcilerError> {
    let want = to_value(desired)?;
    let mut merged = to_value(observed)?;
    for field in K::MANAGED_FIELDS {
        match (field.matching, set_value(&want, field.pointer)) {
            (Matching::Merge, Some(value)) => {
                merge_into(pointer_entry(&mut merged, field.pointer), value);
            }
            (Matching::Subset | Matching::Exact, Some(value)) => {
                *pointer_entry(&mut merged, field.pointer) = value.clone();
            }
            (Matching::Exact, None) => remove_pointer(&mut merged, field.pointer),
            (Matching::Merge | Matching::Subset, None) => {}
        }
    }
    serde_json::from_value(merged).map_err(|source| ReconcilerError::Serialization {
        kind: kind_of::<K>(),
        source,
    })
}

/// Value at `pointer`, treating null and empty values as unset
fn set_value<'a>(root: &'a Value, pointer: &str) -> Option<&'a Value> {
    root.pointer(pointer).filter(|v| !is_empty(v))
}

/// True when every value set in `want` is present and equal in `have`
pub fn is_subset(want: &Value, have: &Value) -> bool {
    match (want, have) {
        (Value::Null, _) => true,
        (Value::Object(want), Value::Object(have)) => want.iter().all(|(k, w)| match have.get(k) {
            Some(h) => is_subset(w, h),
            None => is_empty(w),
        }),
        (Value::Object(want), _) => want.values().all(is_empty),
        (Value::Array(want), Value::Array(have)) => {
            want.len() == have.len() && want.iter().zip(have).all(|(w, h)| is_subset(w, h))
        }
        (want, have) => want == have,
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.values().all(is_empty),
        Value::Bool(_) | Value::Number(_) => false,
    }
}

fn merge_into(slot: &mut Value, want: &Value) {
    match (slot, want) {
        (_, Value::Null) => {}
        (Value::Object(have), Value::Object(want)) => {
            for (k, w) in want {
                merge_into(have.entry(k.clone()).or_insert(Value::Null), w);
            }
        }
        (slot, want) => *slot = want.clone(),
    }
}

fn unescape(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Mutable slot at `pointer`, creating intermediate objects as needed
fn pointer_entry<'a>(root: &'a mut Value, pointer: &str) -> &'a mut Value {
    pointer.split('/').skip(1).fold(root, |current, token| {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        match current {
            Value::Object(map) => map.entry(unescape(token)).or_insert(Value::Null),
            other => other,
        }
    })
}

fn remove_pointer(root: &mut Value, pointer: &str) {
    let Some((parent, last)) = pointer.rsplit_once('/') else {
        return;
    };
    if let Some(Value::Object(map)) = root.pointer_mut(parent) {
        map.remove(&unescape(last));
    }
}
