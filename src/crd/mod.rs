//! # Custom Resource Definitions
//!
//! Resource types for the objects the operator manages or consumes.
//!
//! - `olm` - Operator Lifecycle Manager kinds (OperatorGroup, Subscription, InstallPlan, CSV)
//! - `grafana` - Grafana operator kinds (Grafana, GrafanaDataSource)
//! - `console` - OpenShift console kinds (ConsolePlugin)
//! - `uiplugin` - The operator's own UIPlugin CRD
//!
//! Only the fields the operator reads or manages are modelled. Unknown fields
//! sent by the API server are ignored on decode.

pub mod console;
pub mod grafana;
pub mod olm;
pub mod uiplugin;

pub use console::*;
pub use grafana::*;
pub use olm::*;
pub use uiplugin::*;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Plain environment variable, as carried by OLM subscription configs
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EnvVar {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

/// Label selector restricted to equality matches
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default, skip_serializing_if = "std::collections::BTreeMap::is_empty")]
    pub match_labels: std::collections::BTreeMap<String, String>,
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: String,
    /// Last transition time
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}
