//! # OLM Resources
//!
//! Operator Lifecycle Manager kinds from `operators.coreos.com`.
//!
//! The operator creates OperatorGroups and Subscriptions, approves InstallPlans
//! produced by OLM, and deletes ClusterServiceVersions when a subscription is
//! re-pinned to a different version.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::EnvVar;

/// OperatorGroup selects the namespaces an OLM-installed operator serves
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "OperatorGroup",
    group = "operators.coreos.com",
    version = "v1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct OperatorGroupSpec {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_namespaces: Vec<String>,
}

/// Whether OLM may install plans without an explicit approval
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum Approval {
    #[default]
    Automatic,
    Manual,
}

/// Subscription tells OLM which package, channel and version to install
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Subscription",
    group = "operators.coreos.com",
    version = "v1alpha1",
    namespaced,
    status = "SubscriptionStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionSpec {
    /// CatalogSource name
    #[serde(rename = "source", default, skip_serializing_if = "String::is_empty")]
    pub catalog_source: String,
    /// CatalogSource namespace
    #[serde(
        rename = "sourceNamespace",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub catalog_source_namespace: String,
    /// Package name
    #[serde(rename = "name")]
    pub package: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
    #[serde(default)]
    pub install_plan_approval: Approval,
    /// The CSV OLM should start from
    #[serde(
        rename = "startingCSV",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub starting_csv: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<SubscriptionConfig>,
}

/// Overrides applied by OLM to the installed operator's deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

/// Subscription status as reported by OLM
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStatus {
    /// CSV currently installed for this subscription
    #[serde(rename = "installedCSV", default, skip_serializing_if = "Option::is_none")]
    pub installed_csv: Option<String>,
    #[serde(rename = "currentCSV", default, skip_serializing_if = "Option::is_none")]
    pub current_csv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// InstallPlan is created by OLM for every pending install or upgrade
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "InstallPlan",
    group = "operators.coreos.com",
    version = "v1alpha1",
    namespaced,
    status = "InstallPlanStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InstallPlanSpec {
    /// CSVs this plan installs; the first entry is the plan's target version
    #[serde(default)]
    pub cluster_service_version_names: Vec<String>,
    #[serde(default)]
    pub approval: Approval,
    #[serde(default)]
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
}

/// InstallPlan status; bundle lookups are filled in once OLM has resolved the plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstallPlanStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bundle_lookups: Vec<BundleLookup>,
}

/// A bundle OLM must unpack before the plan can be executed
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleLookup {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<String>,
}

/// ClusterServiceVersion records an installed operator version
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ClusterServiceVersion",
    group = "operators.coreos.com",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct ClusterServiceVersionSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}
