//! # Grafana Operator Resources
//!
//! Kinds from `integreatly.org/v1alpha1`, served by the Grafana operator once
//! OLM has installed it.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::LabelSelector;

/// Grafana instance managed by the Grafana operator
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Grafana",
    group = "integreatly.org",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress: Option<GrafanaIngress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<GrafanaDeployment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dashboard_label_selector: Vec<LabelSelector>,
    #[serde(default)]
    pub config: GrafanaConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaIngress {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaDeployment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<DeploymentStrategy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentStrategy {
    #[serde(rename = "type")]
    pub strategy_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rolling_update: Option<RollingUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RollingUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surge: Option<i32>,
}

/// Subset of grafana.ini the operator sets; keys follow grafana.ini naming
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct GrafanaConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<GrafanaConfigLog>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<GrafanaConfigAuth>,
    #[serde(
        rename = "auth.anonymous",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub auth_anonymous: Option<GrafanaConfigAuthAnonymous>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<GrafanaConfigUsers>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct GrafanaConfigLog {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub mode: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub level: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct GrafanaConfigAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_login_form: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disable_signout_menu: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct GrafanaConfigAuthAnonymous {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct GrafanaConfigUsers {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewers_can_edit: Option<bool>,
}

/// GrafanaDataSource; only listed, as a probe that the Grafana operator CRDs exist
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "GrafanaDataSource",
    group = "integreatly.org",
    version = "v1alpha1",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct GrafanaDataSourceSpec {
    #[serde(default)]
    pub name: String,
}
