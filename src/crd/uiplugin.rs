//! # UIPlugin
//!
//! The operator's own CRD. Each UIPlugin declares a console plugin; the
//! operator deploys and converges every component the plugin needs.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::Condition;

/// UIPlugin Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: observability.openshift.io/v1alpha1
/// kind: UIPlugin
/// metadata:
///   name: dashboards
/// spec:
///   type: Dashboards
///   deployment:
///     nodeSelector:
///       node-role.kubernetes.io/infra: ""
///   config:
///     refreshInterval: "30s"
/// ```
#[derive(CustomResource, Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "UIPlugin",
    group = "observability.openshift.io",
    version = "v1alpha1",
    status = "UIPluginStatus",
    shortname = "uip",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.type"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct UIPluginSpec {
    /// Which console plugin to deploy
    #[serde(rename = "type")]
    pub plugin_type: UIPluginType,
    /// Scheduling overrides for the plugin deployment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentConfig>,
    /// Plugin configuration, rendered into a ConfigMap mounted by the plugin.
    /// Any change rolls the plugin deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BTreeMap<String, String>>,
}

/// Supported console plugins
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum UIPluginType {
    Dashboards,
    TroubleshootingPanel,
}

impl UIPluginType {
    pub fn as_str(self) -> &'static str {
        match self {
            UIPluginType::Dashboards => "Dashboards",
            UIPluginType::TroubleshootingPanel => "TroubleshootingPanel",
        }
    }
}

/// Deployment scheduling overrides
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// Replaces the default `kubernetes.io/os: linux` node selector when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
}

/// Pod toleration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Toleration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toleration_seconds: Option<i64>,
}

impl From<&Toleration> for k8s_openapi::api::core::v1::Toleration {
    fn from(t: &Toleration) -> Self {
        Self {
            key: t.key.clone(),
            operator: t.operator.clone(),
            value: t.value.clone(),
            effect: t.effect.clone(),
            toleration_seconds: t.toleration_seconds,
        }
    }
}

/// Status of the UIPlugin resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UIPluginStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub observed_generation: Option<i64>,
}
