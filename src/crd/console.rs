//! # Console Resources
//!
//! `ConsolePlugin` from `console.openshift.io/v1alpha1`. Cluster scoped.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Registers a dynamic plugin with the OpenShift console
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "ConsolePlugin",
    group = "console.openshift.io",
    version = "v1alpha1"
)]
#[serde(rename_all = "camelCase")]
pub struct ConsolePluginSpec {
    pub display_name: String,
    pub service: ConsolePluginService,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proxy: Vec<ConsolePluginProxy>,
}

/// Service serving the plugin assets
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsolePluginService {
    pub name: String,
    pub namespace: String,
    pub port: i32,
    #[serde(default)]
    pub base_path: String,
}

/// Backend the console proxies plugin requests to
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsolePluginProxy {
    #[serde(rename = "type")]
    pub proxy_type: String,
    pub alias: String,
    #[serde(default)]
    pub authorize: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ConsolePluginProxyService>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConsolePluginProxyService {
    pub name: String,
    pub namespace: String,
    pub port: i32,
}
