//! Desired objects for the Grafana operator install.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;

use crate::constants::{
    GRAFANA_CHANNEL, GRAFANA_NAME, GRAFANA_PACKAGE, MANAGED_BY_LABEL, OPERATOR_GROUP_NAME,
    OPERATOR_NAME, PART_OF_LABEL, SUBSCRIPTION_NAME,
};
use crate::crd::{
    Approval, DeploymentStrategy, EnvVar, Grafana, GrafanaConfig, GrafanaConfigAuth,
    GrafanaConfigAuthAnonymous, GrafanaConfigLog, GrafanaConfigUsers, GrafanaDeployment,
    GrafanaIngress, GrafanaSpec, LabelSelector, OperatorGroup, OperatorGroupSpec, RollingUpdate,
    Subscription, SubscriptionConfig, SubscriptionSpec,
};

/// Labels on every object the install pipeline creates
pub fn common_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string())])
}

fn metadata(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(common_labels()),
        ..Default::default()
    }
}

pub fn namespace(name: &str) -> Namespace {
    Namespace {
        metadata: metadata(name, None),
        ..Default::default()
    }
}

pub fn operator_group(namespace: &str) -> OperatorGroup {
    OperatorGroup {
        metadata: metadata(OPERATOR_GROUP_NAME, Some(namespace)),
        spec: OperatorGroupSpec {
            target_namespaces: vec![namespace.to_string()],
        },
    }
}

pub fn subscription(namespace: &str, starting_csv: &str) -> Subscription {
    Subscription {
        metadata: metadata(SUBSCRIPTION_NAME, Some(namespace)),
        spec: SubscriptionSpec {
            package: GRAFANA_PACKAGE.to_string(),
            channel: GRAFANA_CHANNEL.to_string(),
            install_plan_approval: Approval::Manual,
            starting_csv: starting_csv.to_string(),
            config: Some(SubscriptionConfig {
                env: vec![EnvVar {
                    name: "DASHBOARD_NAMESPACES_ALL".to_string(),
                    value: "true".to_string(),
                }],
            }),
            ..Default::default()
        },
        status: None,
    }
}

pub fn grafana(namespace: &str) -> Grafana {
    Grafana {
        metadata: metadata(GRAFANA_NAME, Some(namespace)),
        spec: GrafanaSpec {
            ingress: Some(GrafanaIngress {
                enabled: true,
                path_type: "Prefix".to_string(),
                path: "/".to_string(),
            }),
            deployment: Some(GrafanaDeployment {
                replicas: Some(1),
                strategy: Some(DeploymentStrategy {
                    strategy_type: "RollingUpdate".to_string(),
                    rolling_update: Some(RollingUpdate {
                        max_unavailable: Some(0),
                        max_surge: Some(1),
                    }),
                }),
            }),
            dashboard_label_selector: vec![LabelSelector {
                match_labels: BTreeMap::from([(
                    PART_OF_LABEL.to_string(),
                    OPERATOR_NAME.to_string(),
                )]),
            }],
            config: GrafanaConfig {
                log: Some(GrafanaConfigLog {
                    mode: "console".to_string(),
                    level: "info".to_string(),
                }),
                auth: Some(GrafanaConfigAuth {
                    disable_login_form: Some(true),
                    disable_signout_menu: Some(true),
                }),
                auth_anonymous: Some(GrafanaConfigAuthAnonymous {
                    enabled: Some(true),
                }),
                users: Some(GrafanaConfigUsers {
                    viewers_can_edit: Some(true),
                }),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_pins_manual_approval() {
        let sub = subscription("ns", "grafana-operator.v4.1.0");
        assert_eq!(sub.spec.install_plan_approval, Approval::Manual);
        assert_eq!(sub.spec.starting_csv, "grafana-operator.v4.1.0");
        assert_eq!(sub.metadata.namespace.as_deref(), Some("ns"));
        let env = &sub.spec.config.unwrap().env;
        assert_eq!(env[0].name, "DASHBOARD_NAMESPACES_ALL");
    }

    #[test]
    fn test_grafana_config_serializes_with_ini_keys() {
        let value = serde_json::to_value(grafana("ns")).unwrap();
        assert_eq!(value["spec"]["config"]["auth.anonymous"]["enabled"], true);
        assert_eq!(value["spec"]["config"]["auth"]["disable_login_form"], true);
        assert_eq!(value["spec"]["deployment"]["strategy"]["type"], "RollingUpdate");
    }

    #[test]
    fn test_namespace_is_cluster_scoped_and_labelled() {
        let ns = namespace("ns");
        assert!(ns.metadata.namespace.is_none());
        assert_eq!(
            ns.metadata.labels.unwrap().get(MANAGED_BY_LABEL).map(String::as_str),
            Some(OPERATOR_NAME)
        );
    }
}
