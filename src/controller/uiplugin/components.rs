//! # UI Plugin Components
//!
//! Desired objects for a console plugin and the pipeline converging them.
//!
//! Every plugin gets a ServiceAccount, a Deployment serving the plugin over
//! TLS on port 9443, a Service fronting it, and a ConsolePlugin registering
//! it with the console. Plugins that need them also get a ConfigMap (mounted
//! into the pods, with its digest stamped on the pod template), namespaced
//! RBAC and cluster RBAC.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Capabilities, ConfigMap, ConfigMapVolumeSource, Container, ContainerPort, PodSecurityContext,
    PodSpec, PodTemplateSpec, SeccompProfile, SecretVolumeSource, SecurityContext, Service,
    ServiceAccount, ServicePort, ServiceSpec, Toleration, Volume, VolumeMount,
};
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;
use kube::Resource;

use crate::config::ControllerConfig;
use crate::constants::{
    DASHBOARDS_DATASOURCE_NAMESPACE, MANAGED_BY_LABEL, PART_OF_LABEL, PLUGIN_CONFIG_MOUNT_PATH,
    SERVING_CERT_MOUNT_PATH, UI_PLUGIN_ANNOTATION_PREFIX, UI_PLUGIN_MANAGER, UI_PLUGIN_PORT,
    UI_PLUGIN_SERVICE_ACCOUNT_SUFFIX,
};
use crate::controller::reconciler::{config_map_digest, stamp_template, Pipeline, ReconcileContext, Updater};
use crate::crd::{
    ConsolePlugin, ConsolePluginProxy, ConsolePluginProxyService, ConsolePluginService,
    ConsolePluginSpec, DeploymentConfig, UIPlugin, UIPluginType,
};

const SERVING_CERT_VOLUME: &str = "serving-cert";
const PLUGIN_CONFIG_VOLUME: &str = "plugin-config";
const SERVING_CERT_ANNOTATION: &str = "service.alpha.openshift.io/serving-cert-secret-name";

/// Everything that varies between plugin types
#[derive(Debug, Clone, Default)]
pub struct PluginInfo {
    /// Name of the Deployment, Service, serving-cert Secret and ConfigMap
    pub name: String,
    /// Name of the cluster-scoped ConsolePlugin
    pub console_name: String,
    pub display_name: String,
    pub image: String,
    pub extra_args: Vec<String>,
    /// Namespace the plugin's workload runs in
    pub namespace: String,
    pub proxies: Vec<ConsolePluginProxy>,
    pub config_map: Option<ConfigMap>,
    pub role: Option<Role>,
    pub role_binding: Option<RoleBinding>,
    pub cluster_roles: Vec<ClusterRole>,
    pub cluster_role_bindings: Vec<ClusterRoleBinding>,
}

impl PluginInfo {
    pub fn service_account_name(&self) -> String {
        format!("{}{}", self.name, UI_PLUGIN_SERVICE_ACCOUNT_SUFFIX)
    }

    fn service_account_subject(&self) -> Subject {
        Subject {
            kind: "ServiceAccount".to_string(),
            name: self.service_account_name(),
            namespace: Some(self.namespace.clone()),
            ..Default::default()
        }
    }
}

/// Labels shared by every component of a plugin
pub fn component_labels(plugin_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app.kubernetes.io/instance".to_string(), plugin_name.to_string()),
        (PART_OF_LABEL.to_string(), "UIPlugin".to_string()),
        (MANAGED_BY_LABEL.to_string(), UI_PLUGIN_MANAGER.to_string()),
    ])
}

/// Annotation carrying the plugin ConfigMap digest on the pod template
pub fn config_hash_annotation() -> String {
    format!("{UI_PLUGIN_ANNOTATION_PREFIX}config-hash")
}

fn meta(name: &str, namespace: Option<&str>, labels: BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        labels: Some(labels),
        ..Default::default()
    }
}

/// Resolve the components a plugin of the given type needs
pub fn plugin_info(plugin: &UIPlugin, config: &ControllerConfig) -> PluginInfo {
    let name = plugin.metadata.name.clone().unwrap_or_default();
    let namespace = config.operator_namespace.clone();
    let labels = component_labels(&name);

    let config_map = plugin.spec.config.as_ref().map(|data| ConfigMap {
        metadata: meta(&name, Some(&namespace), labels.clone()),
        data: Some(data.clone()),
        ..Default::default()
    });

    let mut info = PluginInfo {
        name: name.clone(),
        namespace: namespace.clone(),
        config_map,
        ..Default::default()
    };

    match plugin.spec.plugin_type {
        UIPluginType::Dashboards => {
            let role_name = format!("{name}-datasource-reader");
            info.console_name = "console-dashboards-plugin".to_string();
            info.display_name = "Console Enhanced Dashboards".to_string();
            info.image = config.dashboards_image.clone();
            info.proxies = vec![ConsolePluginProxy {
                proxy_type: "Service".to_string(),
                alias: "backend".to_string(),
                authorize: true,
                service: Some(ConsolePluginProxyService {
                    name: name.clone(),
                    namespace: namespace.clone(),
                    port: UI_PLUGIN_PORT,
                }),
            }];
            info.role = Some(Role {
                metadata: meta(&role_name, Some(DASHBOARDS_DATASOURCE_NAMESPACE), labels.clone()),
                rules: Some(vec![PolicyRule {
                    api_groups: Some(vec![String::new()]),
                    resources: Some(vec!["configmaps".to_string()]),
                    verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
                    ..Default::default()
                }]),
            });
            info.role_binding = Some(RoleBinding {
                metadata: meta(&role_name, Some(DASHBOARDS_DATASOURCE_NAMESPACE), labels),
                role_ref: RoleRef {
                    api_group: "rbac.authorization.k8s.io".to_string(),
                    kind: "Role".to_string(),
                    name: role_name,
                },
                subjects: Some(vec![info.service_account_subject()]),
            });
        }
        UIPluginType::TroubleshootingPanel => {
            let role_name = format!("{name}-reader");
            info.console_name = "troubleshooting-panel-console-plugin".to_string();
            info.display_name = "Troubleshooting Panel".to_string();
            info.image = config.troubleshooting_panel_image.clone();
            info.extra_args = vec!["-plugin-config-path=/etc/plugin/config/config.yaml".to_string()];
            info.proxies = vec![ConsolePluginProxy {
                proxy_type: "Service".to_string(),
                alias: "korrel8r".to_string(),
                authorize: true,
                service: Some(ConsolePluginProxyService {
                    name: "korrel8r".to_string(),
                    namespace: namespace.clone(),
                    port: UI_PLUGIN_PORT,
                }),
            }];
            info.cluster_roles = vec![ClusterRole {
                metadata: meta(&role_name, None, labels.clone()),
                rules: Some(vec![PolicyRule {
                    api_groups: Some(vec![String::new()]),
                    resources: Some(vec![
                        "pods".to_string(),
                        "events".to_string(),
                        "namespaces".to_string(),
                    ]),
                    verbs: vec!["get".to_string(), "list".to_string(), "watch".to_string()],
                    ..Default::default()
                }]),
                ..Default::default()
            }];
            info.cluster_role_bindings = vec![ClusterRoleBinding {
                metadata: meta(&role_name, None, labels),
                role_ref: RoleRef {
                    api_group: "rbac.authorization.k8s.io".to_string(),
                    kind: "ClusterRole".to_string(),
                    name: role_name,
                },
                subjects: Some(vec![info.service_account_subject()]),
            }];
        }
    }
    info
}

pub fn service_account(info: &PluginInfo) -> ServiceAccount {
    ServiceAccount {
        metadata: meta(
            &info.service_account_name(),
            Some(&info.namespace),
            component_labels(&info.name),
        ),
        ..Default::default()
    }
}

fn node_selector_and_tolerations(
    config: Option<&DeploymentConfig>,
) -> (BTreeMap<String, String>, Option<Vec<Toleration>>) {
    let default_selector = || BTreeMap::from([("kubernetes.io/os".to_string(), "linux".to_string())]);
    let Some(config) = config else {
        return (default_selector(), None);
    };
    let selector = config.node_selector.clone().unwrap_or_else(default_selector);
    let tolerations = if config.tolerations.is_empty() {
        None
    } else {
        Some(config.tolerations.iter().map(Toleration::from).collect())
    };
    (selector, tolerations)
}

pub fn deployment(info: &PluginInfo, config: Option<&DeploymentConfig>) -> Deployment {
    let labels = component_labels(&info.name);

    let mut args = vec![
        format!("-port={UI_PLUGIN_PORT}"),
        format!("-cert={SERVING_CERT_MOUNT_PATH}/tls.crt"),
        format!("-key={SERVING_CERT_MOUNT_PATH}/tls.key"),
    ];
    args.extend(info.extra_args.iter().cloned());

    let mut volumes = vec![Volume {
        name: SERVING_CERT_VOLUME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(info.name.clone()),
            default_mode: Some(420),
            ..Default::default()
        }),
        ..Default::default()
    }];
    let mut volume_mounts = vec![VolumeMount {
        name: SERVING_CERT_VOLUME.to_string(),
        read_only: Some(true),
        mount_path: SERVING_CERT_MOUNT_PATH.to_string(),
        ..Default::default()
    }];
    if info.config_map.is_some() {
        volumes.push(Volume {
            name: PLUGIN_CONFIG_VOLUME.to_string(),
            config_map: Some(ConfigMapVolumeSource {
                name: info.name.clone().into(),
                ..Default::default()
            }),
            ..Default::default()
        });
        volume_mounts.push(VolumeMount {
            name: PLUGIN_CONFIG_VOLUME.to_string(),
            read_only: Some(true),
            mount_path: PLUGIN_CONFIG_MOUNT_PATH.to_string(),
            ..Default::default()
        });
    }

    let (node_selector, tolerations) = node_selector_and_tolerations(config);

    let mut template = PodTemplateSpec {
        metadata: Some(ObjectMeta {
            labels: Some(labels.clone()),
            ..Default::default()
        }),
        spec: Some(PodSpec {
            service_account_name: Some(info.service_account_name()),
            containers: vec![Container {
                name: info.name.clone(),
                image: Some(info.image.clone()),
                ports: Some(vec![ContainerPort {
                    container_port: UI_PLUGIN_PORT,
                    name: Some("web".to_string()),
                    ..Default::default()
                }]),
                termination_message_policy: Some("FallbackToLogsOnError".to_string()),
                security_context: Some(SecurityContext {
                    run_as_non_root: Some(true),
                    allow_privilege_escalation: Some(false),
                    capabilities: Some(Capabilities {
                        drop: Some(vec!["ALL".to_string()]),
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                volume_mounts: Some(volume_mounts),
                args: Some(args),
                ..Default::default()
            }],
            volumes: Some(volumes),
            node_selector: Some(node_selector),
            tolerations,
            restart_policy: Some("Always".to_string()),
            dns_policy: Some("ClusterFirst".to_string()),
            security_context: Some(PodSecurityContext {
                run_as_non_root: Some(true),
                seccomp_profile: Some(SeccompProfile {
                    type_: "RuntimeDefault".to_string(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }),
    };
    if let Some(config_map) = &info.config_map {
        stamp_template(&mut template, &config_hash_annotation(), config_map_digest(config_map));
    }

    Deployment {
        metadata: meta(&info.name, Some(&info.namespace), labels.clone()),
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            },
            template,
            progress_deadline_seconds: Some(300),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn service(info: &PluginInfo) -> Service {
    let labels = component_labels(&info.name);
    let mut metadata = meta(&info.name, Some(&info.namespace), labels.clone());
    metadata.annotations = Some(BTreeMap::from([(
        SERVING_CERT_ANNOTATION.to_string(),
        info.name.clone(),
    )]));
    Service {
        metadata,
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                port: UI_PLUGIN_PORT,
                name: Some("http".to_string()),
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::Int(UI_PLUGIN_PORT)),
                ..Default::default()
            }]),
            selector: Some(labels),
            type_: Some("ClusterIP".to_string()),
            ..Default::default()
        }),
        status: None,
    }
}

pub fn console_plugin(info: &PluginInfo) -> ConsolePlugin {
    ConsolePlugin {
        metadata: meta(&info.console_name, None, component_labels(&info.name)),
        spec: ConsolePluginSpec {
            display_name: info.display_name.clone(),
            service: ConsolePluginService {
                name: info.name.clone(),
                namespace: info.namespace.clone(),
                port: UI_PLUGIN_PORT,
                base_path: "/".to_string(),
            },
            proxy: info.proxies.clone(),
        },
    }
}

/// Pipeline converging every component of `plugin`, each owned by it
pub fn component_pipeline<C>(plugin: &UIPlugin, info: &PluginInfo) -> Pipeline<C>
where
    C: ReconcileContext + 'static,
{
    let owner: Option<OwnerReference> = plugin.controller_owner_ref(&());
    let mut pipeline = Pipeline::new("uiplugin")
        .step(Updater::new(service_account(info)).owned_by(owner.clone()))
        .step(Updater::new(deployment(info, plugin.spec.deployment.as_ref())).owned_by(owner.clone()))
        .step(Updater::new(service(info)).owned_by(owner.clone()))
        .step(Updater::new(console_plugin(info)).owned_by(owner.clone()));

    if let Some(role) = &info.role {
        pipeline = pipeline.step(Updater::new(role.clone()).owned_by(owner.clone()));
    }
    if let Some(binding) = &info.role_binding {
        pipeline = pipeline.step(Updater::new(binding.clone()).owned_by(owner.clone()));
    }
    if let Some(config_map) = &info.config_map {
        pipeline = pipeline.step(Updater::new(config_map.clone()).owned_by(owner.clone()));
    }
    for role in &info.cluster_roles {
        pipeline = pipeline.step(Updater::new(role.clone()).owned_by(owner.clone()));
    }
    for binding in &info.cluster_role_bindings {
        pipeline = pipeline.step(Updater::new(binding.clone()).owned_by(owner.clone()));
    }
    pipeline
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Toleration as PluginToleration, UIPluginSpec};

    fn plugin(plugin_type: UIPluginType, config: Option<BTreeMap<String, String>>) -> UIPlugin {
        UIPlugin::new(
            "dashboards",
            UIPluginSpec {
                plugin_type,
                deployment: None,
                config,
            },
        )
    }

    #[test]
    fn test_dashboards_info_has_namespaced_rbac() {
        let info = plugin_info(&plugin(UIPluginType::Dashboards, None), &ControllerConfig::default());
        assert_eq!(info.service_account_name(), "dashboards-sa");
        assert!(info.role.is_some());
        assert!(info.role_binding.is_some());
        assert!(info.cluster_roles.is_empty());
        assert!(info.config_map.is_none());
    }

    #[test]
    fn test_default_node_selector_without_overrides() {
        let info = plugin_info(&plugin(UIPluginType::Dashboards, None), &ControllerConfig::default());
        let deployment = deployment(&info, None);
        let pod = deployment.spec.unwrap().template.spec.unwrap();
        assert_eq!(
            pod.node_selector.unwrap().get("kubernetes.io/os").map(String::as_str),
            Some("linux")
        );
        assert!(pod.tolerations.is_none());
    }

    #[test]
    fn test_deployment_config_overrides_scheduling() {
        let info = plugin_info(&plugin(UIPluginType::Dashboards, None), &ControllerConfig::default());
        let overrides = DeploymentConfig {
            node_selector: Some(BTreeMap::from([("role".to_string(), "infra".to_string())])),
            tolerations: vec![PluginToleration {
                key: Some("infra".to_string()),
                effect: Some("NoSchedule".to_string()),
                ..Default::default()
            }],
        };
        let pod = deployment(&info, Some(&overrides)).spec.unwrap().template.spec.unwrap();
        assert!(pod.node_selector.unwrap().contains_key("role"));
        assert_eq!(pod.tolerations.unwrap()[0].key.as_deref(), Some("infra"));
    }

    #[test]
    fn test_config_map_is_mounted_and_hashed() {
        let config = BTreeMap::from([("a".to_string(), "1".to_string())]);
        let info = plugin_info(
            &plugin(UIPluginType::TroubleshootingPanel, Some(config)),
            &ControllerConfig::default(),
        );
        let deployment = deployment(&info, None);
        let template = deployment.spec.unwrap().template;
        let annotations = template.metadata.unwrap().annotations.unwrap();
        assert_eq!(annotations[&config_hash_annotation()].len(), 32);
        let mounts = template.spec.unwrap().containers[0].volume_mounts.clone().unwrap();
        assert!(mounts.iter().any(|m| m.mount_path == PLUGIN_CONFIG_MOUNT_PATH));
    }

    #[test]
    fn test_service_requests_serving_cert() {
        let info = plugin_info(&plugin(UIPluginType::Dashboards, None), &ControllerConfig::default());
        let service = service(&info);
        assert_eq!(
            service.metadata.annotations.unwrap()[SERVING_CERT_ANNOTATION],
            "dashboards"
        );
        assert_eq!(service.spec.unwrap().ports.unwrap()[0].port, 9443);
    }
}
