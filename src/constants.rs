//! # Constants
//!
//! Default values and well-known names shared across the operator.

/// Namespace the Grafana operator is installed into
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "monitoring-stack-operator";

/// Field manager / operator name used for labels and server-side writes
pub const OPERATOR_NAME: &str = "monitoring-stack-operator";

/// Label recording which operator manages an object
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Label used by the Grafana CR to select dashboards
pub const PART_OF_LABEL: &str = "app.kubernetes.io/part-of";

/// Name of the OLM Subscription for the Grafana operator
pub const SUBSCRIPTION_NAME: &str = "monitoring-stack-operator-grafana-operator";

/// Name of the OLM OperatorGroup for the Grafana operator
pub const OPERATOR_GROUP_NAME: &str = "monitoring-stack-operator-grafana-operator";

/// Name of the managed Grafana CR
pub const GRAFANA_NAME: &str = "monitoring-stack-operator-grafana";

/// ClusterServiceVersion the Subscription pins and the install plan must target
pub const DEFAULT_GRAFANA_CSV: &str = "grafana-operator.v4.1.0";

/// OLM package name of the Grafana operator
pub const GRAFANA_PACKAGE: &str = "grafana-operator";

/// OLM channel of the Grafana operator
pub const GRAFANA_CHANNEL: &str = "v4";

/// Namespace probed for the GrafanaDataSource CRD before watching Grafana CRs
pub const GRAFANA_CAPABILITY_PROBE_NAMESPACE: &str = "default";

/// Periodic full resync of the install pipeline (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 30 * 60;

/// Requeue after an optimistic-concurrency conflict (seconds)
pub const DEFAULT_CONFLICT_REQUEUE_SECS: u64 = 2;

/// Requeue while a gated capability (CRD) is not installed (seconds)
pub const DEFAULT_CAPABILITY_REQUEUE_SECS: u64 = 10;

/// Minimum error backoff (seconds)
pub const DEFAULT_ERROR_BACKOFF_MIN_SECS: u64 = 5;

/// Maximum error backoff (seconds)
pub const DEFAULT_ERROR_BACKOFF_MAX_SECS: u64 = 300;

/// Fallback requeue when backoff state is unavailable (seconds)
pub const DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS: u64 = 60;

/// HTTP port for metrics and probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// How long to wait for the HTTP server to come up (seconds)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Poll interval while waiting for the HTTP server (milliseconds)
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Port the UI plugin containers serve on
pub const UI_PLUGIN_PORT: i32 = 9443;

/// Suffix appended to the UI plugin name for its ServiceAccount
pub const UI_PLUGIN_SERVICE_ACCOUNT_SUFFIX: &str = "-sa";

/// Annotation prefix for UI plugin pod templates
pub const UI_PLUGIN_ANNOTATION_PREFIX: &str = "observability.openshift.io/ui-plugin-";

/// Managed-by value stamped on UI plugin components
pub const UI_PLUGIN_MANAGER: &str = "observability-operator";

/// Default image of the dashboards console plugin
pub const DEFAULT_DASHBOARDS_PLUGIN_IMAGE: &str =
    "quay.io/openshift-observability-ui/console-dashboards-plugin:v0.1.0";

/// Default image of the troubleshooting panel console plugin
pub const DEFAULT_TROUBLESHOOTING_PANEL_IMAGE: &str =
    "quay.io/openshift-observability-ui/troubleshooting-panel-console-plugin:v0.1.0";

/// Namespace the dashboards plugin reads datasource ConfigMaps from
pub const DASHBOARDS_DATASOURCE_NAMESPACE: &str = "openshift-config-managed";

/// Mount path of the serving certificate in UI plugin pods
pub const SERVING_CERT_MOUNT_PATH: &str = "/var/serving-cert";

/// Mount path of the plugin ConfigMap in UI plugin pods
pub const PLUGIN_CONFIG_MOUNT_PATH: &str = "/etc/plugin/config";
