//! # Controller Configuration
//!
//! Reconciler settings loaded from environment variables.

use std::time::Duration;

use super::env_var_or_default;

/// Reconciler configuration
///
/// All settings have defaults and can be overridden via environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace the Grafana operator is installed into
    pub operator_namespace: String,
    /// ClusterServiceVersion the Subscription pins and the install plan must target
    pub grafana_csv: String,
    /// Periodic resync of the install pipeline (seconds)
    pub resync_interval_secs: u64,
    /// Requeue after an optimistic-concurrency conflict (seconds)
    pub conflict_requeue_secs: u64,
    /// Requeue while a gated CRD is not yet installed (seconds)
    pub capability_requeue_secs: u64,
    /// Error backoff lower bound (seconds)
    pub error_backoff_min_secs: u64,
    /// Error backoff upper bound (seconds)
    pub error_backoff_max_secs: u64,
    /// Run the Grafana operator install pipeline
    pub grafana_operator_enabled: bool,
    /// Run the UIPlugin controller
    pub ui_plugins_enabled: bool,
    /// Image of the dashboards console plugin
    pub dashboards_image: String,
    /// Image of the troubleshooting panel console plugin
    pub troubleshooting_panel_image: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            operator_namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            grafana_csv: DEFAULT_GRAFANA_CSV.to_string(),
            resync_interval_secs: DEFAULT_RESYNC_INTERVAL_SECS,
            conflict_requeue_secs: DEFAULT_CONFLICT_REQUEUE_SECS,
            capability_requeue_secs: DEFAULT_CAPABILITY_REQUEUE_SECS,
            error_backoff_min_secs: DEFAULT_ERROR_BACKOFF_MIN_SECS,
            error_backoff_max_secs: DEFAULT_ERROR_BACKOFF_MAX_SECS,
            grafana_operator_enabled: true,
            ui_plugins_enabled: true,
            dashboards_image: DEFAULT_DASHBOARDS_PLUGIN_IMAGE.to_string(),
            troubleshooting_panel_image: DEFAULT_TROUBLESHOOTING_PANEL_IMAGE.to_string(),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            operator_namespace: env_var_or_default(
                "OPERATOR_NAMESPACE",
                defaults.operator_namespace,
            ),
            grafana_csv: env_var_or_default("GRAFANA_OPERATOR_CSV", defaults.grafana_csv),
            resync_interval_secs: env_var_or_default(
                "RESYNC_INTERVAL_SECS",
                defaults.resync_interval_secs,
            ),
            conflict_requeue_secs: env_var_or_default(
                "CONFLICT_REQUEUE_SECS",
                defaults.conflict_requeue_secs,
            ),
            capability_requeue_secs: env_var_or_default(
                "CAPABILITY_REQUEUE_SECS",
                defaults.capability_requeue_secs,
            ),
            error_backoff_min_secs: env_var_or_default(
                "ERROR_BACKOFF_MIN_SECS",
                defaults.error_backoff_min_secs,
            ),
            error_backoff_max_secs: env_var_or_default(
                "ERROR_BACKOFF_MAX_SECS",
                defaults.error_backoff_max_secs,
            ),
            grafana_operator_enabled: env_var_or_default(
                "GRAFANA_OPERATOR_ENABLED",
                defaults.grafana_operator_enabled,
            ),
            ui_plugins_enabled: env_var_or_default(
                "UI_PLUGINS_ENABLED",
                defaults.ui_plugins_enabled,
            ),
            dashboards_image: env_var_or_default(
                "DASHBOARDS_PLUGIN_IMAGE",
                defaults.dashboards_image,
            ),
            troubleshooting_panel_image: env_var_or_default(
                "TROUBLESHOOTING_PANEL_IMAGE",
                defaults.troubleshooting_panel_image,
            ),
        }
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_secs(self.resync_interval_secs)
    }

    pub fn conflict_requeue(&self) -> Duration {
        Duration::from_secs(self.conflict_requeue_secs)
    }

    pub fn capability_requeue(&self) -> Duration {
        Duration::from_secs(self.capability_requeue_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.operator_namespace, "monitoring-stack-operator");
        assert_eq!(config.grafana_csv, "grafana-operator.v4.1.0");
        assert_eq!(config.resync_interval(), Duration::from_secs(1800));
        assert_eq!(config.conflict_requeue(), Duration::from_secs(2));
        assert_eq!(config.capability_requeue(), Duration::from_secs(10));
    }

    #[test]
    fn test_unparseable_env_falls_back_to_default() {
        std::env::set_var("MSO_TEST_UNPARSEABLE_SECS", "soon");
        let value: u64 = env_var_or_default("MSO_TEST_UNPARSEABLE_SECS", 7);
        assert_eq!(value, 7);
    }
}
