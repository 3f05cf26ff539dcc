//! # Command Line
//!
//! Command-line overrides for the operator binary. Every flag is optional;
//! unset flags keep the value loaded from the environment.
//!
//! ```bash
//! monitoring-stack-operator --namespace monitoring --grafana-csv grafana-operator.v4.2.0
//! monitoring-stack-operator --disable-ui-plugins
//! ```

use clap::Parser;

use crate::config::{ControllerConfig, ServerConfig};

#[derive(Parser, Debug, Default)]
#[command(name = "monitoring-stack-operator")]
#[command(about = "Installs and converges the monitoring stack", long_about = None)]
pub struct Cli {
    /// Namespace the Grafana operator and UI plugins are deployed into
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// ClusterServiceVersion the Grafana operator Subscription pins
    #[arg(long)]
    pub grafana_csv: Option<String>,

    /// Port for metrics and health probes
    #[arg(long)]
    pub metrics_port: Option<u16>,

    /// Periodic resync of the install pipeline (seconds)
    #[arg(long)]
    pub resync_interval_secs: Option<u64>,

    /// Do not run the Grafana operator install pipeline
    #[arg(long)]
    pub disable_grafana_operator: bool,

    /// Do not run the UIPlugin controller
    #[arg(long)]
    pub disable_ui_plugins: bool,
}

impl Cli {
    /// Apply the flags that were given on top of `controller` and `server`
    pub fn apply(&self, controller: &mut ControllerConfig, server: &mut ServerConfig) {
        if let Some(namespace) = &self.namespace {
            controller.operator_namespace.clone_from(namespace);
        }
        if let Some(csv) = &self.grafana_csv {
            controller.grafana_csv.clone_from(csv);
        }
        if let Some(secs) = self.resync_interval_secs {
            controller.resync_interval_secs = secs;
        }
        if let Some(port) = self.metrics_port {
            server.metrics_port = port;
        }
        if self.disable_grafana_operator {
            controller.grafana_operator_enabled = false;
        }
        if self.disable_ui_plugins {
            controller.ui_plugins_enabled = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "monitoring-stack-operator",
            "--namespace",
            "monitoring",
            "--metrics-port",
            "9090",
            "--disable-ui-plugins",
        ]);
        let mut controller = ControllerConfig::default();
        let mut server = ServerConfig::default();
        cli.apply(&mut controller, &mut server);

        assert_eq!(controller.operator_namespace, "monitoring");
        assert_eq!(server.metrics_port, 9090);
        assert!(!controller.ui_plugins_enabled);
        assert!(controller.grafana_operator_enabled);
        assert_eq!(controller.grafana_csv, ControllerConfig::default().grafana_csv);
    }

    #[test]
    fn test_no_flags_keep_config() {
        let mut controller = ControllerConfig::default();
        let mut server = ServerConfig::default();
        Cli::default().apply(&mut controller, &mut server);
        assert_eq!(controller, ControllerConfig::default());
        assert_eq!(server, ServerConfig::default());
    }
}
