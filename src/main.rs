//! # Monitoring Stack Operator
//!
//! Runs the Grafana operator install pipeline and the UIPlugin controller
//! until SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

use monitoring_stack_operator::cli::Cli;
use monitoring_stack_operator::config::{load_config, ControllerConfig};
use monitoring_stack_operator::controller::backoff::FibonacciBackoff;
use monitoring_stack_operator::controller::grafana_operator::GrafanaOperatorReconciler;
use monitoring_stack_operator::controller::uiplugin::PluginContext;
use monitoring_stack_operator::runtime::{
    init_tracing, initialize, managed_by_selector, run_trigger_loop, run_watch_loop,
    spawn_install_watches, spawn_ticker, KubeWatchRegistrar,
};
use monitoring_stack_operator::store::KubeStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing()?;

    let (mut controller_config, mut server_config) = load_config();
    cli.apply(&mut controller_config, &mut server_config);
    info!(?controller_config, "loaded configuration");

    let init_result = initialize(&server_config).await?;
    let client = init_result.client;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();

    if controller_config.grafana_operator_enabled {
        tasks.push(start_install_pipeline(
            client.clone(),
            &controller_config,
            shutdown_rx.clone(),
        ));
    } else {
        info!("Grafana operator install pipeline disabled");
    }

    if controller_config.ui_plugins_enabled {
        let ctx = Arc::new(PluginContext::new(
            KubeStore::new(client.clone()),
            controller_config.clone(),
        ));
        tasks.push(tokio::spawn(run_watch_loop(client, ctx)));
    } else {
        info!("UIPlugin controller disabled");
    }

    shutdown_signal().await;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            error!("reconciler task failed: {}", e);
        }
    }
    Ok(())
}

fn start_install_pipeline(
    client: kube::Client,
    config: &ControllerConfig,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let registrar = KubeWatchRegistrar::new(client.clone(), managed_by_selector(), tx.clone());
    let reconciler = Arc::new(GrafanaOperatorReconciler::new(
        KubeStore::new(client.clone()),
        registrar,
        config,
    ));

    spawn_ticker(config.resync_interval(), tx.clone());
    spawn_install_watches(&client, &config.operator_namespace, &tx);

    let backoff = FibonacciBackoff::new(config.error_backoff_min_secs, config.error_backoff_max_secs);
    tokio::spawn(run_trigger_loop(reconciler, rx, backoff, shutdown))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
