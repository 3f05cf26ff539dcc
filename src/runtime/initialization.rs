//! # Initialization
//!
//! Operator startup: rustls setup, tracing, metrics, the HTTP server for
//! metrics and probes, and the Kubernetes client.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use anyhow::{Context, Result};
use kube::Client;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::controller::server::{start_server, ServerState};
use crate::observability;

/// Initialization result containing everything the reconcilers need
#[derive(Clone)]
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_state", &self.server_state)
            .finish_non_exhaustive()
    }
}

/// Install the ring crypto provider and the tracing subscriber
///
/// Must run before anything opens a TLS connection or logs.
pub fn init_tracing() -> Result<()> {
    // rustls 0.23+ needs a process-wide provider when none is selected via features.
    // A provider installed earlier (tests, embedding) is fine.
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "monitoring_stack_operator=info".into()),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}

/// Initialize the operator runtime
///
/// - metrics registration
/// - HTTP server startup (metrics, liveness, readiness)
/// - Kubernetes client creation
pub async fn initialize(server_config: &ServerConfig) -> Result<InitializationResult> {
    info!("Starting Monitoring Stack Operator");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());

    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });

    wait_for_server_ready(&server_state, &server_handle, server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    info!("Operator initialized, starting reconcilers...");

    Ok(InitializationResult {
        client,
        server_state,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = config.startup_timeout();
    let poll_interval = config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_for_server_ready_when_marked_ready() {
        let state = Arc::new(ServerState::default());
        state.is_ready.store(true, Ordering::Relaxed);
        let handle = tokio::spawn(std::future::pending::<()>());
        let result = wait_for_server_ready(&state, &handle, &ServerConfig::default()).await;
        handle.abort();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_wait_for_server_ready_fails_when_server_exits() {
        let state = Arc::new(ServerState::default());
        let handle = tokio::spawn(async {});
        // Let the task finish
        tokio::task::yield_now().await;
        while !handle.is_finished() {
            tokio::task::yield_now().await;
        }
        let result = wait_for_server_ready(&state, &handle, &ServerConfig::default()).await;
        assert!(result.is_err());
    }
}
