//! # UIPlugin Reconciler
//!
//! Converges the components of each `UIPlugin` and reports the outcome in a
//! `Ready` condition on the plugin's status.
//!
//! The status is only written when the condition or observed generation
//! changes, so status writes do not retrigger reconciliation on their own.

pub mod components;

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tracing::{debug, info_span, warn, Instrument};

use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::{ReconcileContext, ReconcilerError};
use crate::crd::{Condition, UIPlugin, UIPluginStatus};
use crate::observability::metrics;
use crate::store::{ObjectKey, ObjectStore};

pub use components::{component_pipeline, plugin_info, PluginInfo};

const READY: &str = "Ready";

/// Context shared by all UIPlugin reconciliations
#[derive(Debug)]
pub struct PluginContext<S> {
    store: S,
    config: ControllerConfig,
    /// Per-plugin error backoff, keyed by plugin name
    pub backoff: Mutex<HashMap<String, FibonacciBackoff>>,
}

impl<S> PluginContext<S> {
    pub fn new(store: S, config: ControllerConfig) -> Self {
        Self {
            store,
            config,
            backoff: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Forget the error backoff of a plugin once it reconciles or is deleted
    pub fn reset_backoff(&self, name: &str) {
        if let Ok(mut states) = self.backoff.lock() {
            states.remove(name);
        }
    }

    /// Next error backoff for a plugin
    pub fn next_backoff(&self, name: &str) -> Duration {
        match self.backoff.lock() {
            Ok(mut states) => states
                .entry(name.to_string())
                .or_insert_with(|| {
                    FibonacciBackoff::new(
                        self.config.error_backoff_min_secs,
                        self.config.error_backoff_max_secs,
                    )
                })
                .next_backoff(),
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using default backoff", e);
                Duration::from_secs(crate::constants::DEFAULT_RECONCILIATION_ERROR_REQUEUE_SECS)
            }
        }
    }
}

impl<S: ObjectStore> ReconcileContext for PluginContext<S> {
    type Store = S;

    fn store(&self) -> &S {
        &self.store
    }

    fn conflict_requeue(&self) -> Duration {
        self.config.conflict_requeue()
    }
}

/// Converge every component of `plugin` and record the outcome on its status
///
/// Returns the requeue delay, if any, or the error that stopped the pipeline.
pub async fn reconcile_plugin<S>(
    plugin: &UIPlugin,
    ctx: &PluginContext<S>,
) -> Result<Option<Duration>, ReconcilerError>
where
    S: ObjectStore + 'static,
{
    let name = plugin.metadata.name.clone().unwrap_or_default();
    let span = info_span!(
        "uiplugin.reconcile",
        plugin = %name,
        plugin_type = plugin.spec.plugin_type.as_str()
    );

    async {
        let info = plugin_info(plugin, &ctx.config);
        let pipeline = component_pipeline::<PluginContext<S>>(plugin, &info);
        debug!(steps = pipeline.len(), "reconciling plugin components");

        let outcome = pipeline.run(ctx).await.into_outcome();
        let condition = match &outcome {
            Ok(None) => Some(ready_condition("True", "Reconciled", "all components converged")),
            Ok(Some(_)) => None,
            Err(e) => Some(ready_condition("False", "ReconcileError", &e.to_string())),
        };
        if let Some(condition) = condition {
            update_status(ctx.store(), plugin, condition).await?;
        }
        outcome
    }
    .instrument(span)
    .await
}

fn ready_condition(status: &str, reason: &str, message: &str) -> Condition {
    Condition {
        r#type: READY.to_string(),
        status: status.to_string(),
        last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    }
}

/// Write the Ready condition, skipping the write when nothing changed
async fn update_status<S: ObjectStore>(
    store: &S,
    plugin: &UIPlugin,
    mut condition: Condition,
) -> Result<(), ReconcilerError> {
    let current = plugin.status.clone().unwrap_or_default();
    let previous = current.conditions.iter().find(|c| c.r#type == READY);
    let generation = plugin.metadata.generation;

    if let Some(previous) = previous {
        let unchanged = previous.status == condition.status
            && previous.reason == condition.reason
            && previous.message == condition.message;
        if unchanged && current.observed_generation == generation {
            debug!("Skipping status update - Ready condition unchanged");
            return Ok(());
        }
        if previous.status == condition.status {
            condition
                .last_transition_time
                .clone_from(&previous.last_transition_time);
        }
    }

    let mut conditions: Vec<Condition> = current
        .conditions
        .into_iter()
        .filter(|c| c.r#type != READY)
        .collect();
    conditions.push(condition);
    let status = UIPluginStatus {
        conditions,
        observed_generation: generation,
    };
    let value = serde_json::to_value(&status).map_err(|source| ReconcilerError::Serialization {
        kind: "UIPlugin".to_string(),
        source,
    })?;
    store
        .patch_status::<UIPlugin>(&ObjectKey::of(plugin), value)
        .await?;
    metrics::increment_writes("UIPlugin", "patch-status");
    Ok(())
}
