//! # Triggers
//!
//! Event sources for the install pipeline. Every source sends a
//! [`TriggerSource`] on a shared channel; the trigger loop coalesces them
//! into single pipeline runs.
//!
//! - a ticker, firing immediately and then on every resync interval
//! - watchers on the kinds the pipeline manages
//! - watchers registered later by watch gates, through [`KubeWatchRegistrar`]

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ListParams};
use kube::Client;
use kube_runtime::watcher;
use kube_runtime::WatchStreamExt;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::constants::{MANAGED_BY_LABEL, OPERATOR_NAME};
use crate::controller::reconciler::{WatchError, WatchRegistrar};
use crate::crd::{InstallPlan, OperatorGroup, Subscription};
use crate::store::{kind_of, StoreObject};

/// Why the pipeline is being run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerSource {
    Ticker,
    Watch { kind: String, name: String },
    Requeue,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSource::Ticker => f.write_str("ticker"),
            TriggerSource::Watch { kind, name } => write!(f, "watch {kind}/{name}"),
            TriggerSource::Requeue => f.write_str("requeue"),
        }
    }
}

/// Which watch events trigger the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    /// Every add, update and delete
    AllChanges,
    /// Adds, deletes, and updates that bump `metadata.generation`
    GenerationChanged,
}

/// Tracks the last generation seen per object for [`EventFilter::GenerationChanged`]
#[derive(Debug, Default)]
pub struct GenerationTracker {
    seen: HashMap<String, Option<i64>>,
}

impl GenerationTracker {
    /// Record the object's generation; true when it differs from the last one seen
    pub fn observe(&mut self, name: &str, generation: Option<i64>) -> bool {
        self.seen.insert(name.to_string(), generation) != Some(generation)
    }

    pub fn forget(&mut self, name: &str) {
        self.seen.remove(name);
    }
}

/// Fire immediately, then every `interval`, until the receiver goes away
pub fn spawn_ticker(interval: Duration, tx: UnboundedSender<TriggerSource>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if tx.send(TriggerSource::Ticker).is_err() {
                debug!("trigger receiver closed, stopping ticker");
                return;
            }
        }
    })
}

/// Watch `api` and send a trigger for every event passing `filter`
pub fn spawn_watch<K: StoreObject>(
    api: Api<K>,
    config: watcher::Config,
    filter: EventFilter,
    tx: UnboundedSender<TriggerSource>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let kind = kind_of::<K>();
        info!(kind = %kind, "starting watch");
        let mut generations = GenerationTracker::default();
        let mut stream = watcher(api, config).default_backoff().boxed();

        while let Some(event) = stream.next().await {
            let trigger = match event {
                Ok(watcher::Event::Apply(obj)) | Ok(watcher::Event::InitApply(obj)) => {
                    let name = obj.meta().name.clone().unwrap_or_default();
                    let changed = match filter {
                        EventFilter::AllChanges => true,
                        EventFilter::GenerationChanged => {
                            generations.observe(&name, obj.meta().generation)
                        }
                    };
                    changed.then_some(name)
                }
                Ok(watcher::Event::Delete(obj)) => {
                    let name = obj.meta().name.clone().unwrap_or_default();
                    generations.forget(&name);
                    Some(name)
                }
                Ok(watcher::Event::InitDone) => Some(String::new()),
                Ok(watcher::Event::Init) => None,
                Err(e) => {
                    warn!(kind = %kind, error = %e, "watch stream error");
                    None
                }
            };

            if let Some(name) = trigger {
                let source = TriggerSource::Watch {
                    kind: kind.clone(),
                    name,
                };
                if tx.send(source).is_err() {
                    debug!(kind = %kind, "trigger receiver closed, stopping watch");
                    return;
                }
            }
        }
        warn!(kind = %kind, "watch stream ended");
    })
}

/// Label selector matching every object the operator manages
pub fn managed_by_selector() -> String {
    format!("{MANAGED_BY_LABEL}={OPERATOR_NAME}")
}

/// Start the watches the install pipeline needs from the beginning
///
/// - the operator namespace, on every change (its phase moves without a
///   generation bump)
/// - the managed OperatorGroup and Subscription, on generation changes
/// - InstallPlans in the operator namespace, on every change
pub fn spawn_install_watches(
    client: &Client,
    namespace: &str,
    tx: &UnboundedSender<TriggerSource>,
) -> Vec<JoinHandle<()>> {
    let selector = managed_by_selector();
    vec![
        spawn_watch(
            Api::<Namespace>::all(client.clone()),
            watcher::Config::default().fields(&format!("metadata.name={namespace}")),
            EventFilter::AllChanges,
            tx.clone(),
        ),
        spawn_watch(
            Api::<OperatorGroup>::namespaced(client.clone(), namespace),
            watcher::Config::default().labels(&selector),
            EventFilter::GenerationChanged,
            tx.clone(),
        ),
        spawn_watch(
            Api::<Subscription>::namespaced(client.clone(), namespace),
            watcher::Config::default().labels(&selector),
            EventFilter::GenerationChanged,
            tx.clone(),
        ),
        spawn_watch(
            Api::<InstallPlan>::namespaced(client.clone(), namespace),
            watcher::Config::default(),
            EventFilter::AllChanges,
            tx.clone(),
        ),
    ]
}

/// Registers watches on the live cluster, feeding the install pipeline's triggers
#[derive(Clone)]
pub struct KubeWatchRegistrar {
    client: Client,
    label_selector: String,
    tx: UnboundedSender<TriggerSource>,
}

impl fmt::Debug for KubeWatchRegistrar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeWatchRegistrar")
            .field("label_selector", &self.label_selector)
            .finish_non_exhaustive()
    }
}

impl KubeWatchRegistrar {
    pub fn new(
        client: Client,
        label_selector: impl Into<String>,
        tx: UnboundedSender<TriggerSource>,
    ) -> Self {
        Self {
            client,
            label_selector: label_selector.into(),
            tx,
        }
    }
}

#[async_trait]
impl WatchRegistrar for KubeWatchRegistrar {
    async fn register<K: StoreObject>(&self, namespace: Option<&str>) -> Result<(), WatchError> {
        let api: Api<K> = match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &()),
            None => Api::all_with(self.client.clone(), &()),
        };

        // The watcher retries forever; make sure the kind is served before handing it over.
        api.list(&ListParams::default().limit(1))
            .await
            .map_err(|e| WatchError {
                kind: kind_of::<K>(),
                message: e.to_string(),
            })?;

        spawn_watch(
            api,
            watcher::Config::default().labels(&self.label_selector),
            EventFilter::GenerationChanged,
            self.tx.clone(),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_tracker_reports_changes_only() {
        let mut tracker = GenerationTracker::default();
        assert!(tracker.observe("sub", Some(1)));
        assert!(!tracker.observe("sub", Some(1)));
        assert!(tracker.observe("sub", Some(2)));
        tracker.forget("sub");
        assert!(tracker.observe("sub", Some(2)));
    }

    #[test]
    fn test_managed_by_selector() {
        assert_eq!(
            managed_by_selector(),
            "app.kubernetes.io/managed-by=monitoring-stack-operator"
        );
    }

    #[test]
    fn test_trigger_source_display() {
        let source = TriggerSource::Watch {
            kind: "Subscription".to_string(),
            name: "grafana".to_string(),
        };
        assert_eq!(source.to_string(), "watch Subscription/grafana");
        assert_eq!(TriggerSource::Ticker.to_string(), "ticker");
    }

    #[tokio::test]
    async fn test_ticker_fires_immediately() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = spawn_ticker(Duration::from_secs(3600), tx);
        assert_eq!(rx.recv().await, Some(TriggerSource::Ticker));
        handle.abort();
    }
}
