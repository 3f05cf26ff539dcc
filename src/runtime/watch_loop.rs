//! # Watch Loop
//!
//! kube-runtime `Controller` for `UIPlugin` resources. Changes to a plugin, or
//! to any component it owns in the operator namespace, trigger a
//! reconciliation of that plugin.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Service, ServiceAccount};
use kube::api::Api;
use kube::Client;
use kube_runtime::controller::{self, Action, Controller};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use tracing::{debug, info, warn};

use crate::controller::reconciler::ReconcilerError;
use crate::controller::uiplugin::{reconcile_plugin, PluginContext};
use crate::crd::UIPlugin;
use crate::observability::metrics;
use crate::runtime::error_policy::handle_reconciliation_error;
use crate::store::KubeStore;

type ControllerResult =
    Result<(ObjectRef<UIPlugin>, Action), controller::Error<ReconcilerError, watcher::Error>>;

/// Run the UIPlugin controller until SIGINT or SIGTERM
pub async fn run_watch_loop(client: Client, ctx: Arc<PluginContext<KubeStore>>) {
    let namespace = ctx.config().operator_namespace.clone();
    let plugins: Api<UIPlugin> = Api::all(client.clone());
    let deployments: Api<Deployment> = Api::namespaced(client.clone(), &namespace);
    let services: Api<Service> = Api::namespaced(client.clone(), &namespace);
    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), &namespace);
    let service_accounts: Api<ServiceAccount> = Api::namespaced(client, &namespace);

    info!(namespace = %namespace, "starting UIPlugin controller");
    let results_ctx = Arc::clone(&ctx);

    Controller::new(plugins, watcher::Config::default())
        .owns(deployments, watcher::Config::default())
        .owns(services, watcher::Config::default())
        .owns(config_maps, watcher::Config::default())
        .owns(service_accounts, watcher::Config::default())
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, ctx)
        .for_each(|result| {
            observe_result(&results_ctx, result);
            futures::future::ready(())
        })
        .await;

    info!("UIPlugin controller stopped");
}

async fn reconcile(
    plugin: Arc<UIPlugin>,
    ctx: Arc<PluginContext<KubeStore>>,
) -> Result<Action, ReconcilerError> {
    let name = plugin.metadata.name.clone().unwrap_or_default();
    let delay = reconcile_plugin(&plugin, &ctx).await?;
    ctx.reset_backoff(&name);
    Ok(requeue_action(delay))
}

/// Log one controller outcome. A requeue that finds its plugin gone drops
/// the plugin's backoff state.
fn observe_result<S>(ctx: &PluginContext<S>, result: ControllerResult) {
    match result {
        Ok((obj, _action)) => debug!(plugin = %obj.name, "reconciled UIPlugin"),
        Err(controller::Error::ObjectNotFound(obj)) => {
            debug!(plugin = %obj.name, "UIPlugin no longer exists");
            ctx.reset_backoff(&obj.name);
        }
        Err(e) => warn!(error = %e, "UIPlugin controller error"),
    }
}

fn requeue_action(delay: Option<Duration>) -> Action {
    match delay {
        Some(delay) => {
            metrics::increment_requeues_total("requested");
            Action::requeue(delay)
        }
        None => Action::await_change(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::store::MemoryStore;

    #[test]
    fn test_requeue_action() {
        assert_eq!(requeue_action(None), Action::await_change());
        assert_eq!(
            requeue_action(Some(Duration::from_secs(2))),
            Action::requeue(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_deleted_plugin_drops_backoff_state() {
        let ctx = PluginContext::new(MemoryStore::new(), ControllerConfig::default());
        ctx.next_backoff("dashboards");
        ctx.next_backoff("logging");

        let gone = ObjectRef::<UIPlugin>::new("dashboards").erase();
        observe_result(&ctx, Err(controller::Error::ObjectNotFound(gone)));

        let states = ctx.backoff.lock().unwrap();
        assert!(!states.contains_key("dashboards"));
        assert!(states.contains_key("logging"));
    }

    #[test]
    fn test_reconciled_plugin_keeps_other_state() {
        let ctx = PluginContext::new(MemoryStore::new(), ControllerConfig::default());
        ctx.next_backoff("logging");

        observe_result(
            &ctx,
            Ok((ObjectRef::<UIPlugin>::new("dashboards"), Action::await_change())),
        );
        assert!(ctx.backoff.lock().unwrap().contains_key("logging"));
    }
}
