use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher::watcher;
use kube::runtime::watcher::Config;
use kube::runtime::WatchStreamExt;
use kube::Api;
use kube::Client;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::k8s::podgroup::GROUP_NAME_ANNOTATION;
use crate::k8s::reconciler::GroupReconciler;
use crate::k8s::store::KubeStore;
use crate::k8s::types::KubernetesError;

/// Watches pods and feeds each one to the group reconciler.
///
/// Pods already linked to a group and pods destined for other schedulers are
/// filtered out before reconciliation.
pub(crate) struct PodWatcher {
    client: Client,
    namespace: Option<String>,
    scheduler_names: Vec<String>,
    reconciler: Arc<GroupReconciler<KubeStore>>,
}

impl PodWatcher {
    pub(crate) fn new(
        client: Client,
        namespace: Option<String>,
        scheduler_names: Vec<String>,
        reconciler: Arc<GroupReconciler<KubeStore>>,
    ) -> Self {
        Self {
            client,
            namespace,
            scheduler_names,
            reconciler,
        }
    }

    /// Start watching pods for changes.
    ///
    /// Runs until cancelled, restarting the watch stream if it fails.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::WatchFailed`] if the watch operation fails
    #[tracing::instrument(skip(self, cancellation_token), fields(namespace = ?self.namespace))]
    pub(crate) async fn run(
        &self,
        cancellation_token: CancellationToken,
    ) -> Result<(), Report<KubernetesError>> {
        info!("Starting pod watcher");

        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Pod watcher shutdown requested");
                    break;
                }
                result = self.watch_pods() => {
                    match result {
                        Ok(()) => {
                            warn!("Pod watch stream ended unexpectedly, restarting...");
                        }
                        Err(e) => {
                            error!("Pod watch failed: {e:?}");
                            // Wait before retrying
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Watch pods and process events.
    async fn watch_pods(&self) -> Result<(), Report<KubernetesError>> {
        let api: Api<Pod> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let mut stream = watcher(api, Config::default()).applied_objects().boxed();

        while let Some(event) = stream.next().await {
            match event {
                Ok(pod) => {
                    if !wants_pod(&pod, &self.scheduler_names) {
                        continue;
                    }
                    // Failures stay scoped to this pod; the watch keeps
                    // running and a later event retries the reconciliation.
                    if let Err(e) = self.reconciler.reconcile_pod(&pod).await {
                        error!("Failed to reconcile pod: {e:?}");
                    }
                }
                Err(e) => {
                    return Err(Report::new(KubernetesError::WatchFailed {
                        kind: "Pod",
                        message: format!("Watch stream error: {e}"),
                    }));
                }
            }
        }

        Ok(())
    }
}

/// Whether a pod event should reach the reconciler: live pods targeting one
/// of the served schedulers that are not yet linked to a group.
fn wants_pod(pod: &Pod, scheduler_names: &[String]) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return false;
    }

    if pod
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|annotations| annotations.contains_key(GROUP_NAME_ANNOTATION))
    {
        return false;
    }

    let scheduler = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.scheduler_name.as_deref())
        .unwrap_or_default();
    scheduler_names.iter().any(|name| name == scheduler)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use k8s_openapi::api::core::v1::PodSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    use super::*;

    fn served() -> Vec<String> {
        vec!["gang-scheduler".to_string()]
    }

    fn pod_for_scheduler(scheduler: &str) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("pod1".to_string()),
                namespace: Some("default".to_string()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                scheduler_name: Some(scheduler.to_string()),
                ..Default::default()
            }),
            status: None,
        }
    }

    #[test]
    fn accepts_pods_for_served_schedulers() {
        assert!(wants_pod(&pod_for_scheduler("gang-scheduler"), &served()));
    }

    #[test]
    fn ignores_pods_for_other_schedulers() {
        assert!(!wants_pod(&pod_for_scheduler("default-scheduler"), &served()));
        assert!(!wants_pod(&Pod::default(), &served()));
    }

    #[test]
    fn ignores_pods_already_linked_to_a_group() {
        let mut pod = pod_for_scheduler("gang-scheduler");
        pod.metadata.annotations = Some(
            [(GROUP_NAME_ANNOTATION.to_string(), "podgroup-x".to_string())]
                .into_iter()
                .collect(),
        );
        assert!(!wants_pod(&pod, &served()));
    }

    #[test]
    fn ignores_pods_being_deleted() {
        let mut pod = pod_for_scheduler("gang-scheduler");
        pod.metadata.deletion_timestamp = Some(Time(Utc::now()));
        assert!(!wants_pod(&pod, &served()));
    }
}
