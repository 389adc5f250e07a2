use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::ReplicaSet;
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

use crate::k8s::podgroup::GROUP_MIN_MEMBER_ANNOTATION;
use crate::k8s::reconciler::GroupReconciler;
use crate::k8s::store::KubeStore;
use crate::k8s::types::KubernetesError;

/// Watches workload templates so a group is created with its member hint and
/// resource floor even when the template is observed before any of its pods.
pub(crate) struct TemplateWatcher {
    client: Client,
    namespace: Option<String>,
    reconciler: Arc<GroupReconciler<KubeStore>>,
}

impl TemplateWatcher {
    pub(crate) fn new(
        client: Client,
        namespace: Option<String>,
        reconciler: Arc<GroupReconciler<KubeStore>>,
    ) -> Self {
        Self {
            client,
            namespace,
            reconciler,
        }
    }

    /// Start watching templates for changes.
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
        info!("Starting template watcher");

        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!("Template watcher shutdown requested");
                    break;
                }
                result = self.watch_templates() => {
                    match result {
                        Ok(()) => {
                            warn!("Template watch stream ended unexpectedly, restarting...");
                        }
                        Err(e) => {
                            error!("Template watch failed: {e:?}");
                            // Wait before retrying
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    async fn watch_templates(&self) -> Result<(), Report<KubernetesError>> {
        let api: Api<ReplicaSet> = match &self.namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };

        let mut stream = watcher(api, Config::default()).applied_objects().boxed();

        while let Some(event) = stream.next().await {
            match event {
                Ok(template) => {
                    if !wants_template(&template) {
                        continue;
                    }
                    if let Err(e) = self.reconciler.reconcile_template(&template).await {
                        error!("Failed to reconcile template: {e:?}");
                    }
                }
                Err(e) => {
                    return Err(Report::new(KubernetesError::WatchFailed {
                        kind: "ReplicaSet",
                        message: format!("Watch stream error: {e}"),
                    }));
                }
            }
        }

        Ok(())
    }
}

/// Only live templates that declare a member hint are worth reconciling;
/// everything else gets its group lazily through pod events.
fn wants_template(template: &ReplicaSet) -> bool {
    if template.metadata.deletion_timestamp.is_some() {
        return false;
    }
    template
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|annotations| annotations.contains_key(GROUP_MIN_MEMBER_ANNOTATION))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

    use super::*;

    fn template_with_hint() -> ReplicaSet {
        ReplicaSet {
            metadata: ObjectMeta {
                name: Some("rs1".to_string()),
                namespace: Some("default".to_string()),
                annotations: Some(
                    [(GROUP_MIN_MEMBER_ANNOTATION.to_string(), "2".to_string())]
                        .into_iter()
                        .collect(),
                ),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn accepts_templates_with_a_member_hint() {
        assert!(wants_template(&template_with_hint()));
    }

    #[test]
    fn ignores_templates_without_a_member_hint() {
        assert!(!wants_template(&ReplicaSet::default()));
    }

    #[test]
    fn ignores_templates_being_deleted() {
        let mut template = template_with_hint();
        template.metadata.deletion_timestamp = Some(Time(Utc::now()));
        assert!(!wants_template(&template));
    }
}
