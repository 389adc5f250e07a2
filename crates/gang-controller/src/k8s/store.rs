//! Object-store seam between the reconciler and the cluster.
//!
//! The reconciler only ever needs four operations, so they live behind a
//! trait: the daemon wires in [`KubeStore`], tests substitute an in-memory
//! double. Creation reports `AlreadyExists` as an outcome rather than an
//! error because a concurrent reconciliation winning the race is success.

use async_trait::async_trait;
use error_stack::Report;
use error_stack::ResultExt;
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::api::PostParams;
use kube::Api;
use kube::Client;
use kube::ResourceExt;

use crate::k8s::podgroup::PodGroup;
use crate::k8s::types::KubernetesError;

/// Result of a create-if-absent attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[async_trait]
pub(crate) trait GroupStore: Send + Sync {
    async fn get_pod_group(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PodGroup>, Report<KubernetesError>>;

    async fn create_pod_group(
        &self,
        group: &PodGroup,
    ) -> Result<CreateOutcome, Report<KubernetesError>>;

    async fn update_pod(&self, pod: &Pod) -> Result<(), Report<KubernetesError>>;

    async fn get_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ReplicaSet>, Report<KubernetesError>>;
}

/// [`GroupStore`] backed by the Kubernetes API server.
pub(crate) struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub(crate) fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl GroupStore for KubeStore {
    async fn get_pod_group(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<PodGroup>, Report<KubernetesError>> {
        let api: Api<PodGroup> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .change_context(KubernetesError::StoreFailed {
                operation: "get",
                kind: "PodGroup",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }

    async fn create_pod_group(
        &self,
        group: &PodGroup,
    ) -> Result<CreateOutcome, Report<KubernetesError>> {
        let namespace = group.namespace().unwrap_or_default();
        let api: Api<PodGroup> = Api::namespaced(self.client.clone(), &namespace);

        match api.create(&PostParams::default(), group).await {
            Ok(_) => Ok(CreateOutcome::Created),
            // A concurrent reconciliation created the group first; that is
            // exactly the record we wanted to exist.
            Err(kube::Error::Api(response)) if response.reason == "AlreadyExists" => {
                Ok(CreateOutcome::AlreadyExists)
            }
            Err(e) => Err(Report::new(e).change_context(KubernetesError::StoreFailed {
                operation: "create",
                kind: "PodGroup",
                namespace,
                name: group.name_any(),
            })),
        }
    }

    async fn update_pod(&self, pod: &Pod) -> Result<(), Report<KubernetesError>> {
        let namespace = pod.namespace().unwrap_or_default();
        let name = pod.name_any();
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);

        // Only the reconciler-owned fields travel in the patch, so writers of
        // unrelated pod fields are never clobbered.
        let mut patch = serde_json::json!({
            "metadata": {
                "annotations": pod.metadata.annotations.clone().unwrap_or_default(),
            }
        });
        if let Some(priority) = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.priority_class_name.as_ref())
        {
            patch["spec"] = serde_json::json!({ "priorityClassName": priority });
        }

        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .change_context(KubernetesError::StoreFailed {
                operation: "patch",
                kind: "Pod",
                namespace,
                name,
            })?;
        Ok(())
    }

    async fn get_template(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<ReplicaSet>, Report<KubernetesError>> {
        let api: Api<ReplicaSet> = Api::namespaced(self.client.clone(), namespace);
        api.get_opt(name)
            .await
            .change_context(KubernetesError::StoreFailed {
                operation: "get",
                kind: "ReplicaSet",
                namespace: namespace.to_string(),
                name: name.to_string(),
            })
    }
}
