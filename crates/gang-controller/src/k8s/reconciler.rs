//! Group reconciliation.
//!
//! Each observed pod (or workload template) is folded into exactly one
//! PodGroup per identity. The algorithm is create-if-absent end to end:
//! nothing here updates an existing group, so any arrival order and any
//! amount of duplicate delivery converge on the same record.

use std::collections::BTreeMap;

use error_stack::Report;
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::k8s::group_spec::min_member_from_annotations;
use crate::k8s::group_spec::min_resources_for;
use crate::k8s::identity::controller_owner;
use crate::k8s::identity::group_key_for_pod;
use crate::k8s::identity::group_key_for_template;
use crate::k8s::identity::owner_references_for_pod;
use crate::k8s::identity::owner_references_for_template;
use crate::k8s::podgroup::PodGroup;
use crate::k8s::podgroup::PodGroupSpec;
use crate::k8s::podgroup::GANG_DOMAIN;
use crate::k8s::podgroup::GROUP_MIN_MEMBER_ANNOTATION;
use crate::k8s::podgroup::GROUP_NAME_ANNOTATION;
use crate::k8s::store::CreateOutcome;
use crate::k8s::store::GroupStore;
use crate::k8s::types::KubernetesError;

/// The object whose observation demanded a group. Both variants feed the same
/// builder; they only differ in where the member hint, containers and owner
/// linkage come from.
enum GroupTrigger<'a> {
    Pod {
        pod: &'a Pod,
        template: Option<&'a ReplicaSet>,
    },
    Template {
        template: &'a ReplicaSet,
    },
}

impl GroupTrigger<'_> {
    fn group_key(&self) -> String {
        match self {
            Self::Pod { pod, .. } => group_key_for_pod(pod),
            Self::Template { template } => group_key_for_template(template),
        }
    }

    fn namespace(&self) -> Option<&str> {
        match self {
            Self::Pod { pod, .. } => pod.metadata.namespace.as_deref(),
            Self::Template { template } => template.metadata.namespace.as_deref(),
        }
    }

    /// Annotations carrying the member hint: always the template's, a pod on
    /// its own has no hint.
    fn hint_annotations(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Pod {
                template: Some(template),
                ..
            }
            | Self::Template { template } => template.metadata.annotations.as_ref(),
            Self::Pod { template: None, .. } => None,
        }
    }

    /// Containers defining the per-member resource footprint: the template's
    /// pod template when one is known, else the pod itself.
    fn containers(&self) -> &[Container] {
        match self {
            Self::Pod {
                template: Some(template),
                ..
            }
            | Self::Template { template } => template_containers(template),
            Self::Pod {
                pod,
                template: None,
            } => pod
                .spec
                .as_ref()
                .map(|spec| spec.containers.as_slice())
                .unwrap_or(&[]),
        }
    }

    fn priority_class(&self) -> Option<&str> {
        let spec = match self {
            Self::Pod { pod, .. } => pod.spec.as_ref(),
            Self::Template { template } => template
                .spec
                .as_ref()
                .and_then(|spec| spec.template.as_ref())
                .and_then(|template| template.spec.as_ref()),
        };
        spec.and_then(|spec| spec.priority_class_name.as_deref())
            .filter(|name| !name.is_empty())
    }

    fn owner_references(&self) -> Vec<OwnerReference> {
        match self {
            Self::Pod { pod, .. } => owner_references_for_pod(pod),
            Self::Template { template } => owner_references_for_template(template),
        }
    }

    /// Annotations the group may inherit from, when inheritance is enabled.
    fn annotation_source(&self) -> Option<&BTreeMap<String, String>> {
        match self {
            Self::Pod {
                template: Some(template),
                ..
            }
            | Self::Template { template } => template.metadata.annotations.as_ref(),
            Self::Pod {
                pod,
                template: None,
            } => pod.metadata.annotations.as_ref(),
        }
    }
}

fn template_containers(template: &ReplicaSet) -> &[Container] {
    template
        .spec
        .as_ref()
        .and_then(|spec| spec.template.as_ref())
        .and_then(|template| template.spec.as_ref())
        .map(|spec| spec.containers.as_slice())
        .unwrap_or(&[])
}

/// Domain annotations declared on the owner that travel onto the group
/// record. The identity and hint annotations stay where they are.
fn inherited_annotations(
    source: Option<&BTreeMap<String, String>>,
) -> Option<BTreeMap<String, String>> {
    let prefix = format!("{GANG_DOMAIN}/");
    let inherited: BTreeMap<String, String> = source?
        .iter()
        .filter(|(key, _)| {
            key.starts_with(&prefix)
                && key.as_str() != GROUP_NAME_ANNOTATION
                && key.as_str() != GROUP_MIN_MEMBER_ANNOTATION
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    (!inherited.is_empty()).then_some(inherited)
}

/// Creates gang-scheduling groups for observed pods and templates.
pub(crate) struct GroupReconciler<S> {
    store: S,
    inherit_owner_annotations: bool,
}

impl<S: GroupStore> GroupReconciler<S> {
    pub(crate) fn new(store: S, inherit_owner_annotations: bool) -> Self {
        Self {
            store,
            inherit_owner_annotations,
        }
    }

    /// Ensure the pod's group exists and that the pod is linked to it.
    ///
    /// # Errors
    ///
    /// - [`KubernetesError::StoreFailed`] on transient store errors; the
    ///   caller's watch redelivery retries the whole attempt
    pub(crate) async fn reconcile_pod(&self, pod: &Pod) -> Result<(), Report<KubernetesError>> {
        let Some(namespace) = pod.metadata.namespace.as_deref() else {
            warn!("Ignoring pod without a namespace");
            return Ok(());
        };
        let key = group_key_for_pod(pod);

        let group = match self.store.get_pod_group(namespace, &key).await? {
            Some(existing) => existing,
            None => self.create_group_for_pod(namespace, &key, pod).await?,
        };

        self.write_back(pod, &key, group.spec.priority_class_name.as_deref())
            .await
    }

    /// Ensure a group exists for a template that asks for gang scheduling,
    /// so the member hint and resource floor are correct even when the
    /// template is observed before any of its pods.
    pub(crate) async fn reconcile_template(
        &self,
        template: &ReplicaSet,
    ) -> Result<(), Report<KubernetesError>> {
        let Some(namespace) = template.metadata.namespace.as_deref() else {
            warn!("Ignoring template without a namespace");
            return Ok(());
        };

        // Templates without the hint get their groups lazily, pod by pod.
        let has_hint = template
            .metadata
            .annotations
            .as_ref()
            .is_some_and(|annotations| annotations.contains_key(GROUP_MIN_MEMBER_ANNOTATION));
        if !has_hint {
            return Ok(());
        }

        let key = group_key_for_template(template);
        if self.store.get_pod_group(namespace, &key).await?.is_some() {
            return Ok(());
        }

        let group = self.build_group(&GroupTrigger::Template { template });
        match self.store.create_pod_group(&group).await? {
            CreateOutcome::Created => {
                info!(
                    namespace,
                    group = %key,
                    min_member = group.spec.min_member,
                    "Created pod group from workload template"
                );
            }
            CreateOutcome::AlreadyExists => {
                debug!(namespace, group = %key, "Pod group already exists");
            }
        }
        Ok(())
    }

    async fn create_group_for_pod(
        &self,
        namespace: &str,
        key: &str,
        pod: &Pod,
    ) -> Result<PodGroup, Report<KubernetesError>> {
        // The owning template supplies the member hint and the per-member
        // footprint. A template the store has not seen yet is not an error;
        // the group is created from what the pod alone declares.
        let template = match controller_owner(pod).filter(|owner| owner.kind == "ReplicaSet") {
            Some(owner) => self.store.get_template(namespace, &owner.name).await?,
            None => None,
        };

        let group = self.build_group(&GroupTrigger::Pod {
            pod,
            template: template.as_ref(),
        });

        match self.store.create_pod_group(&group).await? {
            CreateOutcome::Created => {
                info!(
                    namespace,
                    group = %key,
                    min_member = group.spec.min_member,
                    "Created pod group"
                );
                Ok(group)
            }
            CreateOutcome::AlreadyExists => {
                debug!(
                    namespace,
                    group = %key,
                    "Pod group created concurrently, using the stored record"
                );
                Ok(self
                    .store
                    .get_pod_group(namespace, key)
                    .await?
                    .unwrap_or(group))
            }
        }
    }

    fn build_group(&self, trigger: &GroupTrigger<'_>) -> PodGroup {
        let (min_member, _explicit) = min_member_from_annotations(trigger.hint_annotations());
        let min_resources = min_resources_for(trigger.containers(), min_member);

        PodGroup {
            types: Some(PodGroup::type_meta()),
            metadata: ObjectMeta {
                name: Some(trigger.group_key()),
                namespace: trigger.namespace().map(str::to_string),
                owner_references: Some(trigger.owner_references()),
                annotations: self
                    .inherit_owner_annotations
                    .then(|| inherited_annotations(trigger.annotation_source()))
                    .flatten(),
                ..Default::default()
            },
            spec: PodGroupSpec {
                min_member,
                min_resources,
                priority_class_name: trigger.priority_class().map(str::to_string),
            },
        }
    }

    /// Link the pod to its group and inherit the group's priority class when
    /// the pod declares none. The correlation annotation, once present, is
    /// never re-pointed at a different group.
    async fn write_back(
        &self,
        pod: &Pod,
        key: &str,
        group_priority: Option<&str>,
    ) -> Result<(), Report<KubernetesError>> {
        let has_annotation = pod
            .metadata
            .annotations
            .as_ref()
            .is_some_and(|annotations| annotations.contains_key(GROUP_NAME_ANNOTATION));
        let pod_priority = pod
            .spec
            .as_ref()
            .and_then(|spec| spec.priority_class_name.as_deref())
            .unwrap_or_default();
        let inherited = group_priority.filter(|priority| pod_priority.is_empty() && !priority.is_empty());

        if has_annotation && inherited.is_none() {
            return Ok(());
        }

        let mut updated = pod.clone();
        if !has_annotation {
            updated
                .metadata
                .annotations
                .get_or_insert_with(BTreeMap::new)
                .insert(GROUP_NAME_ANNOTATION.to_string(), key.to_string());
        }
        if let Some(priority) = inherited {
            updated
                .spec
                .get_or_insert_with(PodSpec::default)
                .priority_class_name = Some(priority.to_string());
        }
        self.store.update_pod(&updated).await
    }
}
