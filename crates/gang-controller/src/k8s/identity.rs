//! Group identity and ownership propagation.
//!
//! Every pod spawned by the same workload template must converge on the same
//! PodGroup without any cross-process coordination, so the group key is a pure
//! function of object metadata: the controlling owner's uid when one exists,
//! the pod's own uid otherwise.

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

use crate::k8s::podgroup::GROUP_NAME_PREFIX;

/// The pod's owner reference marked as controller, if any. A pod with owner
/// references but no controller among them counts as ownerless.
pub(crate) fn controller_owner(pod: &Pod) -> Option<&OwnerReference> {
    pod.metadata
        .owner_references
        .as_ref()
        .and_then(|refs| refs.iter().find(|r| r.controller == Some(true)))
}

/// Deterministic group key for a pod.
pub(crate) fn group_key_for_pod(pod: &Pod) -> String {
    let uid = controller_owner(pod)
        .map(|owner| owner.uid.as_str())
        .or(pod.metadata.uid.as_deref())
        .unwrap_or_default();
    format!("{GROUP_NAME_PREFIX}{uid}")
}

/// Deterministic group key for a workload template; identical to the key its
/// pods resolve to, since their controller owner uid is the template uid.
pub(crate) fn group_key_for_template(template: &ReplicaSet) -> String {
    let uid = template.metadata.uid.as_deref().unwrap_or_default();
    format!("{GROUP_NAME_PREFIX}{uid}")
}

/// Owner references for a group created from a pod event.
///
/// A controlled pod hands its controller reference through unchanged, so the
/// group is garbage-collected together with the workload template. An
/// ownerless pod becomes the owner itself and blocks its own deletion until
/// the group is gone.
pub(crate) fn owner_references_for_pod(pod: &Pod) -> Vec<OwnerReference> {
    if let Some(owner) = controller_owner(pod) {
        return vec![owner.clone()];
    }

    vec![OwnerReference {
        api_version: "v1".to_string(),
        kind: "Pod".to_string(),
        name: pod.metadata.name.clone().unwrap_or_default(),
        uid: pod.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }]
}

/// Owner references for a group created from a template event.
pub(crate) fn owner_references_for_template(template: &ReplicaSet) -> Vec<OwnerReference> {
    vec![OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: "ReplicaSet".to_string(),
        name: template.metadata.name.clone().unwrap_or_default(),
        uid: template.metadata.uid.clone().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: None,
    }]
}

#[cfg(test)]
mod tests {
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    use super::*;

    fn pod_with_owners(uid: &str, owners: Option<Vec<OwnerReference>>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some("pod1".to_string()),
                namespace: Some("test".to_string()),
                uid: Some(uid.to_string()),
                owner_references: owners,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn owner(uid: &str, controller: Option<bool>) -> OwnerReference {
        OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "ReplicaSet".to_string(),
            name: "rs1".to_string(),
            uid: uid.to_string(),
            controller,
            ..Default::default()
        }
    }

    #[test]
    fn group_key_uses_controller_owner_uid() {
        let pod = pod_with_owners("pod-uid", Some(vec![owner("owner-uid", Some(true))]));
        assert_eq!(group_key_for_pod(&pod), "podgroup-owner-uid");
    }

    #[test]
    fn group_key_falls_back_to_pod_uid() {
        let pod = pod_with_owners("pod-uid", None);
        assert_eq!(group_key_for_pod(&pod), "podgroup-pod-uid");
    }

    #[test]
    fn non_controller_owners_count_as_ownerless() {
        let pod = pod_with_owners(
            "pod-uid",
            Some(vec![owner("a", None), owner("b", Some(false))]),
        );
        assert!(controller_owner(&pod).is_none());
        assert_eq!(group_key_for_pod(&pod), "podgroup-pod-uid");
    }

    #[test]
    fn sibling_pods_resolve_to_the_same_key() {
        let pod1 = pod_with_owners("uid-1", Some(vec![owner("shared", Some(true))]));
        let pod2 = pod_with_owners("uid-2", Some(vec![owner("shared", Some(true))]));
        assert_eq!(group_key_for_pod(&pod1), group_key_for_pod(&pod2));
    }

    #[test]
    fn owned_pod_propagates_owner_reference_verbatim() {
        let controller = owner("owner-uid", Some(true));
        let pod = pod_with_owners("pod-uid", Some(vec![controller.clone()]));
        assert_eq!(owner_references_for_pod(&pod), vec![controller]);
    }

    #[test]
    fn ownerless_pod_becomes_its_own_owner() {
        let pod = pod_with_owners("pod-uid", None);
        let refs = owner_references_for_pod(&pod);
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].kind, "Pod");
        assert_eq!(refs[0].name, "pod1");
        assert_eq!(refs[0].uid, "pod-uid");
        assert_eq!(refs[0].controller, Some(true));
        assert_eq!(refs[0].block_owner_deletion, Some(true));
    }

    #[test]
    fn template_key_matches_its_pods() {
        let template = ReplicaSet {
            metadata: ObjectMeta {
                name: Some("rs1".to_string()),
                uid: Some("shared".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        let pod = pod_with_owners("pod-uid", Some(vec![owner("shared", Some(true))]));
        assert_eq!(group_key_for_template(&template), group_key_for_pod(&pod));
    }
}
