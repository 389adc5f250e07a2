use std::borrow::Cow;
use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::NamespaceResourceScope;
use kube::api::ObjectMeta;
use kube::core::TypeMeta;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

/// Domain prefix for gang-scheduling annotations.
pub(crate) const GANG_DOMAIN: &str = "gang-scheduler.dev";

/// Version the PodGroup resource is served under.
const API_VERSION: &str = "v1alpha1";

/// Annotation on a pod naming the PodGroup it belongs to. Written once by the
/// reconciler and never re-pointed at a different group.
pub(crate) const GROUP_NAME_ANNOTATION: &str = "gang-scheduler.dev/group-name";

/// Annotation on a workload template declaring how many member pods must be
/// admitted together.
pub(crate) const GROUP_MIN_MEMBER_ANNOTATION: &str = "gang-scheduler.dev/group-min-member";

/// Prefix of every generated PodGroup name; the remainder is the owning
/// object's uid.
pub(crate) const GROUP_NAME_PREFIX: &str = "podgroup-";

/// Gang-scheduling aggregate for a set of co-scheduled pods.
#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PodGroupSpec {
    /// Number of member pods that must be schedulable before any is admitted.
    pub min_member: i32,

    /// Aggregate resource reservation for the whole gang: the per-member
    /// footprint multiplied by `min_member`. Absent means no floor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_resources: Option<BTreeMap<String, Quantity>>,

    /// Priority class inherited from the triggering object, if it had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority_class_name: Option<String>,
}

/// PodGroup custom resource for gang-scheduler.dev/v1alpha1.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub(crate) struct PodGroup {
    #[serde(flatten)]
    pub types: Option<TypeMeta>,
    pub metadata: ObjectMeta,
    pub spec: PodGroupSpec,
}

impl PodGroup {
    /// TypeMeta the API server expects on freshly created records.
    pub(crate) fn type_meta() -> TypeMeta {
        TypeMeta {
            api_version: format!("{GANG_DOMAIN}/{API_VERSION}"),
            kind: "PodGroup".to_string(),
        }
    }
}

// Implement the Resource trait manually
impl kube::Resource for PodGroup {
    type DynamicType = ();
    type Scope = NamespaceResourceScope;

    fn group(_dt: &()) -> Cow<'_, str> {
        GANG_DOMAIN.into()
    }

    fn version(_dt: &()) -> Cow<'_, str> {
        API_VERSION.into()
    }

    fn kind(_dt: &()) -> Cow<'_, str> {
        "PodGroup".into()
    }

    fn plural(_dt: &()) -> Cow<'_, str> {
        "podgroups".into()
    }

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
