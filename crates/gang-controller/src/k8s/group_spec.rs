//! Derives a group's scheduling spec: the minimum member count and the
//! aggregate resource floor. Both are computed once, at group-creation time,
//! and never revised by later observations.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Container;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use tracing::warn;

use crate::k8s::podgroup::GROUP_MIN_MEMBER_ANNOTATION;
use crate::k8s::quantity::MilliQuantity;

/// Groups without an explicit hint are singletons.
pub(crate) const DEFAULT_MIN_MEMBER: i32 = 1;

/// Minimum member count from a workload template's annotations.
///
/// Returns the count and whether an explicit hint was found. A hint that does
/// not parse as a positive integer is a configuration error: logged, then
/// degraded to the default rather than blocking group creation.
pub(crate) fn min_member_from_annotations(
    annotations: Option<&BTreeMap<String, String>>,
) -> (i32, bool) {
    let Some(value) = annotations.and_then(|a| a.get(GROUP_MIN_MEMBER_ANNOTATION)) else {
        return (DEFAULT_MIN_MEMBER, false);
    };

    match value.parse::<i32>() {
        Ok(parsed) if parsed >= 1 => (parsed, true),
        _ => {
            warn!(
                value = %value,
                "Malformed {GROUP_MIN_MEMBER_ANNOTATION} annotation, using default of {DEFAULT_MIN_MEMBER}"
            );
            (DEFAULT_MIN_MEMBER, false)
        }
    }
}

/// Aggregate the per-member resource requests into the group floor.
///
/// Sums each container's requests per resource name, then scales the totals
/// by the member count. A request whose quantity does not parse is a
/// configuration error for that resource only: logged and skipped. Returns
/// `None` when nothing is requested anywhere, so the group exists without a
/// reservation.
pub(crate) fn min_resources_for(
    containers: &[Container],
    min_member: i32,
) -> Option<BTreeMap<String, Quantity>> {
    let mut totals: BTreeMap<String, MilliQuantity> = BTreeMap::new();

    for container in containers {
        let Some(requests) = container
            .resources
            .as_ref()
            .and_then(|r| r.requests.as_ref())
        else {
            continue;
        };

        for (name, quantity) in requests {
            match MilliQuantity::parse(&quantity.0) {
                Ok(parsed) => {
                    let total = totals.entry(name.clone()).or_default();
                    *total = total.saturating_add(parsed);
                }
                Err(e) => {
                    warn!(
                        resource = %name,
                        quantity = %quantity.0,
                        "Skipping unparsable resource request: {e:?}"
                    );
                }
            }
        }
    }

    if totals.is_empty() {
        return None;
    }

    Some(
        totals
            .into_iter()
            .map(|(name, total)| (name, total.scale(min_member).to_quantity()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::ResourceRequirements;

    use super::*;

    fn annotations(hint: &str) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(GROUP_MIN_MEMBER_ANNOTATION.to_string(), hint.to_string());
        map
    }

    fn container(requests: &[(&str, &str)]) -> Container {
        Container {
            name: "container1".to_string(),
            resources: Some(ResourceRequirements {
                requests: Some(
                    requests
                        .iter()
                        .map(|(name, quantity)| {
                            (name.to_string(), Quantity(quantity.to_string()))
                        })
                        .collect(),
                ),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn min_member_defaults_to_singleton() {
        assert_eq!(min_member_from_annotations(None), (1, false));
        assert_eq!(
            min_member_from_annotations(Some(&BTreeMap::new())),
            (1, false)
        );
    }

    #[test]
    fn min_member_honors_valid_hint() {
        assert_eq!(min_member_from_annotations(Some(&annotations("2"))), (2, true));
        assert_eq!(
            min_member_from_annotations(Some(&annotations("16"))),
            (16, true)
        );
    }

    #[test]
    fn min_member_degrades_on_malformed_hint() {
        assert_eq!(
            min_member_from_annotations(Some(&annotations("two"))),
            (1, false)
        );
        assert_eq!(
            min_member_from_annotations(Some(&annotations("-3"))),
            (1, false)
        );
        assert_eq!(min_member_from_annotations(Some(&annotations("0"))), (1, false));
    }

    #[test]
    fn floor_is_per_member_sum_times_min_member() {
        let containers = vec![container(&[("nvidia.com/gpu", "1")])];
        let floor = min_resources_for(&containers, 2).unwrap();
        assert_eq!(floor["nvidia.com/gpu"].0, "2");
    }

    #[test]
    fn floor_sums_across_containers() {
        let containers = vec![
            container(&[("cpu", "250m"), ("memory", "100Mi")]),
            container(&[("cpu", "750m")]),
        ];
        let floor = min_resources_for(&containers, 3).unwrap();
        assert_eq!(floor["cpu"].0, "3");
        assert_eq!(floor["memory"].0, "314572800");
    }

    #[test]
    fn floor_absent_without_requests() {
        assert!(min_resources_for(&[], 2).is_none());
        let containers = vec![Container {
            name: "container1".to_string(),
            ..Default::default()
        }];
        assert!(min_resources_for(&containers, 2).is_none());
    }

    #[test]
    fn floor_skips_unparsable_quantities() {
        let containers = vec![container(&[("cpu", "bogus"), ("memory", "1Gi")])];
        let floor = min_resources_for(&containers, 1).unwrap();
        assert!(!floor.contains_key("cpu"));
        assert_eq!(floor["memory"].0, "1073741824");
    }
}
