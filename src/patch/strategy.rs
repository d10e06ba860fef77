//! Patch strategy selection
//!
//! Built-in kinds accept strategic merge patches; their list fields merge by
//! key. Custom resources only understand RFC 7386 JSON merge patches, where
//! every list is replaced wholesale.

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::autoscaling::v2::HorizontalPodAutoscaler;
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, Endpoints, LimitRange, Namespace, PersistentVolume, PersistentVolumeClaim, Pod,
    ReplicationController, ResourceQuota, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::{Ingress, NetworkPolicy};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use k8s_openapi::Resource;

use crate::engine::ResourceDescriptor;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PatchStrategy {
    /// Kubernetes strategic merge patch with keyed list merging
    StrategicMerge,
    /// RFC 7386 JSON merge patch
    JsonMerge,
}

macro_rules! native_kinds {
    ($($ty:ty),* $(,)?) => {
        &[$((<$ty as Resource>::GROUP, <$ty as Resource>::KIND)),*]
    };
}

/// (group, kind) of every type that carries strategic-merge metadata
const NATIVE_KINDS: &[(&str, &str)] = native_kinds![
    Pod,
    Service,
    ConfigMap,
    Secret,
    ServiceAccount,
    Namespace,
    Endpoints,
    LimitRange,
    ResourceQuota,
    PersistentVolume,
    PersistentVolumeClaim,
    ReplicationController,
    Deployment,
    StatefulSet,
    DaemonSet,
    ReplicaSet,
    Job,
    CronJob,
    HorizontalPodAutoscaler,
    Ingress,
    NetworkPolicy,
    PodDisruptionBudget,
    Role,
    RoleBinding,
    ClusterRole,
    ClusterRoleBinding,
];

/// Strategy the API server accepts for `resource`.
pub fn strategy_for(resource: &ResourceDescriptor) -> PatchStrategy {
    let native = NATIVE_KINDS
        .iter()
        .any(|(group, kind)| *group == resource.group && *kind == resource.kind);
    if native {
        PatchStrategy::StrategicMerge
    } else {
        PatchStrategy::JsonMerge
    }
}

/// How a list field is patched under strategic merge
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ListStrategy {
    /// Replaced as a whole
    Atomic,
    /// Maps merged element by element on this key
    MergeByKey(&'static str),
    /// Scalars merged as a set; removals use `$deleteFromPrimitiveList`
    MergePrimitive,
}

/// Patch strategy of list `field`, whose enclosing field is `parent`.
pub(crate) fn list_strategy(parent: Option<&str>, field: &str) -> ListStrategy {
    match (parent, field) {
        (Some("metadata"), "finalizers") => ListStrategy::MergePrimitive,
        (Some("containers" | "initContainers" | "ephemeralContainers"), "ports") => {
            ListStrategy::MergeByKey("containerPort")
        }
        (Some("spec"), "ports") => ListStrategy::MergeByKey("port"),
        (
            _,
            "containers" | "initContainers" | "ephemeralContainers" | "env" | "volumes"
            | "imagePullSecrets" | "resourceClaims",
        ) => ListStrategy::MergeByKey("name"),
        (_, "volumeMounts") => ListStrategy::MergeByKey("mountPath"),
        (_, "volumeDevices") => ListStrategy::MergeByKey("devicePath"),
        (_, "hostAliases") => ListStrategy::MergeByKey("ip"),
        (_, "topologySpreadConstraints") => ListStrategy::MergeByKey("topologyKey"),
        (_, "ownerReferences") => ListStrategy::MergeByKey("uid"),
        (_, "conditions") => ListStrategy::MergeByKey("type"),
        _ => ListStrategy::Atomic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::descriptor;

    #[test]
    fn test_builtin_kinds_use_strategic_merge() {
        let deployment = descriptor("apps", "v1", "Deployment", "deployments", true);
        let service = descriptor("", "v1", "Service", "services", true);
        assert_eq!(strategy_for(&deployment), PatchStrategy::StrategicMerge);
        assert_eq!(strategy_for(&service), PatchStrategy::StrategicMerge);
    }

    #[test]
    fn test_custom_resources_use_json_merge() {
        let component = descriptor("dapr.io", "v1alpha1", "Component", "components", true);
        assert_eq!(strategy_for(&component), PatchStrategy::JsonMerge);
    }

    #[test]
    fn test_lookalike_kind_in_other_group_is_json_merge() {
        let fake = descriptor("example.com", "v1", "Deployment", "deployments", true);
        assert_eq!(strategy_for(&fake), PatchStrategy::JsonMerge);
    }

    #[test]
    fn test_port_merge_keys_depend_on_parent() {
        assert_eq!(
            list_strategy(Some("containers"), "ports"),
            ListStrategy::MergeByKey("containerPort")
        );
        assert_eq!(list_strategy(Some("spec"), "ports"), ListStrategy::MergeByKey("port"));
        assert_eq!(list_strategy(Some("egress"), "ports"), ListStrategy::Atomic);
    }

    #[test]
    fn test_common_merge_keys() {
        assert_eq!(list_strategy(Some("spec"), "containers"), ListStrategy::MergeByKey("name"));
        assert_eq!(list_strategy(Some("containers"), "env"), ListStrategy::MergeByKey("name"));
        assert_eq!(
            list_strategy(Some("containers"), "volumeMounts"),
            ListStrategy::MergeByKey("mountPath")
        );
        assert_eq!(
            list_strategy(Some("containers"), "volumeDevices"),
            ListStrategy::MergeByKey("devicePath")
        );
        assert_eq!(list_strategy(Some("spec"), "tolerations"), ListStrategy::Atomic);
    }

    #[test]
    fn test_pod_spec_lists_follow_patch_metadata() {
        assert_eq!(list_strategy(Some("spec"), "hostAliases"), ListStrategy::MergeByKey("ip"));
        assert_eq!(
            list_strategy(Some("spec"), "topologySpreadConstraints"),
            ListStrategy::MergeByKey("topologyKey")
        );
        assert_eq!(
            list_strategy(Some("metadata"), "finalizers"),
            ListStrategy::MergePrimitive
        );
        assert_eq!(list_strategy(Some("spec"), "finalizers"), ListStrategy::Atomic);
    }
}
