//! The filter pipeline (spec.md §4.1): four ordered steps, first to
//! reject wins. Also the discovery-mode service-name derivation used
//! to tag sessions when no explicit per-pod project id is configured.

use std::sync::OnceLock;

use regex::Regex;

use insights_agent_capability::pod_registry::PodSnapshot;
use insights_agent_common::config::FilterConfig;
use insights_agent_common::{ANNOTATION_INSIGHTS_ENABLED, ANNOTATION_OPT_OUT};

/// Namespaces every node agent excludes unless the user's include set
/// explicitly names them.
pub const BUILTIN_EXCLUDED_NAMESPACES: &[&str] = &["kube-system", "kube-public", "kube-node-lease"];

/// Controller kinds the Pod Supervisor is willing to monitor (spec.md
/// §4.1 step 4). `Job`/`CronJob`/orphan pods are rejected because their
/// short-lived, one-shot nature makes per-pod session bookkeeping not
/// worth the churn.
const SUPPORTED_CONTROLLER_KINDS: &[&str] = &["ReplicaSet", "StatefulSet", "DaemonSet"];

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterDecision {
    Admit,
    Reject(RejectReason),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RejectReason {
    SelfPod,
    AlreadyRunningSidecar,
    NamespaceExcluded,
    NamespaceNotIncluded,
    OptOutAnnotation,
    InsightsDisabledAnnotation,
    LabelExcluded,
    LabelNotIncluded,
    UnsupportedController,
}

impl FilterDecision {
    pub fn is_admit(self) -> bool {
        matches!(self, FilterDecision::Admit)
    }
}

/// Runs the four-step filter pipeline in order (spec.md §4.1
/// "Filter pipeline"). `own_pod_name` and `sidecar_image_substr` let
/// the Supervisor skip itself and pods that already run its own
/// sidecar image, without this crate needing to know how that image is
/// named elsewhere.
pub fn admit(
    pod: &PodSnapshot,
    own_pod_name: &str,
    sidecar_image_substr: &str,
    filter: &FilterConfig,
) -> FilterDecision {
    use FilterDecision::{Admit, Reject};
    use RejectReason::*;

    if pod.name == own_pod_name {
        return Reject(SelfPod);
    }
    if runs_sidecar_image(pod, sidecar_image_substr) {
        return Reject(AlreadyRunningSidecar);
    }

    if BUILTIN_EXCLUDED_NAMESPACES.contains(&pod.namespace.as_str())
        || filter.namespace_exclude.contains(&pod.namespace)
    {
        return Reject(NamespaceExcluded);
    }
    if !filter.namespace_include.is_empty() && !filter.namespace_include.contains(&pod.namespace) {
        return Reject(NamespaceNotIncluded);
    }

    if annotation_is(pod, ANNOTATION_OPT_OUT, "true") {
        return Reject(OptOutAnnotation);
    }
    if annotation_is(pod, ANNOTATION_INSIGHTS_ENABLED, "false") {
        return Reject(InsightsDisabledAnnotation);
    }
    if filter.label_exclude.iter().any(|entry| label_matches(pod, entry)) {
        return Reject(LabelExcluded);
    }
    if !filter.label_include.is_empty()
        && !filter.label_include.iter().all(|entry| label_matches(pod, entry))
    {
        return Reject(LabelNotIncluded);
    }

    if !has_supported_controller(pod) {
        return Reject(UnsupportedController);
    }

    Admit
}

fn runs_sidecar_image(pod: &PodSnapshot, sidecar_image_substr: &str) -> bool {
    !sidecar_image_substr.is_empty()
        && pod
            .containers
            .iter()
            .any(|c| c.image.contains(sidecar_image_substr))
}

fn annotation_is(pod: &PodSnapshot, key: &str, value: &str) -> bool {
    pod.annotations.get(key).map(String::as_str) == Some(value)
}

/// A filter-set entry is either a bare label key (presence match) or a
/// `key=value` pair (exact match).
fn label_matches(pod: &PodSnapshot, entry: &str) -> bool {
    match entry.split_once('=') {
        Some((key, value)) => pod.labels.get(key).map(String::as_str) == Some(value),
        None => pod.labels.contains_key(entry),
    }
}

fn has_supported_controller(pod: &PodSnapshot) -> bool {
    pod.owner_references
        .iter()
        .any(|owner| SUPPORTED_CONTROLLER_KINDS.contains(&owner.kind.as_str()))
}

fn replicaset_hash_suffix() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-[a-z0-9]{5,10}$").expect("static regex is valid"))
}

/// Derives a `namespace/workload` service name from a pod snapshot
/// (spec.md §4.1 "discovery mode derives a service name"). Returns
/// `None` only if the pod has no namespace at all, which cannot happen
/// for a real Kubernetes pod but is handled for robustness.
pub fn derive_service_name(pod: &PodSnapshot) -> Option<String> {
    let workload = controller_derived_name(pod)
        .or_else(|| pod.labels.get("app.kubernetes.io/name").cloned())
        .or_else(|| pod.labels.get("app").cloned())
        .or_else(|| trim_trailing_segment(&pod.name))?;

    Some(format!("{}/{}", pod.namespace, workload))
}

fn controller_derived_name(pod: &PodSnapshot) -> Option<String> {
    let owner = pod
        .owner_references
        .iter()
        .find(|o| SUPPORTED_CONTROLLER_KINDS.contains(&o.kind.as_str()))?;

    if owner.kind == "ReplicaSet" {
        Some(replicaset_hash_suffix().replace(&owner.name, "").into_owned())
    } else {
        Some(owner.name.clone())
    }
}

fn trim_trailing_segment(name: &str) -> Option<String> {
    name.rfind('-').map(|idx| name[..idx].to_string())
}
