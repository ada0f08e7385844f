use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use futures::stream::BoxStream;
use snafu::Snafu;

/// Process-unique pod identifier, per spec.md §3 ("opaque pod identifier").
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PodUid(pub String);

impl fmt::Display for PodUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pod lifecycle phase as reported by the Kubernetes API, distinct from
/// the agent's own Pod Session state (spec.md §4.2 owns that).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Terminated,
    Unknown,
}

/// The controller kind owning a pod, used by the Pod Supervisor's
/// controller filter (spec.md §4.1 step 4).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ContainerInfo {
    pub id: String,
    pub image: String,
}

/// A point-in-time view of one pod, as returned by `ListPodsOnNode` and
/// carried on every `PodEvent` (spec.md §6, capability interface 1).
#[derive(Clone, Debug, PartialEq)]
pub struct PodSnapshot {
    pub uid: PodUid,
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
    pub owner_references: Vec<OwnerReference>,
    pub phase: Phase,
    pub containers: Vec<ContainerInfo>,
}

impl PodSnapshot {
    /// The single container the core targets: the first container in the
    /// spec's container list. Multi-container capture targeting is left
    /// to the enclosing wrapper (out of scope per spec.md §1).
    pub fn primary_container(&self) -> Option<&ContainerInfo> {
        self.containers.first()
    }
}

/// A Kubernetes pod watch event, as consumed by the Pod Supervisor's
/// `On pod event` handler (spec.md §4.1).
#[derive(Clone, Debug, PartialEq)]
pub enum PodEvent {
    Added(PodSnapshot),
    Modified(PodSnapshot),
    Deleted(PodSnapshot),
}

impl PodEvent {
    pub fn snapshot(&self) -> &PodSnapshot {
        match self {
            PodEvent::Added(s) | PodEvent::Modified(s) | PodEvent::Deleted(s) => s,
        }
    }
}

#[derive(Debug, Snafu)]
pub enum PodRegistryError {
    #[snafu(display("failed to list pods on node: {message}"))]
    List { message: String },
    #[snafu(display("failed to fetch pod phases: {message}"))]
    Phase { message: String },
}

/// Capability interface 1 (spec.md §6): pod enumeration, phase
/// reconciliation, and the pod watch stream. The real implementation is
/// a thin wrapper over the Kubernetes API client and is out of scope
/// (spec.md §1) — the core only consumes this trait.
#[async_trait]
pub trait PodRegistry: Send + Sync {
    async fn list_pods_on_node(&self) -> Result<Vec<PodSnapshot>, PodRegistryError>;

    async fn get_pod_phase_by_uid(
        &self,
        uids: &[PodUid],
    ) -> Result<BTreeMap<PodUid, Phase>, PodRegistryError>;

    /// The returned stream runs until dropped; the Pod Supervisor holds
    /// it for the lifetime of the process.
    fn watch_pod_events(&self) -> BoxStream<'static, PodEvent>;
}
