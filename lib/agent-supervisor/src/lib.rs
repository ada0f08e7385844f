//! The Pod Supervisor (spec.md §4.1): the authoritative registry of
//! pods being monitored on this node, the filter pipeline, and
//! pod-event/health-tick/shutdown reconciliation. Depends on
//! `agent-session` for the Pod Session state machine and Capture
//! Session it supervises; consumes the `agent-capability` traits for
//! everything it cannot implement itself (spec.md §1).

mod filter;
mod live_sessions;
mod registry;
mod supervisor;

pub use filter::{admit, derive_service_name, FilterDecision, RejectReason, BUILTIN_EXCLUDED_NAMESPACES};
pub use live_sessions::LiveSessionCounter;
pub use registry::{PodRegistry, RegistryEntry};
pub use supervisor::{PodSupervisor, SupervisorDeps, SupervisorError, TlsDeps};
