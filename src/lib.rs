//! Wires the seven components into one running `Agent` (spec.md §4.1
//! Start/shutdown contract) and owns configuration loading and
//! tracing/metrics initialization. Analogous to how the teacher's root
//! `vector` crate owns `src/topology`, `src/config`, and `src/cli`
//! (SPEC_FULL.md §0): everything below this crate is a reusable
//! library, and `src/main.rs` is one possible embedding of it — the
//! real Pod Registry, Namespace Resolver, Packet Source, TLS Event
//! Source, and Ingestion Client implementations are supplied by
//! whatever process embeds this crate (spec.md §1, out of scope here).

pub mod logging;

use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use tokio::task::JoinHandle;

pub use insights_agent_capability::pod_registry::PodUid;
pub use insights_agent_common::{
    AgentConfig, ConfigError, DiscoveryMode, EnvSource, FilterConfig, PodCredentials, ProcessEnv,
};
pub use insights_agent_session::PodSessionState;
pub use insights_agent_supervisor::{PodSupervisor, SupervisorDeps, SupervisorError, TlsDeps};

#[derive(Debug, Snafu)]
pub enum AgentError {
    #[snafu(display("failed to construct the pod supervisor: {source}"))]
    Supervisor { source: SupervisorError },
    #[snafu(display("failed to enumerate pods at start: {source}"))]
    Start { source: SupervisorError },
}

/// The running agent: a [`PodSupervisor`] plus the task driving its
/// event loop (spec.md §4.1 `Run`). Dropping this without calling
/// [`Agent::shutdown`] abandons the event loop task; a caller that
/// needs a clean stop must call `shutdown` and await it.
pub struct Agent {
    supervisor: Arc<PodSupervisor>,
    run_handle: JoinHandle<()>,
}

impl Agent {
    /// Builds the supervisor, performs its initial pod enumeration
    /// (spec.md §4.1 `Start`: list pods on node, filter, env-inspect,
    /// attempt to start a session for each survivor), then spawns its
    /// event loop and returns without waiting for it to exit.
    pub async fn start(
        config: AgentConfig,
        own_pod_name: String,
        sidecar_image_substr: String,
        deps: SupervisorDeps,
    ) -> Result<Self, AgentError> {
        let supervisor = PodSupervisor::new(config, own_pod_name, sidecar_image_substr, deps)
            .context(SupervisorSnafu)?;
        supervisor.start().await.context(StartSnafu)?;

        let run_supervisor = Arc::clone(&supervisor);
        let run_handle = tokio::spawn(async move { run_supervisor.run().await });

        Ok(Self {
            supervisor,
            run_handle,
        })
    }

    /// A read-only diagnostic view of the pod-session registry
    /// (SPEC_FULL.md §2.1 debug snapshot operation).
    pub fn snapshot(&self) -> Vec<(PodUid, PodSessionState)> {
        self.supervisor.snapshot()
    }

    pub fn live_session_count(&self) -> usize {
        self.supervisor.live_session_count()
    }

    /// Signals shutdown (spec.md §4.1 `Shutdown`: stop every active
    /// session and wait for every capture task to finish) and then
    /// waits for the event loop task to exit.
    pub async fn shutdown(self) {
        self.supervisor.shutdown().await;
        let _ = self.run_handle.await;
    }
}
