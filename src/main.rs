//! Reference binary embedding of `insights_agent` (SPEC_FULL.md §0).
//!
//! The Pod Registry, Namespace Resolver, Packet Source, TLS Event
//! Source, and Ingestion Client implementations are out of scope
//! (spec.md §1) — a production deployment supplies real
//! `insights-agent-capability` trait implementations of its own. This
//! binary wires the crate's bundled mocks instead so the agent is
//! runnable end-to-end as a smoke test: it starts with zero pods and
//! idles until a shutdown signal, since nothing ever pushes a
//! `PodEvent`/`ParsedNetworkTraffic` onto the mocks' channels.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::sync::mpsc::unbounded_channel;
use tracing::{error, info, warn};

use insights_agent::{Agent, AgentConfig, EnvSource, FilterConfig, ProcessEnv, SupervisorDeps};
use insights_agent_capability::mock::{MockIngestionClient, MockNamespaceResolver, MockPacketSource, MockPodRegistry};

#[tokio::main]
async fn main() -> ExitCode {
    insights_agent::logging::init();

    let env = ProcessEnv;
    let filter = FilterConfig::from_env(&env);
    let config = match AgentConfig::from_env(&env, filter) {
        Ok(config) => config,
        Err(error) => {
            error!(%error, "failed to load agent configuration from the environment");
            return ExitCode::FAILURE;
        }
    };

    let own_pod_name = env.get("POD_NAME").unwrap_or_else(|| "insights-agent".to_string());
    let sidecar_image_substr = env
        .get("POSTMAN_INSIGHTS_SIDECAR_IMAGE")
        .unwrap_or_else(|| "postman-insights-agent".to_string());

    let (_pod_events_tx, pod_events_rx) = unbounded_channel();
    let (_packets_tx, packets_rx) = unbounded_channel();

    let deps = SupervisorDeps {
        pod_registry: Arc::new(MockPodRegistry::new(Vec::new(), pod_events_rx)),
        namespace_resolver: Arc::new(MockNamespaceResolver::new()),
        packet_source: Arc::new(MockPacketSource::new(packets_rx)),
        ingestion_client: Arc::new(MockIngestionClient::new()),
        tls: None,
        self_traffic_ips: Vec::new(),
        dogfood: false,
    };

    let agent = match Agent::start(config, own_pod_name, sidecar_image_substr, deps).await {
        Ok(agent) => agent,
        Err(error) => {
            error!(%error, "failed to start agent");
            return ExitCode::FAILURE;
        }
    };

    info!("agent started, waiting for shutdown signal");
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(%error, "failed to listen for the shutdown signal, shutting down anyway");
    }

    info!("shutdown signal received");
    agent.shutdown().await;
    ExitCode::SUCCESS
}
