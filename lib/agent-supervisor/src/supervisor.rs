use std::net::IpAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::stream::StreamExt;
use snafu::{ResultExt, Snafu};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use insights_agent_batch::{BatcherConfig, UploadBatcher};
use insights_agent_capability::ingestion_client::IngestionClient;
use insights_agent_capability::namespace_resolver::{NamespaceResolver, NamespaceResolverError};
use insights_agent_capability::packet_source::PacketSource;
use insights_agent_capability::pod_registry::{
    PodEvent, PodRegistry as PodRegistryClient, PodRegistryError, PodSnapshot, PodUid,
};
use insights_agent_capability::tls_event_source::{SocketResolver, TlsEventSource};
use insights_agent_common::config::{AgentConfig, PodCredentials};
use insights_agent_common::ENV_INSPECTION_RETRY_CAP;
use insights_agent_pairing::PairingCollector;
use insights_agent_redact::{PolicyStore, RedactionPolicy};
use insights_agent_session::{
    CapturePolicy, CaptureSession, CaptureSessionConfig, PodSession, PodSessionState, TlsIngest,
    TracingTags,
};

use crate::filter::{self, FilterDecision};
use crate::live_sessions::LiveSessionCounter;
use crate::registry::PodRegistry;

#[derive(Debug, Snafu)]
pub enum SupervisorError {
    #[snafu(display("failed to load the embedded redaction policy: {source}"))]
    Policy { source: insights_agent_redact::PolicyError },
    #[snafu(display("failed to list pods on node: {source}"))]
    ListPods { source: PodRegistryError },
}

/// Pluggable collaborators the Supervisor consumes (spec.md §6): the
/// real implementations are out of scope (spec.md §1) and supplied by
/// the enclosing wrapper.
pub struct SupervisorDeps {
    pub pod_registry: Arc<dyn PodRegistryClient>,
    pub namespace_resolver: Arc<dyn NamespaceResolver>,
    pub packet_source: Arc<dyn PacketSource>,
    pub ingestion_client: Arc<dyn IngestionClient>,
    pub tls: Option<TlsDeps>,
    /// Addresses of the agent's own ingestion endpoint, used by each
    /// Capture Session's self-traffic filter (spec.md §4.3 step 3).
    pub self_traffic_ips: Vec<IpAddr>,
    pub dogfood: bool,
}

/// Constructor pieces for a fresh [`TlsIngest`] per Capture Session —
/// the source and resolver are shared (`Arc`), the paths are cloned.
pub struct TlsDeps {
    pub source: Arc<dyn TlsEventSource>,
    pub resolver: Arc<dyn SocketResolver>,
    pub libssl_paths: Vec<std::path::PathBuf>,
}

/// Owns the authoritative registry of pods being monitored on this node
/// (spec.md §4.1). Bounds concurrency to at most one Capture Session per
/// pod and coordinates shutdown through a shared live-session counter.
pub struct PodSupervisor {
    config: AgentConfig,
    own_pod_name: String,
    sidecar_image_substr: String,
    deps: SupervisorDeps,
    registry: PodRegistry,
    policy_store: Arc<PolicyStore>,
    done_tx: broadcast::Sender<()>,
    live_sessions: Arc<LiveSessionCounter>,
}

impl PodSupervisor {
    pub fn new(
        config: AgentConfig,
        own_pod_name: String,
        sidecar_image_substr: String,
        deps: SupervisorDeps,
    ) -> Result<Arc<Self>, SupervisorError> {
        let policy = RedactionPolicy::load_embedded().context(PolicySnafu)?;
        let (done_tx, _) = broadcast::channel(16);

        Ok(Arc::new(Self {
            config,
            own_pod_name,
            sidecar_image_substr,
            deps,
            registry: PodRegistry::new(),
            policy_store: Arc::new(PolicyStore::new(policy)),
            done_tx,
            live_sessions: LiveSessionCounter::new(),
        }))
    }

    /// `Start` (spec.md §4.1): enumerates existing pods on the node,
    /// applies the filter pipeline, and attempts to start a session for
    /// every surviving pod.
    pub async fn start(self: &Arc<Self>) -> Result<(), SupervisorError> {
        let pods = self
            .deps
            .pod_registry
            .list_pods_on_node()
            .await
            .context(ListPodsSnafu)?;

        for pod in pods {
            self.admit_and_register(&pod);
        }

        let uids: Vec<PodUid> = self.registry.iter_entries().into_iter().map(|(uid, _)| uid).collect();
        for uid in uids {
            self.attempt_start(uid).await;
        }

        Ok(())
    }

    /// `On pod event` (spec.md §4.1).
    pub async fn on_pod_event(self: &Arc<Self>, event: PodEvent) {
        match event {
            PodEvent::Added(snapshot) => {
                if self.admit_and_register(&snapshot) {
                    self.attempt_start(snapshot.uid.clone()).await;
                }
            }
            PodEvent::Modified(snapshot) => {
                if let Some(entry) = self.registry.get(&snapshot.uid) {
                    if entry.session.state() == PodSessionState::Pending
                        && snapshot.phase == insights_agent_capability::pod_registry::Phase::Running
                    {
                        self.attempt_start(snapshot.uid).await;
                    }
                } else if self.admit_and_register(&snapshot) {
                    self.attempt_start(snapshot.uid.clone()).await;
                }
            }
            PodEvent::Deleted(snapshot) => {
                if let Some(entry) = self.registry.get(&snapshot.uid) {
                    let current = entry.session.state();
                    let _ = entry.session.transition(PodSessionState::Terminated, &[current]);
                    entry.session.send_stop();
                    info!(pod = %snapshot.name, "pod deleted; stop signalled");
                }
            }
        }
    }

    /// `On health tick` (spec.md §4.1): reconciles phase for every pod
    /// currently tracked and relaunches any `Pending` pod that is now
    /// `Running` but has no live session — an invariant violation
    /// treated as recoverable, per spec.md §4.1.
    pub async fn on_health_tick(self: &Arc<Self>) {
        let entries = self.registry.iter_entries();
        if entries.is_empty() {
            return;
        }

        let uids: Vec<PodUid> = entries.iter().map(|(uid, _)| uid.clone()).collect();
        let phases = match self.deps.pod_registry.get_pod_phase_by_uid(&uids).await {
            Ok(phases) => phases,
            Err(error) => {
                warn!(%error, "health tick failed to fetch pod phases");
                return;
            }
        };

        for (uid, entry) in entries {
            let Some(phase) = phases.get(&uid) else {
                continue;
            };
            if entry.session.state() == PodSessionState::Pending
                && *phase == insights_agent_capability::pod_registry::Phase::Running
                && !entry.has_live_task()
            {
                warn!(pod = %entry.session.name, "health tick observed Pending/Running pod with no session; relaunching");
                self.attempt_start(uid).await;
            }
        }
    }

    /// `Shutdown` (spec.md §4.1): closes the broadcast done signal,
    /// transitions every registry entry to `DaemonSetShutdown`, signals
    /// each session's stop channel, then waits for every live session
    /// to exit.
    pub async fn shutdown(self: &Arc<Self>) {
        let _ = self.done_tx.send(());

        for (_, entry) in self.registry.iter_entries() {
            let current = entry.session.state();
            let _ = entry.session.transition(PodSessionState::DaemonSetShutdown, &[current]);
            entry.session.send_stop();
        }

        self.live_sessions.wait_for_zero().await;
        info!("pod supervisor shutdown complete");
    }

    /// Read-only diagnostic view of the registry (SPEC_FULL.md §2.1).
    pub fn snapshot(&self) -> Vec<(PodUid, PodSessionState)> {
        self.registry.snapshot()
    }

    pub fn live_session_count(&self) -> usize {
        self.live_sessions.get()
    }

    /// Drives the watch/health-tick/shutdown event loop (spec.md §2
    /// "Control flow"): runs until the broadcast done signal fires or
    /// the pod watch stream ends. `start()` must have been called
    /// first to seed the initial registry.
    pub async fn run(self: &Arc<Self>) {
        let mut events = self.deps.pod_registry.watch_pod_events();
        let mut health_ticker = tokio::time::interval(insights_agent_common::HEALTH_POLL_INTERVAL);
        health_ticker.tick().await; // first tick fires immediately; skip it
        let mut done_rx = self.done_tx.subscribe();

        loop {
            tokio::select! {
                biased;
                _ = done_rx.recv() => {
                    info!("pod supervisor observed shutdown signal; exiting event loop");
                    break;
                }
                _ = health_ticker.tick() => {
                    self.on_health_tick().await;
                }
                event = events.next() => {
                    match event {
                        Some(event) => self.on_pod_event(event).await,
                        None => {
                            info!("pod watch stream ended; exiting event loop");
                            break;
                        }
                    }
                }
            }
        }
    }

    /// Applies the filter pipeline and, if the pod is admitted and not
    /// already tracked, inserts it in `Pending` state. Returns whether
    /// this call actually registered a new entry.
    fn admit_and_register(&self, pod: &PodSnapshot) -> bool {
        if self.registry.contains(&pod.uid) {
            return false;
        }

        let decision = filter::admit(
            pod,
            &self.own_pod_name,
            &self.sidecar_image_substr,
            &self.config.filter,
        );
        let FilterDecision::Admit = decision else {
            return false;
        };

        let Some(container) = pod.primary_container() else {
            warn!(pod = %pod.name, "admitted pod has no containers; dropping");
            return false;
        };

        let service_name = filter::derive_service_name(pod);
        let tags = TracingTags {
            cluster: self.config.cluster_name.clone(),
            namespace: pod.namespace.clone(),
            workload: service_name,
            labels: pod.labels.clone(),
        };

        let policy = CapturePolicy {
            rate_limit_per_minute: self.config.rate_limit_per_minute,
            repro_mode: !self.config.disable_repro_mode,
            drop_known_noise: self.config.drop_nginx_traffic,
            always_capture_path_patterns: Vec::new(),
            max_witness_bytes: insights_agent_common::MAX_WITNESS_BYTES,
        };

        let session = Arc::new(PodSession::new(
            pod.uid.clone(),
            pod.name.clone(),
            container.id.clone(),
            policy,
            PodCredentials::default(),
            tags,
        ));

        let (_, inserted) = self.registry.load_or_store(pod.uid.clone(), session);
        if inserted {
            info!(pod = %pod.name, namespace = %pod.namespace, "pod admitted; tracking as Pending");
        }
        inserted
    }

    /// Env-var inspection plus session start (spec.md §4.1 Start
    /// contract, §9 Open Question 1: "every tick, with a per-pod retry
    /// cap"). A failure here is logged and non-fatal (spec.md
    /// "Failure semantics"): the pod stays `Pending` and the next
    /// health tick retries, up to `ENV_INSPECTION_RETRY_CAP` attempts.
    async fn attempt_start(self: &Arc<Self>, uid: PodUid) {
        let Some(entry) = self.registry.get(&uid) else {
            return;
        };
        if entry.session.state() != PodSessionState::Pending || entry.has_live_task() {
            return;
        }

        let container_id = entry.session.container_id.clone();
        let container_env = match self
            .deps
            .namespace_resolver
            .read_container_env(&container_id)
            .await
        {
            Ok(env) => env,
            Err(error) => {
                self.handle_env_inspection_failure(&entry, &error);
                return;
            }
        };
        entry.env_inspection_attempts.store(0, Ordering::SeqCst);

        let ns_path = match self
            .deps
            .namespace_resolver
            .resolve_network_namespace(&container_id)
            .await
        {
            Ok(path) => path,
            Err(error) => {
                warn!(pod = %entry.session.name, %error, "failed to resolve network namespace; will retry next tick");
                return;
            }
        };

        if entry
            .session
            .transition(PodSessionState::Running, &[PodSessionState::Pending])
            .is_err()
        {
            return;
        }
        entry.session.set_netns_path(ns_path.clone());

        let credentials = PodCredentials::from_container_env(&container_env);
        let repro_mode = entry.session.policy.repro_mode
            && !self.config.disable_repro_mode
            && !credentials.disable_repro_mode;

        if entry
            .session
            .transition(
                PodSessionState::TrafficMonitoringRunning,
                &[PodSessionState::Running],
            )
            .is_err()
        {
            return;
        }

        let Some(stop_rx) = entry.session.take_stop_receiver() else {
            error!(pod = %entry.session.name, "stop receiver already taken; refusing to start a second session");
            return;
        };
        let done_rx = self.done_tx.subscribe();

        let learn_session = entry
            .session
            .tags
            .workload
            .clone()
            .unwrap_or_else(|| entry.session.name.clone());

        let (report_tx, mut report_rx) = mpsc::unbounded_channel();
        let collector = PairingCollector::new(report_tx, Arc::clone(&self.policy_store), repro_mode);
        let batcher = UploadBatcher::spawn(
            Arc::clone(&self.deps.ingestion_client),
            learn_session,
            BatcherConfig::default(),
        );

        // `PairingCollector` hands finished witnesses to this channel;
        // forward them into the batcher it does not itself own (spec.md
        // dependency order: Pairing Collector -> Upload Batcher).
        let forward_batcher = Arc::clone(&batcher);
        tokio::spawn(async move {
            while let Some(report) = report_rx.recv().await {
                forward_batcher.add(report).await;
            }
        });

        let tls = self.deps.tls.as_ref().map(|tls| TlsIngest {
            source: Arc::clone(&tls.source),
            resolver: Arc::clone(&tls.resolver),
            libssl_paths: tls.libssl_paths.clone(),
        });

        let config = CaptureSessionConfig {
            ns_path,
            interface: None,
            bpf_filter: None,
            policy: entry.session.policy.clone(),
            sample_rate: 1.0,
            self_traffic_ips: self.deps.self_traffic_ips.clone(),
            dogfood: self.deps.dogfood,
        };

        let capture_session = CaptureSession::new(
            config,
            Arc::clone(&self.deps.packet_source),
            tls,
            collector,
            batcher,
            stop_rx,
            done_rx,
        );

        self.live_sessions.increment();
        let pod_session = Arc::clone(&entry.session);
        let supervisor = Arc::clone(self);
        let uid_for_reap = uid.clone();

        let task = tokio::spawn(async move { capture_session.run().await });
        let reaper = {
            let pod_session = Arc::clone(&pod_session);
            let live_sessions = Arc::clone(&supervisor.live_sessions);
            tokio::spawn(async move {
                match task.await {
                    Ok(Ok(())) => {
                        let _ = pod_session.transition(
                            PodSessionState::TrafficMonitoringEnded,
                            &[PodSessionState::TrafficMonitoringRunning],
                        );
                    }
                    Ok(Err(error)) => {
                        error!(pod = %pod_session.name, %error, "capture session returned an error");
                        let _ = pod_session.transition(
                            PodSessionState::TrafficMonitoringFailed,
                            &[PodSessionState::TrafficMonitoringRunning],
                        );
                    }
                    Err(join_error) => {
                        // Recover hook (spec.md §4.1 "Failure semantics"):
                        // a panic inside the capture session's task is
                        // converted to a `Failed` terminal transition
                        // here, the one place that awaits its `JoinHandle`.
                        error!(pod = %pod_session.name, %join_error, "capture session task panicked");
                        let _ = pod_session.transition(
                            PodSessionState::TrafficMonitoringFailed,
                            &[PodSessionState::TrafficMonitoringRunning],
                        );
                    }
                }
                let current = pod_session.state();
                let _ = pod_session.transition(PodSessionState::RemoveFromMap, &[current]);
                live_sessions.decrement();
                supervisor.registry.remove(&uid_for_reap);
            })
        };

        *entry.task.lock() = Some(reaper);
        info!(pod = %entry.session.name, "capture session started");
    }

    fn handle_env_inspection_failure(&self, entry: &crate::registry::RegistryEntry, error: &NamespaceResolverError) {
        let attempts = entry.env_inspection_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        warn!(pod = %entry.session.name, %error, attempts, "env-var inspection failed");
        if attempts >= ENV_INSPECTION_RETRY_CAP {
            let _ = entry
                .session
                .transition(PodSessionState::Failed, &[PodSessionState::Pending]);
            warn!(pod = %entry.session.name, "env-var inspection retry cap exceeded; pod marked Failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};
    use std::path::PathBuf;
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc::unbounded_channel;

    use insights_agent_capability::mock::{MockIngestionClient, MockNamespaceResolver, MockPacketSource, MockPodRegistry};
    use insights_agent_capability::pod_registry::{ContainerInfo, OwnerReference, Phase, PodSnapshot};
    use insights_agent_common::config::FilterConfig;

    fn snapshot(uid: &str, owner_kind: &str) -> PodSnapshot {
        PodSnapshot {
            uid: PodUid(uid.to_string()),
            name: format!("checkout-7d4b7db798-{uid}"),
            namespace: "payments".to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            owner_references: vec![OwnerReference {
                kind: owner_kind.to_string(),
                name: "checkout-7d4b7db798".to_string(),
            }],
            phase: Phase::Running,
            containers: vec![ContainerInfo {
                id: format!("container-{uid}"),
                image: "myorg/checkout:1.0".to_string(),
            }],
        }
    }

    fn deps_with(
        pods: Vec<PodSnapshot>,
        namespace_resolver: Arc<dyn NamespaceResolver>,
    ) -> (SupervisorDeps, tokio::sync::mpsc::UnboundedSender<PodEvent>) {
        let (events_tx, events_rx) = unbounded_channel();
        let pod_registry = Arc::new(MockPodRegistry::new(pods, events_rx));
        let (_packet_tx, packet_rx) = unbounded_channel();
        let packet_source = Arc::new(MockPacketSource::new(packet_rx));
        let ingestion_client = Arc::new(MockIngestionClient::new());

        (
            SupervisorDeps {
                pod_registry,
                namespace_resolver,
                packet_source,
                ingestion_client,
                tls: None,
                self_traffic_ips: Vec::new(),
                dogfood: false,
            },
            events_tx,
        )
    }

    fn config() -> AgentConfig {
        AgentConfig {
            cluster_name: Some("test-cluster".to_string()),
            api_key: "key".to_string(),
            env_label: None,
            workspace_id: None,
            system_env: None,
            verification_token: None,
            disable_repro_mode: false,
            drop_nginx_traffic: false,
            rate_limit_per_minute: None,
            filter: FilterConfig::default(),
        }
    }

    fn working_namespace_resolver(container_id: &str) -> Arc<dyn NamespaceResolver> {
        Arc::new(
            MockNamespaceResolver::new().with_container(container_id, PathBuf::from("/proc/1/ns/net"), HashMap::new()),
        )
    }

    /// A `NamespaceResolver` whose `read_container_env` always fails,
    /// used to exercise the env-inspection retry cap (SPEC_FULL.md
    /// §3.1).
    struct AlwaysFailingEnvResolver;

    #[async_trait]
    impl NamespaceResolver for AlwaysFailingEnvResolver {
        async fn resolve_network_namespace(
            &self,
            _container_id: &str,
        ) -> Result<PathBuf, NamespaceResolverError> {
            Ok(PathBuf::from("/proc/1/ns/net"))
        }

        async fn read_container_env(
            &self,
            container_id: &str,
        ) -> Result<HashMap<String, String>, NamespaceResolverError> {
            Err(NamespaceResolverError::ResolveFailed {
                container_id: container_id.to_string(),
                message: "container runtime unreachable".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn rejects_job_owned_pod_during_start() {
        let pod = snapshot("p1", "Job");
        let (deps, _events_tx) = deps_with(vec![pod], working_namespace_resolver("container-p1"));
        let supervisor = PodSupervisor::new(config(), "agent-self".to_string(), "insights-agent".to_string(), deps).unwrap();

        supervisor.start().await.unwrap();
        assert!(supervisor.snapshot().is_empty());
    }

    #[tokio::test]
    async fn admits_and_starts_a_replicaset_owned_pod() {
        let pod = snapshot("p1", "ReplicaSet");
        let (deps, _events_tx) = deps_with(vec![pod], working_namespace_resolver("container-p1"));
        let supervisor = PodSupervisor::new(config(), "agent-self".to_string(), "insights-agent".to_string(), deps).unwrap();

        supervisor.start().await.unwrap();

        // `attempt_start` runs async work before reaching
        // `TrafficMonitoringRunning`; poll briefly rather than assume a
        // single await point suffices.
        let mut state = None;
        for _ in 0..20 {
            let snap = supervisor.snapshot();
            if let Some((_, s)) = snap.first() {
                state = Some(*s);
                if *s == PodSessionState::TrafficMonitoringRunning {
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(state, Some(PodSessionState::TrafficMonitoringRunning));
        assert_eq!(supervisor.live_session_count(), 1);

        supervisor.shutdown().await;
        assert_eq!(supervisor.live_session_count(), 0);
    }

    #[tokio::test]
    async fn deleted_event_sends_stop_and_transitions_to_terminated() {
        let pod = snapshot("p1", "ReplicaSet");
        let (deps, _events_tx) = deps_with(vec![pod.clone()], working_namespace_resolver("container-p1"));
        let supervisor = PodSupervisor::new(config(), "agent-self".to_string(), "insights-agent".to_string(), deps).unwrap();

        // Register without starting, so the transition predecessor is
        // still `Pending`.
        assert!(supervisor.admit_and_register(&pod));
        supervisor.on_pod_event(PodEvent::Deleted(pod.clone())).await;

        let snap = supervisor.snapshot();
        assert_eq!(snap, vec![(pod.uid.clone(), PodSessionState::Terminated)]);
    }

    #[tokio::test]
    async fn env_inspection_failure_retries_then_marks_failed() {
        let pod = snapshot("p1", "ReplicaSet");
        let (deps, _events_tx) = deps_with(vec![pod.clone()], Arc::new(AlwaysFailingEnvResolver));
        let supervisor = PodSupervisor::new(config(), "agent-self".to_string(), "insights-agent".to_string(), deps).unwrap();

        supervisor.start().await.unwrap();
        assert_eq!(
            supervisor.snapshot(),
            vec![(pod.uid.clone(), PodSessionState::Pending)]
        );

        for _ in 0..(ENV_INSPECTION_RETRY_CAP - 1) {
            supervisor.on_health_tick().await;
        }
        assert_eq!(
            supervisor.snapshot(),
            vec![(pod.uid.clone(), PodSessionState::Pending)],
            "still retrying below the cap"
        );

        supervisor.on_health_tick().await;
        assert_eq!(
            supervisor.snapshot(),
            vec![(pod.uid.clone(), PodSessionState::Failed)],
            "cap exceeded; pod marked Failed"
        );
    }

    #[tokio::test]
    async fn shutdown_waits_for_live_sessions_to_reach_zero() {
        let pod = snapshot("p1", "ReplicaSet");
        let (deps, _events_tx) = deps_with(vec![pod], working_namespace_resolver("container-p1"));
        let supervisor = PodSupervisor::new(config(), "agent-self".to_string(), "insights-agent".to_string(), deps).unwrap();

        supervisor.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        tokio::time::timeout(Duration::from_secs(2), supervisor.shutdown())
            .await
            .expect("shutdown must not hang");
        assert_eq!(supervisor.live_session_count(), 0);
    }

    #[tokio::test]
    async fn run_event_loop_admits_pod_from_watch_and_exits_on_shutdown() {
        let (deps, events_tx) = deps_with(vec![], working_namespace_resolver("container-p1"));
        let supervisor = PodSupervisor::new(config(), "agent-self".to_string(), "insights-agent".to_string(), deps).unwrap();
        supervisor.start().await.unwrap();
        assert!(supervisor.snapshot().is_empty());

        let sup_clone = Arc::clone(&supervisor);
        let run_handle = tokio::spawn(async move { sup_clone.run().await });

        let pod = snapshot("p1", "ReplicaSet");
        events_tx.send(PodEvent::Added(pod)).unwrap();

        let mut registered = false;
        for _ in 0..50 {
            if !supervisor.snapshot().is_empty() {
                registered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(registered, "watch-delivered pod should be admitted and tracked");

        supervisor.shutdown().await;
        tokio::time::timeout(Duration::from_secs(2), run_handle)
            .await
            .expect("event loop must exit promptly after shutdown")
            .unwrap();
    }
}
