use std::collections::BTreeMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use regex::Regex;
use snafu::Snafu;
use tokio::sync::mpsc::{channel, Receiver, Sender};

use insights_agent_capability::pod_registry::PodUid;
use insights_agent_common::{PodCredentials, STOP_CHANNEL_CAPACITY};

/// Per-pod lifecycle state (spec.md §4.2). Transitions only ever move
/// forward; `DaemonSetShutdown` is reachable from any non-absorbing
/// state regardless of the caller's declared predecessor set.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PodSessionState {
    Pending,
    Running,
    TrafficMonitoringRunning,
    TrafficMonitoringEnded,
    TrafficMonitoringFailed,
    RemoveFromMap,
    Succeeded,
    Failed,
    Terminated,
    DaemonSetShutdown,
}

impl PodSessionState {
    /// `TrafficMonitoringEnded`, `TrafficMonitoringFailed`, and
    /// `DaemonSetShutdown` reject every further `transition()` call;
    /// `RemoveFromMap` is the one exception allowed out of them, mirroring
    /// how `DaemonSetShutdown` itself is allowed out of any non-absorbing
    /// state (see `PodSession::transition`).
    fn is_absorbing(self) -> bool {
        matches!(
            self,
            PodSessionState::TrafficMonitoringEnded
                | PodSessionState::TrafficMonitoringFailed
                | PodSessionState::RemoveFromMap
                | PodSessionState::DaemonSetShutdown
        )
    }
}

#[derive(Debug, Snafu)]
pub enum TransitionError {
    #[snafu(display("pod session is already in final state {current:?}"))]
    AlreadyInFinalState { current: PodSessionState },
    #[snafu(display("invalid current state {current:?} for this transition"))]
    InvalidCurrentState { current: PodSessionState },
    #[snafu(display("self-transition to {state:?} is not allowed"))]
    SelfTransition { state: PodSessionState },
}

/// Per-pod capture policy (spec.md §3).
#[derive(Clone, Debug)]
pub struct CapturePolicy {
    pub rate_limit_per_minute: Option<u64>,
    pub repro_mode: bool,
    pub drop_known_noise: bool,
    pub always_capture_path_patterns: Vec<Regex>,
    pub max_witness_bytes: u64,
}

impl Default for CapturePolicy {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: None,
            repro_mode: false,
            drop_known_noise: false,
            always_capture_path_patterns: Vec::new(),
            max_witness_bytes: insights_agent_common::MAX_WITNESS_BYTES,
        }
    }
}

/// Tracing tags attached to every witness/metric this pod's session
/// produces (spec.md §3).
#[derive(Clone, Debug, Default)]
pub struct TracingTags {
    pub cluster: Option<String>,
    pub namespace: String,
    pub workload: Option<String>,
    pub labels: BTreeMap<String, String>,
}

/// One pod the agent is capturing (spec.md §3 Pod Session). The
/// Supervisor exclusively owns the pod-session map; a Capture Session
/// holds a shared reference (`Arc<PodSession>`) while it runs.
pub struct PodSession {
    pub uid: PodUid,
    pub name: String,
    pub container_id: String,
    netns_path: Mutex<Option<PathBuf>>,
    pub policy: CapturePolicy,
    pub credentials: PodCredentials,
    pub tags: TracingTags,
    state: Mutex<PodSessionState>,
    stop_tx: Sender<()>,
    stop_rx: Mutex<Option<Receiver<()>>>,
}

impl PodSession {
    pub fn new(
        uid: PodUid,
        name: String,
        container_id: String,
        policy: CapturePolicy,
        credentials: PodCredentials,
        tags: TracingTags,
    ) -> Self {
        let (stop_tx, stop_rx) = channel(STOP_CHANNEL_CAPACITY);
        Self {
            uid,
            name,
            container_id,
            netns_path: Mutex::new(None),
            policy,
            credentials,
            tags,
            state: Mutex::new(PodSessionState::Pending),
            stop_tx,
            stop_rx: Mutex::new(Some(stop_rx)),
        }
    }

    pub fn state(&self) -> PodSessionState {
        *self.state.lock()
    }

    /// The resolved network-namespace path, once the Supervisor has
    /// successfully attached it (spec.md §3: "resolved network-namespace
    /// path"). `None` until then.
    pub fn netns_path(&self) -> Option<PathBuf> {
        self.netns_path.lock().clone()
    }

    pub fn set_netns_path(&self, path: PathBuf) {
        *self.netns_path.lock() = Some(path);
    }

    /// Guarded transition (spec.md §4.2 "Transition contract"): takes the
    /// state mutex, verifies the current state is in `allowed_predecessors`,
    /// rejects transitions out of an absorbing state and self-transitions.
    /// `DaemonSetShutdown` is allowed from any non-absorbing state
    /// regardless of `allowed_predecessors`; `RemoveFromMap` is allowed
    /// from any of the three states that precede it in the lifecycle
    /// diagram (`TrafficMonitoringEnded`, `TrafficMonitoringFailed`,
    /// `DaemonSetShutdown`) for the same reason.
    pub fn transition(
        &self,
        new_state: PodSessionState,
        allowed_predecessors: &[PodSessionState],
    ) -> Result<(), TransitionError> {
        let mut guard = self.state.lock();
        let current = *guard;

        if current == new_state {
            return SelfTransitionSnafu { state: new_state }.fail();
        }
        if current.is_absorbing() {
            return AlreadyInFinalStateSnafu { current }.fail();
        }

        let permitted = match new_state {
            PodSessionState::DaemonSetShutdown => true,
            PodSessionState::RemoveFromMap => matches!(
                current,
                PodSessionState::TrafficMonitoringEnded
                    | PodSessionState::TrafficMonitoringFailed
                    | PodSessionState::DaemonSetShutdown
            ),
            _ => allowed_predecessors.contains(&current),
        };

        if !permitted {
            return InvalidCurrentStateSnafu { current }.fail();
        }

        *guard = new_state;
        Ok(())
    }

    /// Sends a stop signal; never blocks (spec.md §4.2 "Stop channel"): a
    /// duplicate close from a racing supervisor-shutdown and pod-delete
    /// is tolerated by the channel's capacity-2 buffer, and a third send
    /// (which should not happen in practice) is silently dropped rather
    /// than blocking the caller.
    pub fn send_stop(&self) {
        let _ = self.stop_tx.try_send(());
    }

    /// Takes ownership of the stop receiver; returns `None` if already
    /// taken (a Capture Session only ever takes it once, at startup).
    pub fn take_stop_receiver(&self) -> Option<Receiver<()>> {
        self.stop_rx.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> PodSession {
        PodSession::new(
            PodUid("pod-1".to_string()),
            "pod-1".to_string(),
            "container-1".to_string(),
            CapturePolicy::default(),
            PodCredentials::default(),
            TracingTags::default(),
        )
    }

    #[test]
    fn happy_path_chain_succeeds() {
        let session = session();
        session
            .transition(PodSessionState::Running, &[PodSessionState::Pending])
            .unwrap();
        session
            .transition(
                PodSessionState::TrafficMonitoringRunning,
                &[PodSessionState::Running],
            )
            .unwrap();
        session
            .transition(
                PodSessionState::TrafficMonitoringEnded,
                &[PodSessionState::TrafficMonitoringRunning],
            )
            .unwrap();
        assert_eq!(session.state(), PodSessionState::TrafficMonitoringEnded);
    }

    #[test]
    fn rejects_transition_from_wrong_predecessor() {
        let session = session();
        let err = session
            .transition(
                PodSessionState::TrafficMonitoringRunning,
                &[PodSessionState::Running],
            )
            .unwrap_err();
        assert!(matches!(err, TransitionError::InvalidCurrentState { .. }));
    }

    #[test]
    fn rejects_self_transition() {
        let session = session();
        let err = session
            .transition(PodSessionState::Pending, &[PodSessionState::Pending])
            .unwrap_err();
        assert!(matches!(err, TransitionError::SelfTransition { .. }));
    }

    #[test]
    fn remove_from_map_is_reachable_from_daemon_set_shutdown() {
        let session = session();
        session
            .transition(PodSessionState::DaemonSetShutdown, &[])
            .unwrap();
        session.transition(PodSessionState::RemoveFromMap, &[]).unwrap();
        assert_eq!(session.state(), PodSessionState::RemoveFromMap);

        let err = session
            .transition(PodSessionState::RemoveFromMap, &[])
            .unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyInFinalState { .. }));
    }

    #[test]
    fn daemon_set_shutdown_reachable_from_any_non_absorbing_state() {
        let session = session();
        session
            .transition(PodSessionState::DaemonSetShutdown, &[])
            .unwrap();
        assert_eq!(session.state(), PodSessionState::DaemonSetShutdown);

        let err = session
            .transition(PodSessionState::Running, &[PodSessionState::Pending])
            .unwrap_err();
        assert!(matches!(err, TransitionError::AlreadyInFinalState { .. }));
    }

    #[test]
    fn shutdown_race_exactly_one_winner() {
        let session = session();
        session
            .transition(PodSessionState::Running, &[PodSessionState::Pending])
            .unwrap();
        session
            .transition(
                PodSessionState::TrafficMonitoringRunning,
                &[PodSessionState::Running],
            )
            .unwrap();

        let a = session.transition(
            PodSessionState::TrafficMonitoringEnded,
            &[PodSessionState::TrafficMonitoringRunning],
        );
        let b = session.transition(PodSessionState::DaemonSetShutdown, &[]);

        assert!(a.is_ok());
        assert!(b.is_err());
        assert_eq!(session.state(), PodSessionState::TrafficMonitoringEnded);
    }

    #[test]
    fn stop_channel_tolerates_duplicate_send() {
        let session = session();
        session.send_stop();
        session.send_stop();
        // third send would exceed capacity 2 but must not panic/block
        session.send_stop();
    }
}
