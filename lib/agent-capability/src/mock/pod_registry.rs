use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::pod_registry::{Phase, PodEvent, PodRegistry, PodRegistryError, PodSnapshot, PodUid};

/// An in-memory `PodRegistry`: `list_pods_on_node`/`get_pod_phase_by_uid`
/// answer from a fixed snapshot set at construction; `watch_pod_events`
/// replays whatever the test pushed onto the paired sender.
pub struct MockPodRegistry {
    pods: Mutex<Vec<PodSnapshot>>,
    events_rx: Mutex<Option<UnboundedReceiver<PodEvent>>>,
}

impl MockPodRegistry {
    pub fn new(pods: Vec<PodSnapshot>, events_rx: UnboundedReceiver<PodEvent>) -> Self {
        Self {
            pods: Mutex::new(pods),
            events_rx: Mutex::new(Some(events_rx)),
        }
    }
}

#[async_trait]
impl PodRegistry for MockPodRegistry {
    async fn list_pods_on_node(&self) -> Result<Vec<PodSnapshot>, PodRegistryError> {
        Ok(self.pods.lock().unwrap().clone())
    }

    async fn get_pod_phase_by_uid(
        &self,
        uids: &[PodUid],
    ) -> Result<BTreeMap<PodUid, Phase>, PodRegistryError> {
        let pods = self.pods.lock().unwrap();
        Ok(uids
            .iter()
            .filter_map(|uid| {
                pods.iter()
                    .find(|p| &p.uid == uid)
                    .map(|p| (uid.clone(), p.phase))
            })
            .collect())
    }

    fn watch_pod_events(&self) -> BoxStream<'static, PodEvent> {
        let rx = self
            .events_rx
            .lock()
            .unwrap()
            .take()
            .expect("MockPodRegistry::watch_pod_events called more than once");
        Box::pin(UnboundedReceiverStream::new(rx))
    }
}
