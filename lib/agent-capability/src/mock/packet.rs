use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::packet_source::{PacketSource, PacketSourceError, ParsedNetworkTraffic};

/// A `PacketSource` that replays whatever a test pushed onto the paired
/// sender, ignoring the namespace path/interface/filter arguments.
pub struct MockPacketSource {
    events_rx: Mutex<Option<UnboundedReceiver<ParsedNetworkTraffic>>>,
}

impl MockPacketSource {
    pub fn new(events_rx: UnboundedReceiver<ParsedNetworkTraffic>) -> Self {
        Self {
            events_rx: Mutex::new(Some(events_rx)),
        }
    }
}

#[async_trait]
impl PacketSource for MockPacketSource {
    async fn open(
        &self,
        _ns_path: &Path,
        _interface: Option<&str>,
        _bpf_filter: Option<&str>,
    ) -> Result<BoxStream<'static, ParsedNetworkTraffic>, PacketSourceError> {
        let rx = self
            .events_rx
            .lock()
            .unwrap()
            .take()
            .expect("MockPacketSource::open called more than once");
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn close(&self) -> Result<(), PacketSourceError> {
        Ok(())
    }
}
