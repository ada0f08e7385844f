use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::stream::{BoxStream, StreamExt};
use snafu::{ResultExt, Snafu};
use tokio::sync::broadcast;
use tokio::sync::mpsc::Receiver;
use tracing::{info, warn};

use insights_agent_batch::UploadBatcher;
use insights_agent_capability::packet_source::{PacketSource, PacketSourceError, ParsedNetworkTraffic};
use insights_agent_capability::tls_event_source::{SocketResolver, TlsEventSource, TlsEventSourceError};
use insights_agent_common::SESSION_SHUTDOWN_BUDGET;
use insights_agent_pairing::PairingCollector;
use insights_agent_witness::{FiveTuple, RawReport, TcpConnectionReport, TlsHandshakeReport};

use crate::pod_session::CapturePolicy;
use crate::sampling::should_sample;
use crate::tls_synthesis::{Http1Synthesizer, TtlSocketResolver};

#[derive(Debug, Snafu)]
pub enum CaptureSessionError {
    #[snafu(display("failed to open packet source: {source}"))]
    PacketOpen { source: PacketSourceError },
    #[snafu(display("failed to close packet source: {source}"))]
    PacketClose { source: PacketSourceError },
    #[snafu(display("failed to open TLS event source: {source}"))]
    TlsOpen { source: TlsEventSourceError },
}

/// Startup contract inputs for one Capture Session (spec.md §4.3).
pub struct CaptureSessionConfig {
    pub ns_path: PathBuf,
    pub interface: Option<String>,
    pub bpf_filter: Option<String>,
    pub policy: CapturePolicy,
    pub sample_rate: f64,
    /// Resolved addresses of the agent's own ingestion endpoint; traffic
    /// whose destination matches one is dropped by the self-traffic
    /// filter unless `dogfood` is set (spec.md §4.3 step 3).
    pub self_traffic_ips: Vec<IpAddr>,
    pub dogfood: bool,
}

/// A pluggable optional TLS ingestion path: the raw event source plus
/// the socket resolver used to recover the connection's 5-tuple.
pub struct TlsIngest {
    pub source: Arc<dyn TlsEventSource>,
    pub resolver: Arc<dyn SocketResolver>,
    pub libssl_paths: Vec<PathBuf>,
}

/// One pod's (or, in standalone mode, one host interface set's) capture
/// worker (spec.md §4.3): attaches to a network namespace, drives the
/// packet/TLS data path, and feeds a Pairing Collector until stopped.
pub struct CaptureSession {
    config: CaptureSessionConfig,
    packet_source: Arc<dyn PacketSource>,
    tls: Option<TlsIngest>,
    collector: PairingCollector,
    batcher: Arc<UploadBatcher>,
    stop_rx: Receiver<()>,
    done_rx: broadcast::Receiver<()>,
    seen_request: AtomicBool,
    seen_response: AtomicBool,
    first_pair_fired: AtomicBool,
}

impl CaptureSession {
    pub fn new(
        config: CaptureSessionConfig,
        packet_source: Arc<dyn PacketSource>,
        tls: Option<TlsIngest>,
        collector: PairingCollector,
        batcher: Arc<UploadBatcher>,
        stop_rx: Receiver<()>,
        done_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            packet_source,
            tls,
            collector,
            batcher,
            stop_rx,
            done_rx,
            seen_request: AtomicBool::new(false),
            seen_response: AtomicBool::new(false),
            first_pair_fired: AtomicBool::new(false),
        }
    }

    /// Enters the namespace exactly once, drives the data path until a
    /// stop is signalled, and shuts down within `SESSION_SHUTDOWN_BUDGET`
    /// (spec.md §4.3 "Cancellation").
    pub async fn run(mut self) -> Result<(), CaptureSessionError> {
        let packet_stream = self
            .packet_source
            .open(
                &self.config.ns_path,
                self.config.interface.as_deref(),
                self.config.bpf_filter.as_deref(),
            )
            .await
            .context(PacketOpenSnafu)?;

        let merged = self.merge_with_tls(packet_stream).await?;
        self.drive(merged).await;

        let CaptureSession {
            collector,
            packet_source,
            batcher,
            ..
        } = self;

        let shutdown = async {
            collector.close();
            batcher.close().await;
        };
        if tokio::time::timeout(SESSION_SHUTDOWN_BUDGET, shutdown)
            .await
            .is_err()
        {
            warn!("capture session shutdown exceeded its budget");
        }
        packet_source.close().await.context(PacketCloseSnafu)?;
        Ok(())
    }

    async fn merge_with_tls(
        &mut self,
        packet_stream: BoxStream<'static, ParsedNetworkTraffic>,
    ) -> Result<BoxStream<'static, ParsedNetworkTraffic>, CaptureSessionError> {
        let Some(tls) = self.tls.take() else {
            return Ok(packet_stream);
        };

        let tls_stream = tls
            .source
            .open(&tls.libssl_paths)
            .await
            .context(TlsOpenSnafu)?;

        let resolver = Arc::new(TtlSocketResolver::new(
            tls.resolver,
            insights_agent_common::FD_RESOLVER_CACHE_TTL,
        ));
        let synthesizer = Arc::new(Http1Synthesizer::new());
        let interface = self.config.interface.clone().unwrap_or_else(|| "tls".to_string());

        let synthesized = tls_stream.filter_map(move |ssl_event| {
            let resolver = Arc::clone(&resolver);
            let synthesizer = Arc::clone(&synthesizer);
            let interface = interface.clone();
            async move {
                let (local, remote) = resolver.resolve(ssl_event.pid, ssl_event.fd).await.ok()?;
                let tuple = FiveTuple {
                    src_ip: remote.ip(),
                    src_port: remote.port(),
                    dst_ip: local.ip(),
                    dst_port: local.port(),
                    interface,
                };
                synthesizer.ingest(&ssl_event, tuple)
            }
        });

        Ok(futures::stream::select(packet_stream, synthesized.boxed()).boxed())
    }

    async fn drive(&mut self, mut items: BoxStream<'static, ParsedNetworkTraffic>) {
        loop {
            tokio::select! {
                biased;
                _ = self.stop_rx.recv() => {
                    info!("capture session received stop signal");
                    break;
                }
                _ = self.done_rx.recv() => {
                    info!("capture session observed supervisor shutdown");
                    break;
                }
                item = items.next() => {
                    match item {
                        Some(item) => self.handle_item(item),
                        None => break,
                    }
                }
            }
        }
    }

    fn handle_item(&self, item: ParsedNetworkTraffic) {
        if let Some((stream_id, sequence_number)) = item.stream_and_sequence() {
            if !should_sample(stream_id, sequence_number, self.config.sample_rate) {
                metrics::counter!("witnesses_sampled_out_total", 1);
                return;
            }
        }

        if self.is_self_traffic(&item) {
            return;
        }

        self.count(&item);
        self.dispatch(item);
    }

    fn is_self_traffic(&self, item: &ParsedNetworkTraffic) -> bool {
        if self.config.dogfood {
            return false;
        }
        item.tuple()
            .map(|tuple| self.config.self_traffic_ips.contains(&tuple.dst_ip))
            .unwrap_or(false)
    }

    fn count(&self, item: &ParsedNetworkTraffic) {
        let kind = item.kind_tag();
        let interface = item
            .tuple()
            .map(|t| t.interface.clone())
            .unwrap_or_else(|| "unknown".to_string());
        metrics::counter!("packets_observed_total", 1, "kind" => kind, "interface" => interface);

        match item {
            ParsedNetworkTraffic::HttpRequest(_) => self.seen_request.store(true, Ordering::Relaxed),
            ParsedNetworkTraffic::HttpResponse(_) => self.seen_response.store(true, Ordering::Relaxed),
            _ => {}
        }

        if self.seen_request.load(Ordering::Relaxed)
            && self.seen_response.load(Ordering::Relaxed)
            && !self.first_pair_fired.swap(true, Ordering::Relaxed)
        {
            info!("first HTTP request/response pair observed on this capture session");
            metrics::counter!("capture_session_first_pair_total", 1);
        }
    }

    fn dispatch(&self, item: ParsedNetworkTraffic) {
        match item {
            ParsedNetworkTraffic::HttpRequest(event) => self.collector.process_request(event),
            ParsedNetworkTraffic::HttpResponse(event) => self.collector.process_response(event),
            ParsedNetworkTraffic::TcpConnectionMetadata(event) => {
                self.send_raw(RawReport::TcpConnection(TcpConnectionReport {
                    tuple: event.tuple,
                    opened_at: event.opened_at,
                    closed_at: event.closed_at,
                }));
            }
            ParsedNetworkTraffic::TlsHandshakeMetadata(event) => {
                self.send_raw(RawReport::TlsHandshake(TlsHandshakeReport {
                    tuple: event.tuple,
                    sni: event.sni,
                    negotiated_alpn: event.negotiated_alpn,
                    observed_at: event.observed_at,
                }));
            }
            ParsedNetworkTraffic::TlsClientHello { .. }
            | ParsedNetworkTraffic::TlsServerHello { .. }
            | ParsedNetworkTraffic::Http2ConnectionPreface { .. }
            | ParsedNetworkTraffic::QuicHandshakeMetadata { .. }
            | ParsedNetworkTraffic::Unknown => {}
        }
    }

    fn send_raw(&self, report: RawReport) {
        let batcher = Arc::clone(&self.batcher);
        tokio::spawn(async move {
            batcher.add(report).await;
        });
    }
}
