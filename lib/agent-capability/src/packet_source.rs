use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use snafu::Snafu;

use insights_agent_witness::{FiveTuple, MethodTree};

/// One synthesized HTTP request, carrying everything the Pairing
/// Collector needs to build a `PartialWitness` (spec.md §3, §4.3 step 1).
#[derive(Clone, Debug)]
pub struct HttpRequestEvent {
    pub stream_id: String,
    pub sequence_number: u64,
    pub tuple: FiveTuple,
    pub method: String,
    pub host: String,
    pub path_template: String,
    pub tree: MethodTree,
    pub observed_at: DateTime<Utc>,
    pub final_packet_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct HttpResponseEvent {
    pub stream_id: String,
    pub sequence_number: u64,
    pub tuple: FiveTuple,
    pub status_code: u16,
    pub tree: MethodTree,
    pub observed_at: DateTime<Utc>,
    pub final_packet_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct TcpConnectionMetadataEvent {
    pub tuple: FiveTuple,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug)]
pub struct TlsHandshakeMetadataEvent {
    pub tuple: FiveTuple,
    pub sni: Option<String>,
    pub negotiated_alpn: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// The tagged variant a packet/TLS parser emits (spec.md §4.3 step 1).
/// `Unknown` covers anything the parser recognized at the frame level
/// but could not classify further; the Capture Session counts but
/// otherwise drops it.
#[derive(Clone, Debug)]
pub enum ParsedNetworkTraffic {
    HttpRequest(HttpRequestEvent),
    HttpResponse(HttpResponseEvent),
    TcpConnectionMetadata(TcpConnectionMetadataEvent),
    TlsHandshakeMetadata(TlsHandshakeMetadataEvent),
    TlsClientHello { tuple: FiveTuple, sni: Option<String> },
    TlsServerHello { tuple: FiveTuple },
    Http2ConnectionPreface { tuple: FiveTuple },
    QuicHandshakeMetadata { tuple: FiveTuple },
    Unknown,
}

impl ParsedNetworkTraffic {
    /// Short tag used for the packet-count shim's per-kind counters
    /// (spec.md §4.3 step 4).
    pub fn kind_tag(&self) -> &'static str {
        match self {
            ParsedNetworkTraffic::HttpRequest(_) => "http_request",
            ParsedNetworkTraffic::HttpResponse(_) => "http_response",
            ParsedNetworkTraffic::TcpConnectionMetadata(_) => "tcp_connection_metadata",
            ParsedNetworkTraffic::TlsHandshakeMetadata(_) => "tls_handshake_metadata",
            ParsedNetworkTraffic::TlsClientHello { .. } => "tls_client_hello",
            ParsedNetworkTraffic::TlsServerHello { .. } => "tls_server_hello",
            ParsedNetworkTraffic::Http2ConnectionPreface { .. } => "http2_connection_preface",
            ParsedNetworkTraffic::QuicHandshakeMetadata { .. } => "quic_handshake_metadata",
            ParsedNetworkTraffic::Unknown => "unknown",
        }
    }

    /// The 5-tuple, when this variant carries one — used by the
    /// self-traffic filter and sampling wrapper (spec.md §4.3 steps 2-3).
    pub fn tuple(&self) -> Option<&FiveTuple> {
        match self {
            ParsedNetworkTraffic::HttpRequest(e) => Some(&e.tuple),
            ParsedNetworkTraffic::HttpResponse(e) => Some(&e.tuple),
            ParsedNetworkTraffic::TcpConnectionMetadata(e) => Some(&e.tuple),
            ParsedNetworkTraffic::TlsHandshakeMetadata(e) => Some(&e.tuple),
            ParsedNetworkTraffic::TlsClientHello { tuple, .. } => Some(tuple),
            ParsedNetworkTraffic::TlsServerHello { tuple } => Some(tuple),
            ParsedNetworkTraffic::Http2ConnectionPreface { tuple } => Some(tuple),
            ParsedNetworkTraffic::QuicHandshakeMetadata { tuple } => Some(tuple),
            ParsedNetworkTraffic::Unknown => None,
        }
    }

    /// The pairing key components, when this variant is request/response.
    pub fn stream_and_sequence(&self) -> Option<(&str, u64)> {
        match self {
            ParsedNetworkTraffic::HttpRequest(e) => Some((&e.stream_id, e.sequence_number)),
            ParsedNetworkTraffic::HttpResponse(e) => Some((&e.stream_id, e.sequence_number)),
            _ => None,
        }
    }
}

#[derive(Debug, Snafu)]
pub enum PacketSourceError {
    #[snafu(display("failed to open packet source on {ns_path}: {message}"))]
    Open { ns_path: String, message: String },
    #[snafu(display("failed to close packet source: {message}"))]
    Close { message: String },
}

/// Capability interface 3 (spec.md §6). The real implementation is the
/// raw packet-decoding engine and is out of scope (spec.md §1).
#[async_trait]
pub trait PacketSource: Send + Sync {
    async fn open(
        &self,
        ns_path: &Path,
        interface: Option<&str>,
        bpf_filter: Option<&str>,
    ) -> Result<BoxStream<'static, ParsedNetworkTraffic>, PacketSourceError>;

    async fn close(&self) -> Result<(), PacketSourceError>;
}
