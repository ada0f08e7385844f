use std::net::SocketAddr;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use snafu::Snafu;

/// Direction of one chunk of plaintext captured at the libssl uprobe.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SslDirection {
    Send,
    Recv,
}

/// One plaintext chunk read or written through an SSL connection,
/// identified by the userspace `SSL*` pointer plus the owning process
/// and file descriptor (spec.md §6, capability interface 4). The core
/// buffers these per `ssl_ptr` and applies a standard HTTP/1 or HTTP/2
/// text parser to synthesize `HttpRequest`/`HttpResponse` items
/// (spec.md §4.3 step 1).
#[derive(Clone, Debug)]
pub struct SslEvent {
    pub ssl_ptr: u64,
    pub pid: u32,
    pub fd: i32,
    pub direction: SslDirection,
    pub payload: Vec<u8>,
    pub timestamp: DateTime<Utc>,
    /// True if the uprobe could not capture the full write/read and this
    /// chunk is a partial view; the HTTP/1/2 synthesis layer must treat
    /// the message as potentially malformed.
    pub truncated: bool,
}

#[derive(Debug, Snafu)]
pub enum TlsEventSourceError {
    #[snafu(display("failed to open TLS event source: {message}"))]
    Open { message: String },
    #[snafu(display("failed to close TLS event source: {message}"))]
    Close { message: String },
}

/// Capability interface 4 (spec.md §6), optional: the real
/// implementation is an eBPF uprobe loader tapping libssl and is out of
/// scope (spec.md §1). Per the Design Note in spec.md §9, the exact
/// HTTP/1-vs-HTTP/2 framing boundary is this capability's problem; the
/// core requires only that synthesized items carry a stable
/// per-connection stream-id and a monotonically increasing per-message
/// sequence number (expressed on `ParsedNetworkTraffic`, not here).
#[async_trait]
pub trait TlsEventSource: Send + Sync {
    async fn open(
        &self,
        libssl_paths: &[PathBuf],
    ) -> Result<BoxStream<'static, SslEvent>, TlsEventSourceError>;

    async fn close(&self) -> Result<(), TlsEventSourceError>;
}

#[derive(Debug, Snafu)]
pub enum SocketResolverError {
    #[snafu(display("no socket found for pid {pid} fd {fd}"))]
    NotFound { pid: u32, fd: i32 },
}

/// Maps `(pid, fd)` to `(local, remote)` socket addresses via a
/// `/proc/*/fd` resolver, with a short TTL cache (design default: 2s,
/// `FD_RESOLVER_CACHE_TTL`) — spec.md §6 describes this as part of the
/// TLS Event Source integration. The real `/proc` read is a leaf
/// collaborator; the TTL cache wrapping it lives in `agent-session`
/// (spec.md §4.3 owns the capture session's resource lifetime).
#[async_trait]
pub trait SocketResolver: Send + Sync {
    async fn resolve(&self, pid: u32, fd: i32) -> Result<(SocketAddr, SocketAddr), SocketResolverError>;
}
