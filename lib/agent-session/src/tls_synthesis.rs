//! Socket resolution (with a short TTL cache) and minimal HTTP/1 text
//! framing over the plaintext chunks the TLS Event Source capability
//! yields (spec.md §4.3 step 1, §6 capability interface 4, §9 Design
//! Note 2). HTTP/2 framing is intentionally not implemented here: the
//! spec requires only that synthesized items carry a stable
//! per-connection stream-id and a monotonically increasing per-message
//! sequence number, which this module satisfies by keying on the SSL
//! pointer and a per-pointer message counter.

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;

use insights_agent_capability::packet_source::{HttpRequestEvent, HttpResponseEvent, ParsedNetworkTraffic};
use insights_agent_capability::tls_event_source::{SocketResolver, SocketResolverError, SslDirection, SslEvent};
use insights_agent_witness::{FiveTuple, MethodTree};
use insights_agent_value::Value;

/// Wraps a `SocketResolver` with a short TTL cache (design default 2s,
/// `FD_RESOLVER_CACHE_TTL`) so a hot connection doesn't re-resolve its
/// `/proc/*/fd` entry on every chunk.
pub struct TtlSocketResolver {
    inner: Arc<dyn SocketResolver>,
    cache: DashMap<(u32, i32), (SocketAddr, SocketAddr, Instant)>,
    ttl: Duration,
}

impl TtlSocketResolver {
    pub fn new(inner: Arc<dyn SocketResolver>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            ttl,
        }
    }

    pub async fn resolve(&self, pid: u32, fd: i32) -> Result<(SocketAddr, SocketAddr), SocketResolverError> {
        if let Some(entry) = self.cache.get(&(pid, fd)) {
            let (local, remote, cached_at) = *entry;
            if cached_at.elapsed() < self.ttl {
                return Ok((local, remote));
            }
        }
        let (local, remote) = self.inner.resolve(pid, fd).await?;
        self.cache.insert((pid, fd), (local, remote, Instant::now()));
        Ok((local, remote))
    }
}

#[derive(Default)]
struct StreamBuffer {
    bytes: Vec<u8>,
    sequence_number: u64,
}

/// Buffers per-`SSL*`-pointer plaintext chunks and applies a minimal
/// HTTP/1 text parser, synthesizing `HttpRequest`/`HttpResponse` items.
/// Chunked transfer-encoding and HTTP/2 are out of scope; a message
/// without a recognized `Content-Length` is treated as complete as soon
/// as the header block is seen.
pub struct Http1Synthesizer {
    streams: Mutex<HashMap<u64, StreamBuffer>>,
}

impl Default for Http1Synthesizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Http1Synthesizer {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
        }
    }

    /// Feeds one plaintext chunk; returns any fully-framed item it
    /// completed. `tuple` is the already-resolved 5-tuple for this
    /// connection (client -> server orientation).
    pub fn ingest(&self, event: &SslEvent, tuple: FiveTuple) -> Option<ParsedNetworkTraffic> {
        let mut streams = self.streams.lock();
        let buffer = streams.entry(event.ssl_ptr).or_default();
        buffer.bytes.extend_from_slice(&event.payload);

        let header_end = find_header_end(&buffer.bytes)?;
        let head = std::str::from_utf8(&buffer.bytes[..header_end]).ok()?;
        let mut lines = head.split("\r\n");
        let start_line = lines.next()?;
        let headers = parse_headers(lines);

        let content_length = headers
            .get("content-length")
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(0);
        let body_start = header_end + 4;
        if buffer.bytes.len() < body_start + content_length {
            return None; // not fully buffered yet
        }

        let body_bytes = buffer.bytes[body_start..body_start + content_length].to_vec();
        buffer.bytes.drain(..body_start + content_length);
        let sequence_number = buffer.sequence_number;
        buffer.sequence_number += 1;

        let stream_id = format!("ssl-{}", event.ssl_ptr);
        let now = Utc::now();
        let tree = method_tree_from_headers_and_body(&headers, &body_bytes);

        match event.direction {
            SslDirection::Recv => {
                let (method, path) = parse_request_line(start_line)?;
                let host = headers.get("host").cloned().unwrap_or_default();
                Some(ParsedNetworkTraffic::HttpRequest(HttpRequestEvent {
                    stream_id,
                    sequence_number,
                    tuple,
                    method,
                    host,
                    path_template: path,
                    tree,
                    observed_at: now,
                    final_packet_at: event.timestamp,
                }))
            }
            SslDirection::Send => {
                let status_code = parse_status_line(start_line)?;
                Some(ParsedNetworkTraffic::HttpResponse(HttpResponseEvent {
                    stream_id,
                    sequence_number,
                    tuple,
                    status_code,
                    tree,
                    observed_at: event.timestamp,
                    final_packet_at: now,
                }))
            }
        }
    }
}

fn find_header_end(bytes: &[u8]) -> Option<usize> {
    bytes.windows(4).position(|w| w == b"\r\n\r\n")
}

fn parse_headers<'a>(lines: impl Iterator<Item = &'a str>) -> BTreeMap<String, String> {
    lines
        .filter_map(|line| {
            let (name, value) = line.split_once(':')?;
            Some((name.trim().to_lowercase(), value.trim().to_string()))
        })
        .collect()
}

fn parse_request_line(line: &str) -> Option<(String, String)> {
    let mut parts = line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();
    let path_template = target.split('?').next().unwrap_or(&target).to_string();
    Some((method, path_template))
}

fn parse_status_line(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse().ok()
}

fn method_tree_from_headers_and_body(headers: &BTreeMap<String, String>, body: &[u8]) -> MethodTree {
    let header_value = Value::Object(
        headers
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    );
    let cookies = headers
        .get("cookie")
        .map(|raw| {
            Value::Object(
                raw.split(';')
                    .filter_map(|pair| pair.split_once('='))
                    .map(|(k, v)| (k.trim().to_string(), Value::String(v.trim().to_string())))
                    .collect(),
            )
        })
        .unwrap_or_else(|| Value::Object(Default::default()));
    let auth = headers
        .get("authorization")
        .map(|v| Value::String(v.clone()))
        .unwrap_or(Value::Null);

    let body_value = if body.is_empty() {
        None
    } else {
        match serde_json::from_slice::<serde_json::Value>(body) {
            Ok(json) => Some(Value::from(json)),
            Err(_) => Some(Value::String(String::from_utf8_lossy(body).into_owned())),
        }
    };

    MethodTree {
        headers: header_value,
        query: Value::Object(Default::default()),
        cookies,
        auth,
        body: body_value,
    }
}
