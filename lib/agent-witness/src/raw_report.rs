use chrono::{DateTime, Utc};

use crate::tuple::FiveTuple;
use crate::witness::Witness;

/// A connection-level report with no paired HTTP exchange — still worth
/// recording so the ingestion service can reason about connection
/// churn (spec.md §3 Raw Report).
#[derive(Clone, Debug)]
pub struct TcpConnectionReport {
    pub tuple: FiveTuple,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// A TLS handshake observation, reported even when no plaintext could
/// be recovered (e.g. no matching key material source).
#[derive(Clone, Debug)]
pub struct TlsHandshakeReport {
    pub tuple: FiveTuple,
    pub sni: Option<String>,
    pub negotiated_alpn: Option<String>,
    pub observed_at: DateTime<Utc>,
}

/// Tagged-variant record queued to the Upload Batcher (spec.md §3).
#[derive(Clone, Debug)]
pub enum RawReport {
    Witness(Witness),
    TcpConnection(TcpConnectionReport),
    TlsHandshake(TlsHandshakeReport),
}

impl RawReport {
    /// A rough, allocation-free-ish size estimate used by the Upload
    /// Batcher's size accounting. A real implementation would use the
    /// ingestion wire encoder; this crate only needs an estimate
    /// monotonic enough to drive the size policy (spec.md §4.6).
    pub fn estimated_size_bytes(&self) -> u64 {
        match self {
            RawReport::Witness(w) => estimate_witness_bytes(w),
            RawReport::TcpConnection(_) => 128,
            RawReport::TlsHandshake(r) => {
                128 + r.sni.as_ref().map_or(0, |s| s.len() as u64)
                    + r.negotiated_alpn.as_ref().map_or(0, |s| s.len() as u64)
            }
        }
    }
}

fn estimate_witness_bytes(witness: &Witness) -> u64 {
    use insights_agent_value::Value;

    fn value_size(value: &Value) -> u64 {
        match value {
            Value::String(s) => s.len() as u64,
            Value::Integer(_) | Value::Float(_) | Value::Boolean(_) => 8,
            Value::Null => 0,
            Value::Object(map) => map
                .iter()
                .map(|(k, v)| k.len() as u64 + value_size(v))
                .sum(),
            Value::Array(items) => items.iter().map(value_size).sum(),
        }
    }

    let mut total = 64u64; // fixed overhead: meta, tuple, timestamps
    total += witness.meta.method.len() as u64;
    total += witness.meta.host.len() as u64;
    total += witness.meta.path_template.len() as u64;
    total += value_size(&witness.request.headers);
    total += value_size(&witness.request.query);
    total += value_size(&witness.request.cookies);
    total += value_size(&witness.request.auth);
    total += witness.request.body.as_ref().map_or(0, value_size);
    if let Some(response) = &witness.response {
        total += value_size(&response.headers);
        total += value_size(&response.query);
        total += value_size(&response.cookies);
        total += value_size(&response.auth);
        total += response.body.as_ref().map_or(0, value_size);
    }
    total
}
