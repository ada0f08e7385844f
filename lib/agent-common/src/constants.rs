//! Design-default tunables named throughout spec.md. These are `const`s
//! rather than a runtime-reloadable config because nothing in the spec
//! requires them to change without a restart.

use std::time::Duration;

/// How long an unpaired partial witness may sit in the pairing cache
/// before the expiration sweep flushes it single-sided.
pub const PAIR_EXPIRATION: Duration = Duration::from_secs(60);

/// Cadence of the pairing cache's background expiration sweep.
pub const PAIR_CLEANUP_INTERVAL: Duration = Duration::from_secs(30);

/// Ceiling on the total serialized size of one upload batch.
pub const BATCH_MAX_BYTES: u64 = 60 * 1024 * 1024;

/// Cadence of the upload batcher's background flush ticker, and the
/// maximum age of the oldest entry in a batch before a flush is forced.
pub const BATCH_FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Per-witness byte cap before the obfuscate-or-drop fallback applies.
pub const MAX_WITNESS_BYTES: u64 = 1024 * 1024;

/// Deadline on an upload RPC to the ingestion service.
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline on a telemetry RPC to the ingestion service.
pub const TELEMETRY_TIMEOUT: Duration = Duration::from_secs(20);

/// Default pod health poll interval.
pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Default telemetry interval.
pub const TELEMETRY_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// TTL for the (pid, fd) -> (local, remote) socket resolution cache used
/// by the TLS event source integration (see `agent-capability`).
pub const FD_RESOLVER_CACHE_TTL: Duration = Duration::from_secs(2);

/// Bound on how long a Capture Session's shutdown path (pending-pair
/// flush plus one batch flush) is allowed to take.
pub const SESSION_SHUTDOWN_BUDGET: Duration = Duration::from_secs(10);

/// Per-pod retry cap for the "Pending observed Running without a
/// session" relaunch path (resolves the first Open Question in
/// spec.md §9 / SPEC_FULL.md §3.1).
pub const ENV_INSPECTION_RETRY_CAP: u32 = 5;

/// Literal replacement string the Redactor substitutes for a matched
/// primitive.
pub const REDACTED_PLACEHOLDER: &str = "*REDACTED*";

/// Annotation that opts a pod out of capture outright.
pub const ANNOTATION_OPT_OUT: &str = "insights.postman.com/opt-out";

/// Annotation that disables capture for a pod (legacy alias of opt-out).
pub const ANNOTATION_INSIGHTS_ENABLED: &str = "insights-enabled";

/// Stop channel capacity: tolerates a duplicate close from a racing
/// supervisor-shutdown and pod-delete without blocking the sender.
pub const STOP_CHANNEL_CAPACITY: usize = 2;
