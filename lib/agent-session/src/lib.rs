//! Per-pod lifecycle (spec.md §4.2) and the per-pod capture worker
//! (spec.md §4.3): namespace attach, the packet/TLS data path
//! (sample -> self-traffic filter -> packet-count shim -> dispatch),
//! and bounded-time cancellation.

mod capture_session;
mod pod_session;
mod sampling;
mod tls_synthesis;

pub use capture_session::{CaptureSession, CaptureSessionConfig, CaptureSessionError, TlsIngest};
pub use pod_session::{CapturePolicy, PodSession, PodSessionState, TracingTags, TransitionError};
pub use sampling::should_sample;
pub use tls_synthesis::{Http1Synthesizer, TtlSocketResolver};
