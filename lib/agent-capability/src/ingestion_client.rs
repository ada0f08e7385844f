use async_trait::async_trait;
use snafu::Snafu;

use insights_agent_witness::RawReport;

/// Per-service dynamic policy pulled from `GetDynamicAgentConfig`
/// (spec.md §3 Redaction Policy: "may be refreshed periodically from
/// the ingestion service for per-service policy overrides"). Kept as
/// plain strings here — compiling them into a `RedactionPolicy` is
/// `agent-redact`'s job, not this capability's.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DynamicAgentConfig {
    pub sensitive_keys: Vec<String>,
    pub sensitive_value_patterns: Vec<String>,
}

/// An upload failure, distinguishing HTTP 429 from every other
/// transport/server error (spec.md §6 interface 5, §4.6 `Flush`): the
/// Upload Batcher surfaces a throttling diagnostic only for the former.
#[derive(Debug, Clone, Snafu)]
pub enum UploadError {
    #[snafu(display("ingestion service is throttling uploads (429)"))]
    TooManyRequests,
    #[snafu(display("upload failed: {message}"))]
    Transport { message: String },
}

#[derive(Debug, Snafu)]
pub enum IngestionError {
    #[snafu(display("request to ingestion service failed: {message}"))]
    Transport { message: String },
}

/// Capability interface 5 (spec.md §6): the client used to upload
/// report batches, fetch per-service dynamic policy, and post
/// telemetry. The real HTTP/gRPC client is out of scope (spec.md §1);
/// "Telemetry/analytics reporting to a third-party analytics endpoint"
/// is also named out of scope there — `post_telemetry` is kept on the
/// trait because spec.md §6 lists it as part of this capability's
/// contract, but the core's own telemetry needs are served locally by
/// the ambient metrics/tracing stack (SPEC_FULL.md §1), not by calling
/// this method on every event.
#[async_trait]
pub trait IngestionClient: Send + Sync {
    async fn upload_reports_async(
        &self,
        learn_session: &str,
        reports: &[RawReport],
    ) -> Result<(), UploadError>;

    async fn get_dynamic_agent_config(
        &self,
        service: &str,
    ) -> Result<DynamicAgentConfig, IngestionError>;

    async fn post_telemetry(&self, cluster: &str) -> Result<(), IngestionError>;
}
