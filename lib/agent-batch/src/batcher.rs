use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use insights_agent_capability::{IngestionClient, UploadError};
use insights_agent_common::{BATCH_FLUSH_INTERVAL, BATCH_MAX_BYTES, MAX_WITNESS_BYTES, UPLOAD_TIMEOUT};
use insights_agent_witness::{ObfuscationFlag, RawReport, Witness};

use crate::batch::UploadBatch;

/// Options that shape one batcher instance; corresponds to the per-pod
/// capture policy fields relevant to upload (spec.md §3 Pod Session:
/// per-witness byte cap, upload batch buffer count).
#[derive(Clone, Debug)]
pub struct BatcherConfig {
    /// Whether witnesses handled by this batcher carry request/response
    /// payload bodies at all — when false, the oversize fallback has
    /// nothing to obfuscate and an oversized witness is dropped
    /// immediately (spec.md §4.6 `Add`).
    pub witnesses_have_payloads: bool,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            witnesses_have_payloads: true,
        }
    }
}

/// Size- and time-bounded buffer with per-witness size enforcement and
/// flush-with-retry-classification (spec.md §4.6). One instance is owned
/// by a single Capture Session's Pairing Collector output.
pub struct UploadBatcher {
    batch: Mutex<UploadBatch>,
    ingestion: Arc<dyn IngestionClient>,
    learn_session: Mutex<String>,
    config: BatcherConfig,
    ticker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl UploadBatcher {
    /// Spawns the background flush ticker (spec.md §4.6 "a ticker fires
    /// every `BATCH_FLUSH_INTERVAL`") and returns a shareable handle —
    /// shareable because the ticker task, `Add`, and `Flush` callers all
    /// need concurrent access to the same batch.
    pub fn spawn(
        ingestion: Arc<dyn IngestionClient>,
        learn_session: String,
        config: BatcherConfig,
    ) -> Arc<Self> {
        let this = Arc::new(Self {
            batch: Mutex::new(UploadBatch::new()),
            ingestion,
            learn_session: Mutex::new(learn_session),
            config,
            ticker_handle: Mutex::new(None),
        });

        let ticker_target = Arc::clone(&this);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(BATCH_FLUSH_INTERVAL);
            ticker.tick().await; // first tick fires immediately; skip it
            loop {
                ticker.tick().await;
                ticker_target.flush().await;
            }
        });
        *this.ticker_handle.lock() = Some(handle);
        this
    }

    /// `SwitchLearnSession` (spec.md §4.6 "Learn-session switching"): may
    /// be called concurrently with an in-flight `Flush`; only affects
    /// subsequent uploads.
    pub fn switch_learn_session(&self, new_session: String) {
        *self.learn_session.lock() = new_session;
    }

    pub fn pending_bytes(&self) -> u64 {
        self.batch.lock().total_bytes()
    }

    /// `Add(report)` (spec.md §4.6). Applies the per-witness size
    /// policy, then appends to the batch; triggers an inline flush if
    /// the batch crossed `BATCH_MAX_BYTES`.
    pub async fn add(&self, report: RawReport) {
        let report = match report {
            RawReport::Witness(witness) => match self.apply_witness_size_policy(witness) {
                Some(witness) => RawReport::Witness(witness),
                None => return,
            },
            other => other,
        };

        let should_flush = {
            let mut batch = self.batch.lock();
            batch.push(report);
            batch.total_bytes() >= BATCH_MAX_BYTES
        };
        if should_flush {
            self.flush().await;
        }
    }

    fn apply_witness_size_policy(&self, witness: Witness) -> Option<Witness> {
        let size = RawReport::Witness(witness.clone()).estimated_size_bytes();
        if size <= MAX_WITNESS_BYTES {
            return Some(witness);
        }

        if !self.config.witnesses_have_payloads {
            self.record_oversized(&witness);
            return None;
        }

        let mut obfuscated = witness;
        insights_agent_redact::zero_method_tree(&mut obfuscated.request);
        if let Some(response) = obfuscated.response.as_mut() {
            insights_agent_redact::zero_method_tree(response);
        }
        obfuscated.meta.obfuscation = ObfuscationFlag::ZeroValue;

        let resized = RawReport::Witness(obfuscated.clone()).estimated_size_bytes();
        if resized <= MAX_WITNESS_BYTES {
            Some(obfuscated)
        } else {
            self.record_oversized(&obfuscated);
            None
        }
    }

    fn record_oversized(&self, witness: &Witness) {
        metrics::counter!(
            "witnesses_oversized_total",
            1,
            "interface" => witness.tuple.interface.clone(),
            "src_port" => witness.tuple.src_port.to_string(),
            "dst_port" => witness.tuple.dst_port.to_string(),
        );
    }

    /// `Flush()` (spec.md §4.6): no-op if empty; uploads with a 30s
    /// deadline; always clears the batch on return regardless of
    /// outcome. 429 surfaces a throttling diagnostic; other errors are
    /// logged; neither is propagated to the caller (spec.md §7).
    pub async fn flush(&self) {
        let reports = {
            let mut batch = self.batch.lock();
            batch.clear()
        };
        if reports.is_empty() {
            return;
        }

        let learn_session = self.learn_session.lock().clone();
        let upload = self.ingestion.upload_reports_async(&learn_session, &reports);
        match tokio::time::timeout(UPLOAD_TIMEOUT, upload).await {
            Ok(Ok(())) => {
                metrics::counter!("batch_flush_total", 1);
            }
            Ok(Err(UploadError::TooManyRequests)) => {
                warn!("your uploads are being throttled by the ingestion service; reduce capture volume or request a higher rate limit");
                metrics::counter!("upload_throttled_total", 1);
            }
            Ok(Err(UploadError::Transport { message })) => {
                error!(error = %message, "upload failed");
                metrics::counter!("batch_flush_errors_total", 1);
            }
            Err(_elapsed) => {
                error!(timeout_secs = UPLOAD_TIMEOUT.as_secs(), "upload timed out");
                metrics::counter!("batch_flush_errors_total", 1);
            }
        }
    }

    /// `Close()` (spec.md §4.6): stops the ticker, flushes once, then
    /// returns. Takes `self: Arc<Self>` since the ticker task holds its
    /// own clone that must be torn down here, not on drop.
    pub async fn close(self: Arc<Self>) {
        if let Some(handle) = self.ticker_handle.lock().take() {
            handle.abort();
        }
        self.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_agent_capability::mock::MockIngestionClient;
    use insights_agent_value::Value;
    use insights_agent_witness::{FiveTuple, MethodMeta, MethodTree, PairKey};
    use std::net::{IpAddr, Ipv4Addr};

    fn tuple() -> FiveTuple {
        FiveTuple {
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            src_port: 1,
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            dst_port: 2,
            interface: "eth0".to_string(),
        }
    }

    fn witness_with_body(body: Value) -> Witness {
        Witness {
            pair_key: PairKey::new("s", 1),
            tuple: tuple(),
            request: MethodTree {
                body: Some(body),
                ..MethodTree::empty()
            },
            response: None,
            meta: MethodMeta {
                method: "POST".to_string(),
                host: "example.com".to_string(),
                path_template: "/v1/doggos".to_string(),
                processing_latency_ms: None,
                obfuscation: ObfuscationFlag::None,
            },
            status_code: None,
            request_end: None,
            response_start: None,
        }
    }

    #[tokio::test]
    async fn flush_is_noop_on_empty_batch() {
        let ingestion = Arc::new(MockIngestionClient::new());
        let batcher = UploadBatcher::spawn(ingestion.clone(), "learn-1".to_string(), BatcherConfig::default());
        batcher.flush().await;
        assert_eq!(ingestion.upload_count(), 0);
        batcher.close().await;
    }

    #[tokio::test]
    async fn add_then_flush_uploads_and_clears() {
        let ingestion = Arc::new(MockIngestionClient::new());
        let batcher = UploadBatcher::spawn(ingestion.clone(), "learn-1".to_string(), BatcherConfig::default());

        batcher.add(RawReport::Witness(witness_with_body(Value::from("x")))).await;
        assert!(batcher.pending_bytes() > 0);

        batcher.flush().await;
        assert_eq!(batcher.pending_bytes(), 0);
        assert_eq!(ingestion.upload_count(), 1);
        batcher.close().await;
    }

    #[tokio::test]
    async fn oversized_witness_is_obfuscated_then_retained_if_now_small_enough() {
        let ingestion = Arc::new(MockIngestionClient::new());
        let batcher = UploadBatcher::spawn(ingestion.clone(), "learn-1".to_string(), BatcherConfig::default());

        let huge = "x".repeat((MAX_WITNESS_BYTES + 1024) as usize);
        batcher.add(RawReport::Witness(witness_with_body(Value::from(huge)))).await;

        // the zero-obfuscator collapses the oversized string to "", so
        // the witness should have been retained, not dropped.
        assert!(batcher.pending_bytes() > 0);
        assert!(batcher.pending_bytes() < MAX_WITNESS_BYTES);
        batcher.close().await;
    }

    #[tokio::test]
    async fn throttled_upload_is_logged_and_batch_still_cleared() {
        let ingestion = Arc::new(MockIngestionClient::new());
        ingestion.queue_failure(UploadError::TooManyRequests);
        let batcher = UploadBatcher::spawn(ingestion.clone(), "learn-1".to_string(), BatcherConfig::default());

        batcher.add(RawReport::Witness(witness_with_body(Value::from("x")))).await;
        batcher.flush().await;
        assert_eq!(batcher.pending_bytes(), 0, "batch is cleared even on failure");
        batcher.close().await;
    }
}
