use std::sync::Mutex;

use async_trait::async_trait;

use insights_agent_witness::RawReport;

use crate::ingestion_client::{DynamicAgentConfig, IngestionClient, IngestionError, UploadError};

/// Records every call for assertions; `fail_with` makes the next N
/// uploads fail with a chosen error, used by the Upload Batcher's
/// retry-classification tests (spec.md §4.6, §7).
#[derive(Default)]
pub struct MockIngestionClient {
    uploads: Mutex<Vec<(String, Vec<RawReport>)>>,
    fail_next_uploads: Mutex<Vec<UploadError>>,
    dynamic_config: Mutex<DynamicAgentConfig>,
}

impl MockIngestionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues upload failures; they are consumed front-to-back, one per
    /// `upload_reports_async` call, after which uploads succeed again.
    pub fn queue_failure(&self, err: UploadError) {
        self.fail_next_uploads.lock().unwrap().push(err);
    }

    pub fn set_dynamic_config(&self, config: DynamicAgentConfig) {
        *self.dynamic_config.lock().unwrap() = config;
    }

    pub fn uploaded_batches(&self) -> Vec<(String, Vec<RawReport>)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn upload_count(&self) -> usize {
        self.uploads.lock().unwrap().len()
    }
}

#[async_trait]
impl IngestionClient for MockIngestionClient {
    async fn upload_reports_async(
        &self,
        learn_session: &str,
        reports: &[RawReport],
    ) -> Result<(), UploadError> {
        let mut queue = self.fail_next_uploads.lock().unwrap();
        if !queue.is_empty() {
            return Err(queue.remove(0));
        }
        drop(queue);
        self.uploads
            .lock()
            .unwrap()
            .push((learn_session.to_string(), reports.to_vec()));
        Ok(())
    }

    async fn get_dynamic_agent_config(
        &self,
        _service: &str,
    ) -> Result<DynamicAgentConfig, IngestionError> {
        Ok(self.dynamic_config.lock().unwrap().clone())
    }

    async fn post_telemetry(&self, _cluster: &str) -> Result<(), IngestionError> {
        Ok(())
    }
}
