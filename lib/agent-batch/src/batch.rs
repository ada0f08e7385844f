use std::time::Instant;

use insights_agent_witness::RawReport;

/// A bounded accumulation of Raw Reports (spec.md §3 Upload Batch).
/// Invariants enforced by the caller (`UploadBatcher`): total serialized
/// size `<= BATCH_MAX_BYTES` at the moment `Flush` is invoked; oldest
/// entry age `<= BATCH_FLUSH_INTERVAL`. Cleared only after a flush
/// attempt returns, success or failure alike.
pub struct UploadBatch {
    reports: Vec<RawReport>,
    total_bytes: u64,
    oldest_entry_at: Option<Instant>,
}

impl Default for UploadBatch {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadBatch {
    pub fn new() -> Self {
        Self {
            reports: Vec::new(),
            total_bytes: 0,
            oldest_entry_at: None,
        }
    }

    /// Appends `report`, preserving arrival order within the batch
    /// (spec.md §5 "Within one Upload Batch, report-arrival order is
    /// preserved").
    pub fn push(&mut self, report: RawReport) {
        self.total_bytes += report.estimated_size_bytes();
        self.reports.push(report);
        self.oldest_entry_at.get_or_insert_with(Instant::now);
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn oldest_entry_age(&self) -> Option<std::time::Duration> {
        self.oldest_entry_at.map(|t| t.elapsed())
    }

    /// Drains and returns every report, resetting the batch to empty
    /// (spec.md §3: "Cleared only after a flush attempt returns").
    pub fn clear(&mut self) -> Vec<RawReport> {
        self.total_bytes = 0;
        self.oldest_entry_at = None;
        std::mem::take(&mut self.reports)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_agent_witness::TcpConnectionReport;
    use std::net::{IpAddr, Ipv4Addr};

    fn report() -> RawReport {
        RawReport::TcpConnection(TcpConnectionReport {
            tuple: insights_agent_witness::FiveTuple {
                src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
                src_port: 1,
                dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
                dst_port: 2,
                interface: "eth0".to_string(),
            },
            opened_at: chrono::Utc::now(),
            closed_at: None,
        })
    }

    #[test]
    fn clear_empties_and_resets_size() {
        let mut batch = UploadBatch::new();
        batch.push(report());
        batch.push(report());
        assert_eq!(batch.len(), 2);
        assert!(batch.total_bytes() > 0);

        let drained = batch.clear();
        assert_eq!(drained.len(), 2);
        assert!(batch.is_empty());
        assert_eq!(batch.total_bytes(), 0);
    }

    #[test]
    fn reencoding_after_clear_is_empty() {
        let mut batch = UploadBatch::new();
        batch.push(report());
        batch.clear();
        assert!(batch.clear().is_empty());
    }
}
