use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use insights_agent_capability::packet_source::{HttpRequestEvent, HttpResponseEvent};
use insights_agent_common::{PAIR_CLEANUP_INTERVAL, PAIR_EXPIRATION};
use insights_agent_redact::PolicyStore;
use insights_agent_witness::{PartialWitness, RawReport, Witness};

use crate::cache::{PairingCache, TakeOutcome};
use crate::convert::{request_to_partial, response_to_partial};
use crate::policy_gate::apply_policy_gate;

/// Matches partial request/response witnesses by pair key, computes
/// processing latency, and applies the redact/zero policy gate before
/// handing finished witnesses to whatever consumes `RawReport`s (the
/// Upload Batcher, owned one layer up by the Capture Session — spec.md
/// §4.4).
pub struct PairingCollector {
    cache: Arc<PairingCache>,
    sink: UnboundedSender<RawReport>,
    policy_store: Arc<PolicyStore>,
    repro_mode: bool,
    sweep_handle: JoinHandle<()>,
}

impl PairingCollector {
    pub fn new(sink: UnboundedSender<RawReport>, policy_store: Arc<PolicyStore>, repro_mode: bool) -> Self {
        let cache = Arc::new(PairingCache::new());
        let sweep_handle = spawn_sweep(
            Arc::clone(&cache),
            sink.clone(),
            Arc::clone(&policy_store),
            repro_mode,
        );
        Self {
            cache,
            sink,
            policy_store,
            repro_mode,
            sweep_handle,
        }
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    pub fn process_request(&self, event: HttpRequestEvent) {
        self.process_partial(request_to_partial(event));
    }

    pub fn process_response(&self, event: HttpResponseEvent) {
        self.process_partial(response_to_partial(event));
    }

    fn process_partial(&self, partial: PartialWitness) {
        let key = partial.pair_key.clone();
        let arriving = partial.clone();
        metrics::gauge!("pairing_cache_size", self.cache.len() as f64);
        match self.cache.take_or_insert(key, partial) {
            TakeOutcome::Stored => {
                trace!("stored partial witness in pairing cache");
            }
            TakeOutcome::Merged(existing) => {
                let witness = Witness::merge(existing, arriving);
                self.emit(witness);
            }
        }
    }

    /// `Close()` (spec.md §4.4): flushes the pairing cache as if every
    /// entry had expired, stops the background sweep, and returns —
    /// closing the underlying batcher is the Capture Session's job,
    /// since this crate does not own the batcher (spec.md dependency
    /// order: Pairing Collector -> Upload Batcher).
    pub fn close(self) {
        self.sweep_handle.abort();
        for partial in self.cache.drain_all() {
            self.emit(Witness::single_sided(partial));
        }
    }

    fn emit(&self, witness: Witness) {
        let policy = self.policy_store.current();
        let gated = apply_policy_gate(witness, self.repro_mode, &policy);
        metrics::counter!("witnesses_emitted_total", 1);
        if self.sink.send(RawReport::Witness(gated)).is_err() {
            warn!("pairing collector's report sink is closed; dropping witness");
        }
    }
}

fn spawn_sweep(
    cache: Arc<PairingCache>,
    sink: UnboundedSender<RawReport>,
    policy_store: Arc<PolicyStore>,
    repro_mode: bool,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PAIR_CLEANUP_INTERVAL);
        loop {
            ticker.tick().await;
            let expired = cache.sweep_expired(PAIR_EXPIRATION);
            if expired.is_empty() {
                continue;
            }
            debug!(count = expired.len(), "flushing expired single-sided partials");
            let policy = policy_store.current();
            for partial in expired {
                let witness = Witness::single_sided(partial);
                let gated = apply_policy_gate(witness, repro_mode, &policy);
                metrics::counter!("witnesses_emitted_total", 1);
                if sink.send(RawReport::Witness(gated)).is_err() {
                    warn!("pairing collector's report sink closed during sweep; dropping witness");
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use insights_agent_value::Value;
    use insights_agent_witness::{FiveTuple, MethodTree};
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::sync::mpsc::unbounded_channel;

    fn tuple() -> FiveTuple {
        FiveTuple {
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            src_port: 5555,
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            dst_port: 443,
            interface: "eth0".to_string(),
        }
    }

    fn request_event(stream: &str, seq: u64) -> HttpRequestEvent {
        let now = Utc::now();
        HttpRequestEvent {
            stream_id: stream.to_string(),
            sequence_number: seq,
            tuple: tuple(),
            method: "POST".to_string(),
            host: "example.com".to_string(),
            path_template: "/v1/doggos".to_string(),
            tree: MethodTree {
                body: Some(Value::from("body")),
                ..MethodTree::empty()
            },
            observed_at: now,
            final_packet_at: now + chrono::Duration::milliseconds(2),
        }
    }

    fn response_event(stream: &str, seq: u64, status: u16) -> HttpResponseEvent {
        let now = Utc::now();
        HttpResponseEvent {
            stream_id: stream.to_string(),
            sequence_number: seq,
            tuple: tuple(),
            status_code: status,
            tree: MethodTree::empty(),
            observed_at: now + chrono::Duration::milliseconds(10),
            final_packet_at: now + chrono::Duration::milliseconds(13),
        }
    }

    #[tokio::test]
    async fn pair_arriving_in_order_emits_one_witness() {
        let (tx, mut rx) = unbounded_channel();
        let policy_store = Arc::new(PolicyStore::new(
            insights_agent_redact::RedactionPolicy::load_embedded().unwrap(),
        ));
        let collector = PairingCollector::new(tx, policy_store, false);

        collector.process_request(request_event("stream-7", 1203));
        collector.process_response(response_event("stream-7", 1203, 200));

        let RawReport::Witness(witness) = rx.recv().await.unwrap() else {
            panic!("expected a witness report");
        };
        assert_eq!(witness.meta.method, "POST");
        assert_eq!(witness.meta.processing_latency_ms, Some(8.0));
        collector.close();
    }
}
