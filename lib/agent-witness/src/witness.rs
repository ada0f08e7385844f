use chrono::{DateTime, Utc};

use crate::method_tree::{round_to_significant_digits, MethodMeta, MethodTree, ObfuscationFlag};
use crate::pair_key::PairKey;
use crate::tuple::FiveTuple;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Direction {
    Request,
    Response,
}

/// A typed request-or-response derived from a parsed HTTP exchange,
/// keyed by a pair key (spec.md §3). Held in the Pairing Cache while
/// unpaired.
#[derive(Clone, Debug)]
pub struct PartialWitness {
    pub pair_key: PairKey,
    pub tuple: FiveTuple,
    pub direction: Direction,
    pub method: Option<String>,
    pub host: Option<String>,
    pub path_template: Option<String>,
    pub status_code: Option<u16>,
    pub tree: MethodTree,
    /// When this partial was first observed.
    pub observed_at: DateTime<Utc>,
    /// When the final packet/frame of this partial arrived. For a
    /// request this is `requestEnd`; for a response it has no role in
    /// latency computation, only `observed_at` (`responseStart`) does.
    pub final_packet_at: DateTime<Utc>,
}

/// The merged request+response record (spec.md §3). Exactly one request
/// tree and at most one response tree.
#[derive(Clone, Debug)]
pub struct Witness {
    pub pair_key: PairKey,
    pub tuple: FiveTuple,
    pub request: MethodTree,
    pub response: Option<MethodTree>,
    pub meta: MethodMeta,
    pub status_code: Option<u16>,
    pub request_end: Option<DateTime<Utc>>,
    pub response_start: Option<DateTime<Utc>>,
}

impl Witness {
    /// Builds a single-sided witness from a partial that expired
    /// unpaired, or was flushed by `Close`/the expiration sweep
    /// (spec.md §4.4).
    pub fn single_sided(partial: PartialWitness) -> Witness {
        let meta = MethodMeta {
            method: partial.method.clone().unwrap_or_default(),
            host: partial.host.clone().unwrap_or_default(),
            path_template: partial.path_template.clone().unwrap_or_default(),
            processing_latency_ms: None,
            obfuscation: ObfuscationFlag::None,
        };
        match partial.direction {
            Direction::Request => Witness {
                pair_key: partial.pair_key,
                tuple: partial.tuple,
                request: partial.tree,
                response: None,
                meta,
                status_code: None,
                request_end: Some(partial.final_packet_at),
                response_start: None,
            },
            Direction::Response => Witness {
                pair_key: partial.pair_key,
                tuple: partial.tuple,
                request: MethodTree::empty(),
                response: Some(partial.tree),
                meta,
                status_code: partial.status_code,
                request_end: None,
                response_start: Some(partial.observed_at),
            },
        }
    }

    /// Merges `first` (the partial that was already cached) with
    /// `second` (the partial that just arrived and triggered the
    /// cache hit). Spec.md §4.4 `Process`: method/host/path come from
    /// whichever partial arrived first and are never overwritten;
    /// `requestEnd`/`responseStart` are recorded regardless of arrival
    /// order; the 5-tuple is re-oriented to client -> server if the
    /// request arrived second.
    pub fn merge(first: PartialWitness, second: PartialWitness) -> Witness {
        debug_assert_eq!(first.pair_key, second.pair_key);
        debug_assert_ne!(first.direction, second.direction);

        let (request, response) = match first.direction {
            Direction::Request => (first.clone(), second.clone()),
            Direction::Response => (second.clone(), first.clone()),
        };

        let tuple = if first.direction == Direction::Response {
            // The request arrived second; the cached tuple (captured on
            // the response) is server -> client and must be inverted.
            first.tuple.inverted()
        } else {
            first.tuple.clone()
        };

        let processing_latency_ms = {
            let request_end = Some(request.final_packet_at);
            let response_start = Some(response.observed_at);
            match (request_end, response_start) {
                (Some(end), Some(start)) => {
                    let micros = (start - end).num_microseconds().unwrap_or(0) as f64;
                    Some(round_to_significant_digits(micros / 1000.0, 4))
                }
                _ => None,
            }
        };

        let meta = MethodMeta {
            method: first.method.clone().unwrap_or_else(|| {
                second.method.clone().unwrap_or_default()
            }),
            host: first.host.clone().unwrap_or_else(|| {
                second.host.clone().unwrap_or_default()
            }),
            path_template: first.path_template.clone().unwrap_or_else(|| {
                second.path_template.clone().unwrap_or_default()
            }),
            processing_latency_ms,
            obfuscation: ObfuscationFlag::None,
        };

        Witness {
            pair_key: request.pair_key.clone(),
            tuple,
            request: request.tree,
            response: Some(response.tree.clone()),
            meta,
            status_code: response.status_code,
            request_end: Some(request.final_packet_at),
            response_start: Some(response.observed_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insights_agent_value::Value;
    use std::net::{IpAddr, Ipv4Addr};

    fn tuple() -> FiveTuple {
        FiveTuple {
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            src_port: 5555,
            dst_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            dst_port: 443,
            interface: "eth0".to_string(),
        }
    }

    fn request_partial(t0: DateTime<Utc>) -> PartialWitness {
        PartialWitness {
            pair_key: PairKey::new("stream-s", 1203),
            tuple: tuple(),
            direction: Direction::Request,
            method: Some("POST".to_string()),
            host: Some("example.com".to_string()),
            path_template: Some("/v1/doggos".to_string()),
            status_code: None,
            tree: MethodTree::empty(),
            observed_at: t0,
            final_packet_at: t0 + chrono::Duration::milliseconds(2),
        }
    }

    fn response_partial(t0: DateTime<Utc>, observed_offset_ms: i64) -> PartialWitness {
        PartialWitness {
            pair_key: PairKey::new("stream-s", 1203),
            tuple: tuple().inverted(),
            direction: Direction::Response,
            method: None,
            host: None,
            path_template: None,
            status_code: Some(200),
            tree: MethodTree {
                body: Some(Value::Array(vec![])),
                ..MethodTree::empty()
            },
            observed_at: t0 + chrono::Duration::milliseconds(observed_offset_ms),
            final_packet_at: t0 + chrono::Duration::milliseconds(observed_offset_ms + 3),
        }
    }

    #[test]
    fn pair_in_order_computes_positive_latency() {
        let t0 = Utc::now();
        let request = request_partial(t0);
        let response = response_partial(t0, 10);

        let witness = Witness::merge(request, response);
        assert_eq!(witness.meta.method, "POST");
        assert_eq!(witness.meta.host, "example.com");
        assert_eq!(witness.meta.path_template, "/v1/doggos");
        assert_eq!(witness.meta.processing_latency_ms, Some(8.0));
    }

    #[test]
    fn pair_out_of_order_produces_identical_merge() {
        let t0 = Utc::now();
        let request = request_partial(t0);
        let response = response_partial(t0, 10);

        // response cached first, request arrives second
        let witness = Witness::merge(response, request);
        assert_eq!(witness.meta.method, "POST");
        assert_eq!(witness.meta.processing_latency_ms, Some(8.0));
        // tuple re-oriented to client -> server
        assert_eq!(witness.tuple, tuple());
    }

    #[test]
    fn negative_latency_is_recorded_verbatim() {
        let t0 = Utc::now();
        let request = request_partial(t0);
        // response observed 1ms after t0, but request final packet was at t0+2ms
        let response = response_partial(t0, 1);

        let witness = Witness::merge(request, response);
        assert_eq!(witness.meta.processing_latency_ms, Some(-1.0));
    }
}
