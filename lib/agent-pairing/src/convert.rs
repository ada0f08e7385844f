use insights_agent_capability::packet_source::{HttpRequestEvent, HttpResponseEvent};
use insights_agent_witness::{Direction, PairKey, PartialWitness};

/// Builds the partial witness the Pairing Cache stores for an
/// `HTTPRequest` item (spec.md §4.3 step 1, §4.4 `Process`).
pub fn request_to_partial(event: HttpRequestEvent) -> PartialWitness {
    PartialWitness {
        pair_key: PairKey::new(&event.stream_id, event.sequence_number),
        tuple: event.tuple,
        direction: Direction::Request,
        method: Some(event.method),
        host: Some(event.host),
        path_template: Some(event.path_template),
        status_code: None,
        tree: event.tree,
        observed_at: event.observed_at,
        final_packet_at: event.final_packet_at,
    }
}

pub fn response_to_partial(event: HttpResponseEvent) -> PartialWitness {
    PartialWitness {
        pair_key: PairKey::new(&event.stream_id, event.sequence_number),
        tuple: event.tuple,
        direction: Direction::Response,
        method: None,
        host: None,
        path_template: None,
        status_code: Some(event.status_code),
        tree: event.tree,
        observed_at: event.observed_at,
        final_packet_at: event.final_packet_at,
    }
}
