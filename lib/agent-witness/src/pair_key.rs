use std::fmt;

/// Identity used to match a request partial with its response partial:
/// `stream-id || sequence-number` (spec.md §4.4). Request and response
/// share the same key by construction of the upstream packet/TLS-event
/// parser (a capability interface, §6) — this crate never derives one
/// itself, only carries it.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PairKey(String);

impl PairKey {
    pub fn new(stream_id: impl AsRef<str>, sequence_number: u64) -> Self {
        Self(format!("{}:{}", stream_id.as_ref(), sequence_number))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_and_response_share_a_key_given_the_same_stream_and_sequence() {
        let request_side = PairKey::new("stream-7", 1203);
        let response_side = PairKey::new("stream-7", 1203);
        assert_eq!(request_side, response_side);
    }

    #[test]
    fn distinct_sequence_numbers_do_not_collide() {
        assert_ne!(PairKey::new("stream-7", 1), PairKey::new("stream-7", 2));
    }
}
