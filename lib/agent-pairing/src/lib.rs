//! The Pairing Collector and Pairing Cache (spec.md §3, §4.4): matches
//! partial request/response witnesses by pair key, computes processing
//! latency across out-of-order arrival, and applies the redact/zero
//! obfuscation policy gate before handing a finished witness onward.

mod cache;
mod collector;
mod convert;
mod policy_gate;

pub use cache::{PairingCache, TakeOutcome};
pub use collector::PairingCollector;
pub use policy_gate::{apply_policy_gate, is_repro_eligible};
