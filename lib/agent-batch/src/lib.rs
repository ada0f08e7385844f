//! The Upload Batch and Upload Batcher (spec.md §3, §4.6): accumulates
//! Raw Reports up to a size/time bound, enforces a per-witness size
//! policy with an obfuscate-then-drop fallback, and flushes to the
//! ingestion client on a ticker or size threshold with 429/transport
//! error classification.

mod batch;
mod batcher;

pub use batch::UploadBatch;
pub use batcher::{BatcherConfig, UploadBatcher};
