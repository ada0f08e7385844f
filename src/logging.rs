//! Tracing/metrics initialization (SPEC_FULL.md §1 ambient stack): an
//! `EnvFilter`-driven `tracing-subscriber` format layer, installed once
//! at the top of `main`. Defaults to `info` when `RUST_LOG` is unset or
//! invalid.

use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global tracing subscriber. Call once, at process start;
/// a second call panics, which is `tracing`'s own behavior and not
/// worth swallowing here.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).with_target(true).init();
}
