//! # tether-logging
//!
//! Structured logging with `tracing`. Provides subscriber initialization
//! with env-filter support and a bounded in-memory buffer the dashboard
//! can query for a recent-transport-activity panel.

#![deny(unsafe_code)]

pub mod buffer;

use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub use buffer::{BufferLayer, LogQuery, LogRecord, MemoryLogSink};

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize stderr logging with `RUST_LOG`-style filtering.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// Initialize logging with an in-memory buffer of the given capacity in
/// addition to stderr output. Returns the sink for querying.
pub fn init_with_buffer(capacity: usize) -> Arc<MemoryLogSink> {
    let sink = Arc::new(MemoryLogSink::new(capacity));
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(tracing_subscriber::fmt::layer())
        .with(BufferLayer::new(sink.clone()))
        .try_init();
    sink
}
