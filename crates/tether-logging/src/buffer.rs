//! Bounded in-memory log buffer backed by a `tracing` layer.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A captured log record.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    /// RFC 3339 capture time.
    pub timestamp: String,
    /// Level name (`INFO`, `WARN`, ...).
    pub level: String,
    /// Module path the event came from.
    pub target: String,
    /// Event message.
    pub message: String,
    /// Remaining structured fields as a JSON object string.
    pub fields: Option<String>,
}

/// Query parameters for searching captured records.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    /// Exact level name match.
    pub level: Option<String>,
    /// Substring match on the target.
    pub target: Option<String>,
    /// Maximum records returned (default 100).
    pub limit: Option<usize>,
}

/// Ring buffer of recent log records.
pub struct MemoryLogSink {
    records: Mutex<VecDeque<LogRecord>>,
    capacity: usize,
}

impl MemoryLogSink {
    /// Create a sink holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    fn insert(&self, record: LogRecord) {
        let mut records = self.records.lock();
        if records.len() == self.capacity {
            let _ = records.pop_front();
        }
        records.push_back(record);
    }

    /// Search captured records, most recent first.
    pub fn query(&self, q: &LogQuery) -> Vec<LogRecord> {
        let records = self.records.lock();
        let limit = q.limit.unwrap_or(100);
        records
            .iter()
            .rev()
            .filter(|r| q.level.as_ref().is_none_or(|l| &r.level == l))
            .filter(|r| q.target.as_ref().is_none_or(|t| r.target.contains(t)))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

/// tracing layer that captures INFO-and-above events into a sink.
pub struct BufferLayer {
    sink: Arc<MemoryLogSink>,
}

impl BufferLayer {
    /// Create a layer feeding the given sink.
    pub fn new(sink: Arc<MemoryLogSink>) -> Self {
        Self { sink }
    }
}

/// Visitor that extracts fields from a tracing event.
struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
}

impl FieldVisitor {
    fn new() -> Self {
        Self {
            message: None,
            fields: serde_json::Map::new(),
        }
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let val = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(val);
        } else {
            let _ = self
                .fields
                .insert(field.name().to_string(), serde_json::Value::String(val));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            let _ = self.fields.insert(
                field.name().to_string(),
                serde_json::Value::String(value.to_string()),
            );
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        let _ = self
            .fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        let _ = self
            .fields
            .insert(field.name().to_string(), serde_json::Value::Number(value.into()));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            let _ = self
                .fields
                .insert(field.name().to_string(), serde_json::Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        let _ = self
            .fields
            .insert(field.name().to_string(), serde_json::Value::Bool(value));
    }
}

impl<S: tracing::Subscriber> Layer<S> for BufferLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        // Skip debug/trace chatter; the buffer is for the dashboard panel
        let level = *event.metadata().level();
        if level > tracing::Level::INFO {
            return;
        }

        let mut visitor = FieldVisitor::new();
        event.record(&mut visitor);

        let fields = if visitor.fields.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&visitor.fields).unwrap_or_default())
        };

        self.sink.insert(LogRecord {
            timestamp: Utc::now().to_rfc3339(),
            level: level.to_string(),
            target: event.metadata().target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields,
        });
    }
}
