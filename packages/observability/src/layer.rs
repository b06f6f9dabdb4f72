//! Sanitizing layer: one line per event, as JSON for the log file or as
//! compact text for stderr.
//!
//! JSON lines carry `ts`, `level`, `service`, `pid`, `target`, `message`,
//! and when present `fields`, `spans` (root first) and `file`/`line`.
//! Message and fields go through [`crate::sanitize`] before either format
//! is rendered.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Write as _};
use std::io::Write;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::sanitize::{sanitize_fields, sanitize_message};

/// One line of the central log.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub ts: String,
    pub level: &'static str,
    pub service: String,
    pub pid: u32,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub spans: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

impl LogEntry {
    /// `ts LEVEL spans target: message key=value ...`, keys sorted.
    pub fn to_compact_line(&self) -> String {
        let mut line = format!("{} {:>5} ", self.ts, self.level);
        if !self.spans.is_empty() {
            let _ = write!(line, "{}: ", self.spans.join(":"));
        }
        let _ = write!(line, "{}: {}", self.target, self.message);
        let sorted: BTreeMap<_, _> = self.fields.iter().collect();
        for (key, value) in sorted {
            match value {
                Value::String(s) => {
                    let _ = write!(line, " {}={}", key, s);
                }
                other => {
                    let _ = write!(line, " {}={}", key, other);
                }
            }
        }
        line
    }
}

/// Rendering of each [`LogEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineFormat {
    Json,
    Compact,
}

#[derive(Default)]
struct EventFields {
    message: String,
    fields: HashMap<String, Value>,
}

impl EventFields {
    fn put(&mut self, field: &Field, value: Value) {
        if field.name() == "message" {
            self.message = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for EventFields {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, Value::String(format!("{:?}", value)));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, Value::String(value.to_string()));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, Value::Bool(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        let value = serde_json::Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(value.to_string()));
        self.put(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.put(field, Value::String(value.to_string()));
    }
}

/// Layer writing sanitized [`LogEntry`] lines to `make_writer`.
pub struct SanitizedLayer<W> {
    service: String,
    pid: u32,
    format: LineFormat,
    make_writer: W,
}

impl<W> SanitizedLayer<W> {
    /// JSONL output, one object per line.
    pub fn json(service: String, make_writer: W) -> Self {
        Self::with_format(service, LineFormat::Json, make_writer)
    }

    /// Human-readable output for terminals.
    pub fn compact(service: String, make_writer: W) -> Self {
        Self::with_format(service, LineFormat::Compact, make_writer)
    }

    fn with_format(service: String, format: LineFormat, make_writer: W) -> Self {
        Self {
            service,
            pid: std::process::id(),
            format,
            make_writer,
        }
    }
}

impl<S, W> Layer<S> for SanitizedLayer<W>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    W: for<'writer> MakeWriter<'writer> + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let mut recorded = EventFields::default();
        event.record(&mut recorded);

        let spans = ctx
            .event_scope(event)
            .map(|scope| scope.from_root().map(|span| span.name().to_string()).collect())
            .unwrap_or_default();

        let meta = event.metadata();
        let entry = LogEntry {
            ts: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            level: meta.level().as_str(),
            service: self.service.clone(),
            pid: self.pid,
            target: meta.target().to_string(),
            message: sanitize_message(&recorded.message),
            fields: sanitize_fields(&recorded.fields),
            spans,
            file: meta.file().map(String::from),
            line: meta.line(),
        };

        let line = match self.format {
            LineFormat::Json => match serde_json::to_string(&entry) {
                Ok(line) => line,
                Err(_) => return,
            },
            LineFormat::Compact => entry.to_compact_line(),
        };
        let _ = writeln!(self.make_writer.make_writer(), "{}", line);
    }
}
