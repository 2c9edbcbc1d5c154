use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::span::{Span, SpanEvent, StoredTrace};

/// Wire shape of one span: microsecond timestamps, lowercase status,
/// stringified attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanView {
    pub span_id: String,
    #[serde(default)]
    pub parent_id: String,
    pub name: String,
    pub start_time_us: i64,
    pub end_time_us: i64,
    pub duration_us: i64,
    pub status: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status_message: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub events: Vec<SpanEventView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpanEventView {
    pub name: String,
    pub timestamp_us: i64,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceView {
    pub trace_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_span: Option<SpanView>,
    pub spans: Vec<SpanView>,
    pub total_duration_ms: i64,
}

/// Human representation of an attribute value: strings verbatim, everything
/// else as its JSON text.
fn value_to_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn attributes_to_strings(attrs: &HashMap<String, serde_json::Value>) -> HashMap<String, String> {
    attrs
        .iter()
        .map(|(k, v)| (k.clone(), value_to_string(v)))
        .collect()
}

fn event_to_view(event: &SpanEvent) -> SpanEventView {
    SpanEventView {
        name: event.name.clone(),
        timestamp_us: event.timestamp.timestamp_micros(),
        attributes: attributes_to_strings(&event.attributes),
    }
}

fn span_to_view(span: &Span) -> SpanView {
    SpanView {
        span_id: span.span_id.clone(),
        parent_id: span.parent_id.clone().unwrap_or_default(),
        name: span.name.clone(),
        start_time_us: span.start_time.timestamp_micros(),
        end_time_us: span.end_time.timestamp_micros(),
        duration_us: span.duration_us,
        status: span.status.code.to_string(),
        status_message: span.status.message.clone(),
        attributes: attributes_to_strings(&span.attributes),
        events: span.events.iter().map(event_to_view).collect(),
    }
}

/// Build the response shape: spans in insertion order, the first parentless
/// span as root, and the total duration summed per-span in milliseconds.
pub fn trace_to_view(trace: &StoredTrace) -> TraceView {
    let spans: Vec<SpanView> = trace.spans.iter().map(span_to_view).collect();
    let root_span = trace.spans.iter().find(|s| s.is_root()).map(span_to_view);
    let total_duration_ms = trace.spans.iter().map(|s| s.duration_us / 1000).sum();

    TraceView {
        trace_id: trace.id.clone(),
        session_id: trace.session_id.clone(),
        root_span,
        spans,
        total_duration_ms,
    }
}
