use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::span::{Span, SpanEvent, SpanStatus, SpanStatusCode};
use crate::store::TraceStore;

/// Produces spans and pushes each completed one into the trace store.
pub struct Tracer {
    store: Arc<TraceStore>,
}

impl Tracer {
    pub fn new(store: Arc<TraceStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> Arc<TraceStore> {
        Arc::clone(&self.store)
    }

    /// Open a root span under a fresh trace id.
    pub fn start_trace(&self, name: impl Into<String>) -> SpanHandle {
        self.start_span(Uuid::new_v4().simple().to_string(), name)
    }

    pub fn start_span(&self, trace_id: impl Into<String>, name: impl Into<String>) -> SpanHandle {
        let now = Utc::now();
        SpanHandle {
            span: Span {
                trace_id: trace_id.into(),
                span_id: Uuid::new_v4().simple().to_string(),
                parent_id: None,
                name: name.into(),
                start_time: now,
                end_time: now,
                duration_us: 0,
                status: SpanStatus::default(),
                attributes: HashMap::new(),
                events: Vec::new(),
            },
            store: Arc::clone(&self.store),
        }
    }
}

/// An open span. Dropping it without `end` discards the span.
pub struct SpanHandle {
    span: Span,
    store: Arc<TraceStore>,
}

impl SpanHandle {
    pub fn trace_id(&self) -> &str {
        &self.span.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span.span_id
    }

    pub fn set_parent(&mut self, parent_id: impl Into<String>) {
        self.span.parent_id = Some(parent_id.into());
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.span.attributes.insert(name.into(), value);
    }

    pub fn set_status(&mut self, code: SpanStatusCode, message: impl Into<String>) {
        self.span.status = SpanStatus {
            code,
            message: message.into(),
        };
    }

    pub fn add_event(
        &mut self,
        name: impl Into<String>,
        attributes: HashMap<String, serde_json::Value>,
    ) {
        self.span.events.push(SpanEvent {
            name: name.into(),
            timestamp: Utc::now(),
            attributes,
        });
    }

    /// Close the span and push it into the store.
    pub fn end(mut self) {
        self.span.end_time = Utc::now();
        self.span.duration_us = (self.span.end_time - self.span.start_time)
            .num_microseconds()
            .unwrap_or(i64::MAX);
        self.store.add_span(self.span);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ended_spans_land_in_the_store() {
        let store = Arc::new(TraceStore::new());
        let tracer = Tracer::new(Arc::clone(&store));

        let mut root = tracer.start_trace("handle_request");
        let trace_id = root.trace_id().to_string();
        let root_id = root.span_id().to_string();
        root.set_attribute(
            "session_id",
            serde_json::Value::String("sess_0a1b2c3d".to_string()),
        );

        let mut child = tracer.start_span(trace_id.clone(), "llm_call");
        child.set_parent(root_id.clone());
        child.set_status(SpanStatusCode::Ok, "");
        child.end();
        root.end();

        let trace = store.get_trace(&trace_id).expect("trace");
        assert_eq!(trace.spans.len(), 2);
        assert_eq!(trace.spans[0].parent_id.as_deref(), Some(root_id.as_str()));
        assert!(trace.spans[1].is_root());
        assert_eq!(trace.session_id, "sess_0a1b2c3d");
    }
}
