use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{Duration, Utc};

use crate::span::{Span, StoredTrace};

/// In-process store of completed spans grouped by trace id. Carries its own
/// lock; safe to share across request handlers and the tracer sidecar.
#[derive(Debug, Default)]
pub struct TraceStore {
    traces: RwLock<HashMap<String, StoredTrace>>,
}

impl TraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a completed span, creating the trace on first sight. The
    /// trace's session id is lifted from the first span that carries one.
    pub fn add_span(&self, span: Span) {
        if span.trace_id.is_empty() {
            return;
        }
        let mut traces = self.traces.write().unwrap_or_else(|e| e.into_inner());
        let trace = traces
            .entry(span.trace_id.clone())
            .or_insert_with(|| StoredTrace {
                id: span.trace_id.clone(),
                session_id: span.session_id().unwrap_or_default(),
                created_at: Utc::now(),
                spans: Vec::new(),
            });
        if trace.session_id.is_empty() {
            if let Some(session_id) = span.session_id() {
                trace.session_id = session_id;
            }
        }
        trace.spans.push(span);
    }

    pub fn get_trace(&self, trace_id: &str) -> Option<StoredTrace> {
        let traces = self.traces.read().unwrap_or_else(|e| e.into_inner());
        traces.get(trace_id).cloned()
    }

    /// Delete traces older than `max_age`. Returns the eviction count.
    pub fn evict_expired(&self, max_age: Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut traces = self.traces.write().unwrap_or_else(|e| e.into_inner());
        let before = traces.len();
        traces.retain(|_, trace| trace.created_at >= cutoff);
        before - traces.len()
    }

    pub fn len(&self) -> usize {
        let traces = self.traces.read().unwrap_or_else(|e| e.into_inner());
        traces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle for the background eviction task.
pub struct EvictionWorker {
    running: Arc<AtomicBool>,
}

impl EvictionWorker {
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

/// Periodically evict expired traces until the worker is stopped.
pub fn spawn_eviction_worker(
    store: Arc<TraceStore>,
    max_age: Duration,
    every: std::time::Duration,
) -> EvictionWorker {
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            if !running_clone.load(Ordering::SeqCst) {
                break;
            }
            let evicted = store.evict_expired(max_age);
            if evicted > 0 {
                log::info!("Evicted {} expired traces", evicted);
            }
        }
    });

    EvictionWorker { running }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::{SpanStatus, SpanStatusCode};

    fn span(trace_id: &str, span_id: &str, parent: Option<&str>) -> Span {
        let now = Utc::now();
        let mut attributes = HashMap::new();
        attributes.insert(
            "session_id".to_string(),
            serde_json::Value::String("sess_0a1b2c3d".to_string()),
        );
        Span {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            parent_id: parent.map(str::to_string),
            name: format!("op-{}", span_id),
            start_time: now,
            end_time: now,
            duration_us: 1500,
            status: SpanStatus {
                code: SpanStatusCode::Ok,
                message: String::new(),
            },
            attributes,
            events: Vec::new(),
        }
    }

    #[test]
    fn add_span_groups_by_trace_in_insertion_order() {
        let store = TraceStore::new();
        store.add_span(span("t1", "root", None));
        store.add_span(span("t1", "child", Some("root")));
        store.add_span(span("t2", "other", None));

        let trace = store.get_trace("t1").expect("trace");
        assert_eq!(trace.session_id, "sess_0a1b2c3d");
        assert_eq!(trace.spans.len(), 2);
        assert_eq!(trace.spans[0].span_id, "root");
        assert_eq!(trace.spans[1].span_id, "child");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn empty_trace_id_is_ignored() {
        let store = TraceStore::new();
        store.add_span(span("", "x", None));
        assert!(store.is_empty());
    }

    #[test]
    fn evict_expired_removes_old_traces_only() {
        let store = TraceStore::new();
        store.add_span(span("old", "a", None));
        {
            let mut traces = store.traces.write().unwrap();
            traces.get_mut("old").expect("old").created_at = Utc::now() - Duration::hours(2);
        }
        store.add_span(span("fresh", "b", None));

        let evicted = store.evict_expired(Duration::hours(1));
        assert_eq!(evicted, 1);
        assert!(store.get_trace("old").is_none());
        assert!(store.get_trace("fresh").is_some());
    }
}
