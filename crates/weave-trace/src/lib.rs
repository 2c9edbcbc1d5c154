pub mod convert;
pub mod span;
pub mod store;
pub mod tracer;

pub use convert::{trace_to_view, SpanEventView, SpanView, TraceView};
pub use span::{Span, SpanEvent, SpanStatus, SpanStatusCode, StoredTrace};
pub use store::{spawn_eviction_worker, EvictionWorker, TraceStore};
pub use tracer::{SpanHandle, Tracer};
