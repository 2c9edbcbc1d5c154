pub mod error;
pub mod events;
pub mod state;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::memory::SharedMemoryStore;
pub use error::AgentError;
use events::ProgressEvent;
use types::Session;

/// Provider/model usage attached to a completed turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageReport {
    pub provider: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
}

/// Outcome of a single conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentReply {
    pub content: String,
    pub usage: UsageReport,
}

/// Progress emitter handed to a streaming worker. `emit` blocks until the
/// consumer accepts the event or the caller's cancellation fires, in which
/// case the event is abandoned.
#[derive(Clone)]
pub struct ProgressSink {
    tx: mpsc::Sender<ProgressEvent>,
    cancel: CancellationToken,
}

impl ProgressSink {
    pub fn new(tx: mpsc::Sender<ProgressEvent>, cancel: CancellationToken) -> Self {
        Self { tx, cancel }
    }

    pub async fn emit(&self, event: ProgressEvent) {
        tokio::select! {
            _ = self.tx.send(event) => {}
            _ = self.cancel.cancelled() => {}
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

/// A configured LLM persona hosted by the server. Owned exclusively by the
/// registry; external references are shared but short-lived.
#[async_trait]
pub trait Agent: Send + Sync {
    async fn chat(&self, session_id: &str, query: &str) -> Result<AgentReply, AgentError>;

    async fn chat_with_progress(
        &self,
        session_id: &str,
        query: &str,
        progress: ProgressSink,
    ) -> Result<AgentReply, AgentError>;

    fn name(&self) -> String;

    fn description(&self) -> String;

    fn provider_name(&self) -> String;

    fn model(&self) -> String;

    fn tool_names(&self) -> Vec<String>;

    async fn session_ids(&self) -> Vec<String>;

    async fn owns_session(&self, session_id: &str) -> bool;

    async fn session_count(&self) -> usize;

    async fn session(&self, session_id: &str) -> Option<Session>;

    /// Inject the process-wide shared memory store. Default is a no-op for
    /// agents without memory support.
    fn attach_memory(&self, _memory: Arc<SharedMemoryStore>) {}
}
