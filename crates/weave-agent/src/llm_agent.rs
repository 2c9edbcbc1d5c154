use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;

use weave_core::agent::UsageReport;
use weave_core::{
    Agent, AgentConfig, AgentError, AgentReply, Message, ProgressEvent, ProgressSink,
    ProgressStage, Role, Session, SharedMemoryStore,
};
use weave_llm::LLMProvider;

/// Built-in provider-driven agent. Holds its sessions in memory and answers
/// each turn with a single completion over the session history.
pub struct LlmAgent {
    name: String,
    description: String,
    system_prompt: String,
    tools: Vec<String>,
    provider: Arc<dyn LLMProvider>,
    sessions: RwLock<HashMap<String, Session>>,
    memory: std::sync::RwLock<Option<Arc<SharedMemoryStore>>>,
}

impl LlmAgent {
    pub fn new(name: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: String::new(),
            tools: Vec::new(),
            provider,
            sessions: RwLock::new(HashMap::new()),
            memory: std::sync::RwLock::new(None),
        }
    }

    pub fn from_config(config: &AgentConfig, provider: Arc<dyn LLMProvider>) -> Self {
        let mut agent = Self::new(config.name.clone(), provider);
        agent.description = config.description.clone();
        agent.system_prompt = config.system_prompt.clone();
        if let Some(tools) = config.tools.as_ref() {
            agent.tools = tools.enabled.clone();
        }
        agent
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// One turn: append the user message, run the provider over the full
    /// history, append the reply, and accumulate cost.
    async fn run_turn(&self, session_id: &str, query: &str) -> Result<AgentReply, AgentError> {
        let messages = {
            let mut sessions = self.sessions.write().await;
            let session = sessions
                .entry(session_id.to_string())
                .or_insert_with(|| Session::new(session_id));
            upsert_system_prompt(session, &self.system_prompt);
            session.add_message(Message::user(query));
            session.messages.clone()
        };

        let response = self
            .provider
            .chat(&messages, &self.tools)
            .await
            .map_err(|e| AgentError::Llm(e.to_string()))?;

        {
            let mut sessions = self.sessions.write().await;
            if let Some(session) = sessions.get_mut(session_id) {
                session.add_message(Message::assistant(response.content.clone()));
                session.add_cost(response.usage.cost_usd);
            }
        }

        Ok(AgentReply {
            content: response.content,
            usage: UsageReport {
                provider: self.provider.name(),
                model: self.provider.model(),
                input_tokens: response.usage.input_tokens,
                output_tokens: response.usage.output_tokens,
                cost_usd: response.usage.cost_usd,
            },
        })
    }
}

fn upsert_system_prompt(session: &mut Session, prompt: &str) {
    if prompt.is_empty() {
        return;
    }
    if let Some(system) = session
        .messages
        .iter_mut()
        .find(|m| matches!(m.role, Role::System))
    {
        system.content = prompt.to_string();
    } else {
        session.messages.insert(0, Message::system(prompt));
    }
}

#[async_trait]
impl Agent for LlmAgent {
    async fn chat(&self, session_id: &str, query: &str) -> Result<AgentReply, AgentError> {
        log::debug!("[{}] agent '{}' chat turn", session_id, self.name);
        self.run_turn(session_id, query).await
    }

    async fn chat_with_progress(
        &self,
        session_id: &str,
        query: &str,
        progress: ProgressSink,
    ) -> Result<AgentReply, AgentError> {
        progress
            .emit(ProgressEvent::stage(
                ProgressStage::PatternSelection,
                10,
                "Selecting response pattern",
            ))
            .await;
        if progress.is_cancelled() {
            return Err(AgentError::Cancelled);
        }

        progress
            .emit(ProgressEvent::stage(
                ProgressStage::LlmGeneration,
                40,
                "Generating response",
            ))
            .await;

        let started = Instant::now();
        let cancel = progress.cancel_token();
        let reply = tokio::select! {
            result = self.run_turn(session_id, query) => result?,
            _ = cancel.cancelled() => return Err(AgentError::Cancelled),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        progress
            .emit(
                ProgressEvent::stage(ProgressStage::LlmGeneration, 90, "Response generated")
                    .with_partial_content(reply.content.clone(), reply.usage.output_tokens)
                    .with_ttft_ms(elapsed_ms),
            )
            .await;

        Ok(reply)
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn description(&self) -> String {
        self.description.clone()
    }

    fn provider_name(&self) -> String {
        self.provider.name()
    }

    fn model(&self) -> String {
        self.provider.model()
    }

    fn tool_names(&self) -> Vec<String> {
        self.tools.clone()
    }

    async fn session_ids(&self) -> Vec<String> {
        let sessions = self.sessions.read().await;
        sessions.keys().cloned().collect()
    }

    async fn owns_session(&self, session_id: &str) -> bool {
        let sessions = self.sessions.read().await;
        sessions.contains_key(session_id)
    }

    async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    async fn session(&self, session_id: &str) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    fn attach_memory(&self, memory: Arc<SharedMemoryStore>) {
        let mut slot = self.memory.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(memory);
    }
}
