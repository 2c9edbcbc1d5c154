use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use weave_core::{
    Agent, AgentState, PatternLibrary, ServiceError, SharedMemoryStore, StorageBackend,
};
use weave_judge::JudgeServer;
use weave_llm::LLMProvider;
use weave_mcp::McpManager;
use weave_trace::{TraceStore, Tracer};

use crate::collaborators::{AgentRegistry, AppProvider};
use crate::hitl::{PendingClarification, PendingPermission};
use crate::hotreload::PatternHotReloader;

/// Immutable server-wide settings fixed at construction.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Empty disables the admin check.
    pub admin_token: String,
    pub default_user_id: String,
    pub require_user_id: bool,
    /// Capacity of the per-stream progress channel.
    pub progress_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            admin_token: String::new(),
            default_user_id: weave_core::DEFAULT_USER_ID.to_string(),
            require_user_id: false,
            progress_capacity: 10,
        }
    }
}

/// Fields guarded by the single server-level lock. Snapshot what you need
/// and release before any I/O or collaborator call.
#[derive(Default)]
pub struct ServerCore {
    pub agents: HashMap<String, Arc<dyn Agent>>,
    pub agent_states: HashMap<String, AgentState>,
    pub default_agent_id: Option<String>,
    pub registry: Option<Arc<dyn AgentRegistry>>,
    pub mcp_manager: Option<Arc<McpManager>>,
    pub app_provider: Option<Arc<dyn AppProvider>>,
    pub storage_backend: Option<Arc<dyn StorageBackend>>,
    pub storage_backend_type: String,
    pub tracer: Option<Arc<Tracer>>,
    pub trace_store: Option<Arc<TraceStore>>,
    pub pattern_libs: HashMap<String, Arc<std::sync::RwLock<PatternLibrary>>>,
    pub hot_reloaders: HashMap<String, PatternHotReloader>,
    pub shared_memory: Option<Arc<SharedMemoryStore>>,
}

pub struct ServerState {
    pub(crate) core: RwLock<ServerCore>,
    pub(crate) pending_permissions: std::sync::Mutex<HashMap<String, PendingPermission>>,
    pub(crate) pending_clarifications: std::sync::Mutex<HashMap<String, PendingClarification>>,
    judges: JudgeServer,
    config: ServerConfig,
    default_provider: Arc<dyn LLMProvider>,
}

impl ServerState {
    pub fn new(default_provider: Arc<dyn LLMProvider>, config: ServerConfig) -> Self {
        let mut core = ServerCore::default();
        // the store exists from the start so GetTrace never races SetTracer
        core.trace_store = Some(Arc::new(TraceStore::new()));
        Self {
            core: RwLock::new(core),
            pending_permissions: std::sync::Mutex::new(HashMap::new()),
            pending_clarifications: std::sync::Mutex::new(HashMap::new()),
            judges: JudgeServer::new(),
            config,
            default_provider,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn judges(&self) -> &JudgeServer {
        &self.judges
    }

    pub fn default_provider(&self) -> Arc<dyn LLMProvider> {
        Arc::clone(&self.default_provider)
    }

    pub async fn set_registry(&self, registry: Arc<dyn AgentRegistry>) {
        let mut core = self.core.write().await;
        core.registry = Some(registry);
    }

    pub async fn set_mcp_manager(&self, manager: Arc<McpManager>) {
        let mut core = self.core.write().await;
        core.mcp_manager = Some(manager);
    }

    pub async fn set_app_provider(&self, provider: Arc<dyn AppProvider>) {
        let mut core = self.core.write().await;
        core.app_provider = Some(provider);
    }

    pub async fn set_storage_backend(&self, backend: Arc<dyn StorageBackend>) {
        let mut core = self.core.write().await;
        core.storage_backend_type = backend.backend_type().to_string();
        core.storage_backend = Some(backend);
    }

    /// Wire the tracer. Defensively instantiates the trace store when a
    /// caller replaced the state without one.
    pub async fn set_tracer(&self, tracer: Arc<Tracer>) {
        let mut core = self.core.write().await;
        if core.trace_store.is_none() {
            core.trace_store = Some(tracer.store());
        }
        core.tracer = Some(tracer);
    }

    pub async fn set_shared_memory(&self, memory: Arc<SharedMemoryStore>) {
        let agents: Vec<Arc<dyn Agent>> = {
            let mut core = self.core.write().await;
            core.shared_memory = Some(Arc::clone(&memory));
            core.agents.values().cloned().collect()
        };
        for agent in agents {
            agent.attach_memory(Arc::clone(&memory));
        }
    }

    pub async fn set_default_agent(&self, agent_id: impl Into<String>) -> Result<(), ServiceError> {
        let agent_id = agent_id.into();
        let mut core = self.core.write().await;
        if !core.agents.contains_key(&agent_id) {
            return Err(ServiceError::not_found(format!(
                "agent not found: {}",
                agent_id
            )));
        }
        core.default_agent_id = Some(agent_id);
        Ok(())
    }

    pub async fn default_agent_id(&self) -> Option<String> {
        let core = self.core.read().await;
        core.default_agent_id.clone()
    }

    pub async fn mcp_manager(&self) -> Option<Arc<McpManager>> {
        let core = self.core.read().await;
        core.mcp_manager.clone()
    }

    pub async fn app_provider(&self) -> Option<Arc<dyn AppProvider>> {
        let core = self.core.read().await;
        core.app_provider.clone()
    }

    pub async fn storage_backend(&self) -> Option<Arc<dyn StorageBackend>> {
        let core = self.core.read().await;
        core.storage_backend.clone()
    }

    pub async fn trace_store(&self) -> Option<Arc<TraceStore>> {
        let core = self.core.read().await;
        core.trace_store.clone()
    }

    pub async fn agent(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        let core = self.core.read().await;
        core.agents.get(agent_id).cloned()
    }

    /// Scan every agent's session view. Linear over a small agent count.
    pub async fn find_agent_by_session(
        &self,
        session_id: &str,
    ) -> Option<(String, Arc<dyn Agent>)> {
        let core = self.core.read().await;
        for (agent_id, agent) in &core.agents {
            if agent.owns_session(session_id).await {
                return Some((agent_id.clone(), agent.clone()));
            }
        }
        None
    }

    /// Resolution precedence: explicit id, then the session's owner, then
    /// the default agent. A session owned by a non-default agent must never
    /// fall through to the default.
    pub async fn resolve_agent(
        &self,
        explicit: Option<&str>,
        session_id: &str,
    ) -> Result<(String, Arc<dyn Agent>), ServiceError> {
        if let Some(agent_id) = explicit.filter(|id| !id.is_empty()) {
            let core = self.core.read().await;
            let agent = core.agents.get(agent_id).cloned().ok_or_else(|| {
                ServiceError::not_found(format!("agent not found: {}", agent_id))
            })?;
            return Ok((agent_id.to_string(), agent));
        }

        if !session_id.is_empty() {
            if let Some(found) = self.find_agent_by_session(session_id).await {
                return Ok(found);
            }
        }

        let core = self.core.read().await;
        let agent_id = core
            .default_agent_id
            .clone()
            .ok_or_else(|| ServiceError::failed_precondition("no default agent configured"))?;
        let agent = core
            .agents
            .get(&agent_id)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(format!("agent not found: {}", agent_id)))?;
        Ok((agent_id, agent))
    }

    /// Pre-exit cleanup: stop every pattern hot-reloader, then shut down
    /// the MCP servers. Called once when the process receives ctrl-c.
    pub async fn shutdown(&self) {
        let (mcp_manager, reloaders) = {
            let mut core = self.core.write().await;
            (
                core.mcp_manager.clone(),
                std::mem::take(&mut core.hot_reloaders),
            )
        };

        for (agent_id, reloader) in reloaders {
            log::debug!("[{}] stopping pattern hot-reloader", agent_id);
            reloader.stop();
        }

        if let Some(manager) = mcp_manager {
            log::info!("Shutting down MCP servers...");
            manager.shutdown_all().await;
            log::info!("MCP servers shut down complete");
        }
    }

    /// Trace lookup with the full precondition chain.
    pub async fn get_trace_view(
        &self,
        trace_id: &str,
    ) -> Result<weave_trace::TraceView, ServiceError> {
        if trace_id.is_empty() {
            return Err(ServiceError::invalid_argument("trace id must not be empty"));
        }
        let (tracer, store) = {
            let core = self.core.read().await;
            (core.tracer.clone(), core.trace_store.clone())
        };
        if tracer.is_none() {
            return Err(ServiceError::failed_precondition("tracer not configured"));
        }
        let store =
            store.ok_or_else(|| ServiceError::failed_precondition("trace store not configured"))?;
        let trace = store
            .get_trace(trace_id)
            .ok_or_else(|| ServiceError::not_found(format!("trace not found: {}", trace_id)))?;
        Ok(weave_trace::trace_to_view(&trace))
    }
}
