use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use weave_agent::LlmAgent;
use weave_core::{
    Agent, AgentConfig, AgentInfo, AgentState, AgentStatus, ServiceError,
};

use crate::state::ServerState;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateAgentRequest {
    #[serde(default)]
    pub config: Option<AgentConfig>,
    #[serde(default)]
    pub config_path: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReloadAgentRequest {
    #[serde(default)]
    pub config: Option<AgentConfig>,
    #[serde(default)]
    pub reload_from_file: bool,
}

impl ServerState {
    /// Build an agent from an inline config or a config file, register it
    /// under a fresh id, and record it as running. Duplicate names are
    /// allowed; the id disambiguates.
    pub async fn create_agent_from_config(
        &self,
        req: CreateAgentRequest,
    ) -> Result<AgentInfo, ServiceError> {
        let has_inline = req.config.is_some();
        let has_path = req
            .config_path
            .as_deref()
            .map(|p| !p.is_empty())
            .unwrap_or(false);
        if has_inline == has_path {
            return Err(ServiceError::invalid_argument(
                "exactly one of config or config_path must be provided",
            ));
        }

        let mut config = match req.config {
            Some(config) => config,
            None => AgentConfig::from_file(req.config_path.unwrap_or_default())?,
        };
        config.validate()?;
        config.ensure_defaults();

        let (registry, shared_memory) = {
            let core = self.core.read().await;
            (core.registry.clone(), core.shared_memory.clone())
        };

        let agent: Arc<dyn Agent> = match registry.as_ref() {
            Some(registry) => registry.create_agent(&config).await.map_err(|e| {
                ServiceError::internal(format!("agent build failed: {}", e.message))
            })?,
            None => Arc::new(LlmAgent::from_config(&config, self.default_provider())),
        };
        if let Some(registry) = registry.as_ref() {
            if let Err(e) = registry.register_config(&config).await {
                log::warn!("register config for '{}' failed: {}", config.name, e);
            }
        }
        if let Some(memory) = shared_memory {
            agent.attach_memory(memory);
        }

        let agent_id = Uuid::new_v4().to_string();
        let mut state = AgentState::new(&agent_id, &config.name, AgentStatus::Running);
        state.config = Some(config.clone());

        {
            let mut core = self.core.write().await;
            core.agents.insert(agent_id.clone(), agent);
            core.agent_states.insert(agent_id.clone(), state);
            if core.default_agent_id.is_none() {
                core.default_agent_id = Some(agent_id.clone());
            }
        }

        log::info!("Created agent '{}' ({})", config.name, agent_id);
        self.agent_info(&agent_id).await
    }

    /// Register an already-built agent. Rejects a second insertion of the
    /// same id.
    pub async fn add_agent(
        &self,
        agent_id: impl Into<String>,
        agent: Arc<dyn Agent>,
    ) -> Result<(), ServiceError> {
        let agent_id = agent_id.into();
        let name = agent.name();
        let mut core = self.core.write().await;
        if core.agents.contains_key(&agent_id) {
            return Err(ServiceError::already_exists(format!(
                "agent already registered: {}",
                agent_id
            )));
        }
        core.agents.insert(agent_id.clone(), agent);
        core.agent_states.insert(
            agent_id.clone(),
            AgentState::new(&agent_id, name, AgentStatus::Running),
        );
        if core.default_agent_id.is_none() {
            core.default_agent_id = Some(agent_id);
        }
        Ok(())
    }

    pub async fn get_agent(&self, agent_id: &str) -> Result<AgentInfo, ServiceError> {
        if agent_id.is_empty() {
            return Err(ServiceError::invalid_argument("agent id must not be empty"));
        }
        self.agent_info(agent_id).await
    }

    pub async fn list_agents(&self) -> Vec<AgentInfo> {
        let agent_ids: Vec<String> = {
            let core = self.core.read().await;
            core.agent_states.keys().cloned().collect()
        };
        let mut infos = Vec::with_capacity(agent_ids.len());
        for agent_id in agent_ids {
            if let Ok(info) = self.agent_info(&agent_id).await {
                infos.push(info);
            }
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        infos
    }

    /// Idempotent stopped -> running transition. Synthesizes a state record
    /// for agents that were added outside create.
    pub async fn start_agent(&self, agent_id: &str) -> Result<AgentInfo, ServiceError> {
        self.transition_agent(agent_id, AgentStatus::Running).await
    }

    /// Idempotent running -> stopped transition.
    pub async fn stop_agent(&self, agent_id: &str) -> Result<AgentInfo, ServiceError> {
        self.transition_agent(agent_id, AgentStatus::Stopped).await
    }

    async fn transition_agent(
        &self,
        agent_id: &str,
        status: AgentStatus,
    ) -> Result<AgentInfo, ServiceError> {
        if agent_id.is_empty() {
            return Err(ServiceError::invalid_argument("agent id must not be empty"));
        }

        let (registry, name) = {
            let mut core = self.core.write().await;
            if !core.agents.contains_key(agent_id) && !core.agent_states.contains_key(agent_id) {
                return Err(ServiceError::not_found(format!(
                    "agent not found: {}",
                    agent_id
                )));
            }
            let name = core
                .agents
                .get(agent_id)
                .map(|agent| agent.name())
                .or_else(|| core.agent_states.get(agent_id).map(|s| s.name.clone()))
                .unwrap_or_default();
            match core.agent_states.get_mut(agent_id) {
                Some(state) => state.set_status(status),
                None => {
                    let mut state = AgentState::new(agent_id, &name, status);
                    state.set_status(status);
                    core.agent_states.insert(agent_id.to_string(), state);
                }
            }
            (core.registry.clone(), name)
        };

        if let Some(registry) = registry {
            let result = match status {
                AgentStatus::Running => registry.start_agent(&name).await,
                AgentStatus::Stopped => registry.stop_agent(&name).await,
                _ => Ok(()),
            };
            if let Err(e) = result {
                log::warn!("registry {} for '{}' failed: {}", status, name, e);
            }
        }

        self.agent_info(agent_id).await
    }

    /// Remove the agent, its state record, its pattern library, and its
    /// hot-reloader. A running agent needs `force`.
    pub async fn delete_agent(&self, agent_id: &str, force: bool) -> Result<(), ServiceError> {
        if agent_id.is_empty() {
            return Err(ServiceError::invalid_argument("agent id must not be empty"));
        }

        let (registry, name, was_running, reloader) = {
            let mut core = self.core.write().await;
            if !core.agents.contains_key(agent_id) && !core.agent_states.contains_key(agent_id) {
                return Err(ServiceError::not_found(format!(
                    "agent not found: {}",
                    agent_id
                )));
            }
            let was_running = core
                .agent_states
                .get(agent_id)
                .map(|s| s.status == AgentStatus::Running)
                .unwrap_or(false);
            if was_running && !force {
                return Err(ServiceError::failed_precondition(format!(
                    "agent {} is running; stop it or pass force",
                    agent_id
                )));
            }

            let name = core
                .agents
                .get(agent_id)
                .map(|agent| agent.name())
                .or_else(|| core.agent_states.get(agent_id).map(|s| s.name.clone()))
                .unwrap_or_default();
            core.agents.remove(agent_id);
            core.agent_states.remove(agent_id);
            core.pattern_libs.remove(agent_id);
            if core.default_agent_id.as_deref() == Some(agent_id) {
                core.default_agent_id = None;
            }
            let reloader = core.hot_reloaders.remove(agent_id);
            (core.registry.clone(), name, was_running, reloader)
        };

        if let Some(reloader) = reloader {
            reloader.stop();
        }

        if let Some(registry) = registry {
            if was_running {
                if let Err(e) = registry.stop_agent(&name).await {
                    log::warn!("registry stop for '{}' failed: {}", name, e);
                }
            }
            if let Err(e) = registry.delete_agent(&name).await {
                log::warn!("registry delete for '{}' failed: {}", name, e);
            }
        }

        log::info!("Deleted agent '{}' ({})", name, agent_id);
        Ok(())
    }

    /// Rebuild the agent from a new config or from its registered file,
    /// then swap the entry atomically. The previous runtime entry is
    /// removed from the external registry first so the recreate cannot
    /// collide with a live instance.
    pub async fn reload_agent(
        &self,
        agent_id: &str,
        req: ReloadAgentRequest,
    ) -> Result<AgentInfo, ServiceError> {
        if agent_id.is_empty() {
            return Err(ServiceError::invalid_argument("agent id must not be empty"));
        }
        if req.config.is_some() == req.reload_from_file {
            return Err(ServiceError::invalid_argument(
                "exactly one of config or reload_from_file must be specified",
            ));
        }

        let (registry, shared_memory, name) = {
            let core = self.core.read().await;
            let name = core
                .agent_states
                .get(agent_id)
                .map(|s| s.name.clone())
                .ok_or_else(|| {
                    ServiceError::not_found(format!("agent not found: {}", agent_id))
                })?;
            (core.registry.clone(), core.shared_memory.clone(), name)
        };

        let built: Result<(Arc<dyn Agent>, Option<AgentConfig>), ServiceError> =
            if req.reload_from_file {
                let registry = registry.clone().ok_or_else(|| {
                    ServiceError::failed_precondition(
                        "reload_from_file requires an external agent registry",
                    )
                })?;
                if let Err(e) = registry.remove_agent_runtime(&name).await {
                    log::warn!("remove runtime for '{}' failed: {}", name, e);
                }
                registry
                    .reload_agent_from_file(&name)
                    .await
                    .map(|agent| (agent, None))
                    .map_err(|e| {
                        ServiceError::internal(format!("agent rebuild failed: {}", e.message))
                    })
            } else {
                let mut config = req.config.unwrap_or_else(|| AgentConfig::new(&name));
                config.validate()?;
                config.ensure_defaults();
                match registry.as_ref() {
                    Some(registry) => {
                        if let Err(e) = registry.remove_agent_runtime(&name).await {
                            log::warn!("remove runtime for '{}' failed: {}", name, e);
                        }
                        registry
                            .create_agent(&config)
                            .await
                            .map(|agent| (agent, Some(config)))
                            .map_err(|e| {
                                ServiceError::internal(format!(
                                    "agent rebuild failed: {}",
                                    e.message
                                ))
                            })
                    }
                    None => Ok((
                        Arc::new(LlmAgent::from_config(&config, self.default_provider()))
                            as Arc<dyn Agent>,
                        Some(config),
                    )),
                }
            };

        let (new_agent, new_config) = match built {
            Ok(built) => built,
            Err(e) => {
                // a failed rebuild parks the agent in error until the next
                // reload or delete
                let mut core = self.core.write().await;
                if let Some(state) = core.agent_states.get_mut(agent_id) {
                    state.set_status(AgentStatus::Error);
                    state.error_message = Some(e.message.clone());
                }
                return Err(e);
            }
        };

        if let Some(memory) = shared_memory {
            new_agent.attach_memory(memory);
        }

        {
            let mut core = self.core.write().await;
            if !core.agents.contains_key(agent_id) {
                return Err(ServiceError::not_found(format!(
                    "agent not found: {}",
                    agent_id
                )));
            }
            core.agents.insert(agent_id.to_string(), new_agent);
            if let Some(state) = core.agent_states.get_mut(agent_id) {
                if let Some(config) = new_config {
                    state.name = config.name.clone();
                    state.config = Some(config);
                }
                state.set_status(AgentStatus::Running);
            }
        }

        log::info!("Reloaded agent '{}' ({})", name, agent_id);
        self.agent_info(agent_id).await
    }

    /// Internal swap used when a caller rebuilt the agent out of band.
    pub async fn update_agent(
        &self,
        agent_id: &str,
        new_agent: Arc<dyn Agent>,
    ) -> Result<(), ServiceError> {
        let shared_memory = {
            let mut core = self.core.write().await;
            if !core.agents.contains_key(agent_id) {
                return Err(ServiceError::not_found(format!(
                    "agent not found: {}",
                    agent_id
                )));
            }
            core.agents.insert(agent_id.to_string(), new_agent.clone());
            if let Some(state) = core.agent_states.get_mut(agent_id) {
                state.set_status(state.status);
            }
            core.shared_memory.clone()
        };
        if let Some(memory) = shared_memory {
            new_agent.attach_memory(memory);
        }
        Ok(())
    }

    pub(crate) async fn agent_info(&self, agent_id: &str) -> Result<AgentInfo, ServiceError> {
        let (state, agent) = {
            let core = self.core.read().await;
            let state = core.agent_states.get(agent_id).cloned().ok_or_else(|| {
                ServiceError::not_found(format!("agent not found: {}", agent_id))
            })?;
            (state, core.agents.get(agent_id).cloned())
        };

        let (description, provider, model, session_count) = match agent {
            Some(agent) => (
                agent.description(),
                agent.provider_name(),
                agent.model(),
                agent.session_count().await,
            ),
            None => (String::new(), String::new(), String::new(), 0),
        };

        Ok(AgentInfo {
            id: state.id.clone(),
            name: state.name.clone(),
            description,
            status: state.status,
            provider,
            model,
            session_count,
            uptime_seconds: (chrono::Utc::now() - state.created_at).num_seconds(),
            created_at: state.created_at,
            updated_at: state.updated_at,
            error_message: state.error_message.clone(),
        })
    }
}
