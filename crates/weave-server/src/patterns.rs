use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Duration;

use weave_core::{PatternInfo, PatternLibrary, ServiceError};

use crate::hotreload::PatternHotReloader;
use crate::state::ServerState;

const HOT_RELOAD_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoadPatternsRequest {
    pub source: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    /// Keep a background reloader scanning the source directory.
    #[serde(default)]
    pub watch: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadPatternsResponse {
    /// agent id -> pattern count
    pub loaded: HashMap<String, usize>,
    /// agent id -> failure message; non-fatal while any agent loads
    pub errors: HashMap<String, String>,
}

impl ServerState {
    /// Load the source directory into one agent, or into every agent when no
    /// id is given. Per-agent failures are collected; the call fails only
    /// when no agent loads.
    pub async fn load_patterns(
        &self,
        req: LoadPatternsRequest,
    ) -> Result<LoadPatternsResponse, ServiceError> {
        if req.source.is_empty() {
            return Err(ServiceError::invalid_argument(
                "pattern source directory is required",
            ));
        }

        let targets: Vec<String> = match req.agent_id.as_deref().filter(|id| !id.is_empty()) {
            Some(agent_id) => {
                let core = self.core.read().await;
                if !core.agents.contains_key(agent_id) {
                    return Err(ServiceError::not_found(format!(
                        "agent not found: {}",
                        agent_id
                    )));
                }
                vec![agent_id.to_string()]
            }
            None => {
                let core = self.core.read().await;
                core.agents.keys().cloned().collect()
            }
        };
        if targets.is_empty() {
            return Err(ServiceError::failed_precondition("no agents registered"));
        }

        let mut response = LoadPatternsResponse::default();
        for agent_id in targets {
            match PatternLibrary::load_dir(&req.source) {
                Ok(library) => {
                    let count = library.len();
                    let library = Arc::new(std::sync::RwLock::new(library));
                    let mut core = self.core.write().await;
                    core.pattern_libs.insert(agent_id.clone(), Arc::clone(&library));
                    if req.watch {
                        if let Some(old) = core.hot_reloaders.remove(&agent_id) {
                            old.stop();
                        }
                        core.hot_reloaders.insert(
                            agent_id.clone(),
                            PatternHotReloader::start(
                                agent_id.clone(),
                                PathBuf::from(&req.source),
                                library,
                                HOT_RELOAD_INTERVAL,
                            ),
                        );
                    }
                    drop(core);
                    log::info!("[{}] loaded {} patterns from {}", agent_id, count, req.source);
                    response.loaded.insert(agent_id, count);
                }
                Err(e) => {
                    log::warn!("[{}] pattern load failed: {}", agent_id, e);
                    response.errors.insert(agent_id, e.to_string());
                }
            }
        }

        if response.loaded.is_empty() {
            let detail: Vec<String> = response
                .errors
                .iter()
                .map(|(agent_id, err)| format!("{}: {}", agent_id, err))
                .collect();
            return Err(ServiceError::internal(format!(
                "pattern load failed for all agents: {}",
                detail.join("; ")
            )));
        }
        Ok(response)
    }

    pub async fn list_patterns(
        &self,
        agent_id: Option<&str>,
    ) -> Result<Vec<PatternInfo>, ServiceError> {
        let library = self.pattern_library_for(agent_id).await?;
        let Some(library) = library else {
            return Ok(Vec::new());
        };
        let guard = library.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.list().into_iter().map(PatternInfo::from).collect())
    }

    pub async fn get_pattern(
        &self,
        name: &str,
        agent_id: Option<&str>,
    ) -> Result<PatternInfo, ServiceError> {
        if name.is_empty() {
            return Err(ServiceError::invalid_argument("pattern name is required"));
        }
        let library = self.pattern_library_for(agent_id).await?;
        let library =
            library.ok_or_else(|| ServiceError::not_found(format!("pattern not found: {}", name)))?;
        let guard = library.read().unwrap_or_else(|e| e.into_inner());
        guard
            .get(name)
            .map(PatternInfo::from)
            .ok_or_else(|| ServiceError::not_found(format!("pattern not found: {}", name)))
    }

    async fn pattern_library_for(
        &self,
        agent_id: Option<&str>,
    ) -> Result<Option<Arc<std::sync::RwLock<PatternLibrary>>>, ServiceError> {
        let core = self.core.read().await;
        let target = match agent_id.filter(|id| !id.is_empty()) {
            Some(agent_id) => {
                if !core.agents.contains_key(agent_id) {
                    return Err(ServiceError::not_found(format!(
                        "agent not found: {}",
                        agent_id
                    )));
                }
                agent_id.to_string()
            }
            None => core.default_agent_id.clone().ok_or_else(|| {
                ServiceError::failed_precondition("no default agent configured")
            })?,
        };
        Ok(core.pattern_libs.get(&target).cloned())
    }
}
