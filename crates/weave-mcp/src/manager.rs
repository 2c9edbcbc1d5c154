use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration};
use tracing::{error, info, warn};

use crate::client::{McpClient, McpClientFactory};
use crate::config::McpServerConfig;
use crate::error::{McpError, Result};
use crate::types::{McpTool, RuntimeInfo, ServerHealth, ServerStatus};

/// Runtime state for a connected MCP server
struct ServerRuntime {
    config: McpServerConfig,
    client: Box<dyn McpClient>,
    info: RwLock<RuntimeInfo>,
    tools: RwLock<Vec<McpTool>>,
    shutdown: AtomicBool,
}

/// Manages MCP server connections and the aggregated tool index
pub struct McpManager {
    runtimes: DashMap<String, Arc<ServerRuntime>>,
    factory: Box<dyn McpClientFactory>,
    tool_index: RwLock<HashMap<String, McpTool>>,
}

impl McpManager {
    pub fn new(factory: Box<dyn McpClientFactory>) -> Self {
        Self {
            runtimes: DashMap::new(),
            factory,
            tool_index: RwLock::new(HashMap::new()),
        }
    }

    /// Start a new MCP server connection
    pub async fn add_server(&self, config: McpServerConfig) -> Result<()> {
        let server_name = config.name.clone();

        if self.runtimes.contains_key(&server_name) {
            return Err(McpError::AlreadyRunning(server_name));
        }

        info!("Starting MCP server '{}'", server_name);

        let client = self.factory.build(&config)?;

        client.connect().await.map_err(|e| {
            error!("Failed to connect to MCP server '{}': {}", server_name, e);
            e
        })?;

        let tools = client.list_tools().await?;
        info!("MCP server '{}' has {} tools", server_name, tools.len());

        let runtime = Arc::new(ServerRuntime {
            config: config.clone(),
            client,
            info: RwLock::new(RuntimeInfo {
                status: ServerStatus::Ready,
                last_error: None,
                connected_at: Some(Utc::now()),
                disconnected_at: None,
                tool_count: tools.len(),
                last_ping_at: Some(Utc::now()),
            }),
            tools: RwLock::new(tools),
            shutdown: AtomicBool::new(false),
        });

        self.runtimes.insert(server_name.clone(), runtime.clone());

        if config.healthcheck_interval_ms > 0 {
            self.start_health_loop(runtime, config.healthcheck_interval_ms);
        }

        Ok(())
    }

    /// Stop an MCP server connection, keeping nothing behind
    pub async fn stop_server(&self, server_name: &str) -> Result<()> {
        let (_, runtime) = self
            .runtimes
            .remove(server_name)
            .ok_or_else(|| McpError::NotRunning(server_name.to_string()))?;

        info!("Stopping MCP server '{}'", server_name);

        runtime.shutdown.store(true, Ordering::SeqCst);

        if let Err(e) = runtime.client.disconnect().await {
            warn!("Error disconnecting MCP server '{}': {}", server_name, e);
        }

        let mut info = runtime.info.write().await;
        info.status = ServerStatus::Stopped;
        info.disconnected_at = Some(Utc::now());

        Ok(())
    }

    /// Stop and forget a server
    pub async fn remove_server(&self, server_name: &str) -> Result<()> {
        self.stop_server(server_name).await
    }

    pub fn list_servers(&self) -> Vec<McpServerConfig> {
        self.runtimes
            .iter()
            .map(|entry| entry.value().config.clone())
            .collect()
    }

    pub fn get_server_config(&self, server_name: &str) -> Option<McpServerConfig> {
        self.runtimes
            .get(server_name)
            .map(|runtime| runtime.config.clone())
    }

    pub fn get_server_info(&self, server_name: &str) -> Option<RuntimeInfo> {
        self.runtimes.get(server_name).and_then(|runtime| {
            runtime.info.try_read().ok().map(|info| info.clone())
        })
    }

    pub fn is_server_running(&self, server_name: &str) -> bool {
        self.runtimes.contains_key(server_name)
    }

    pub async fn list_tools(&self, server_name: &str) -> Result<Vec<McpTool>> {
        let runtime = self
            .runtimes
            .get(server_name)
            .ok_or_else(|| McpError::ServerNotFound(server_name.to_string()))?
            .clone();
        let tools = runtime.tools.read().await;
        Ok(tools.clone())
    }

    /// Ping every connected server. One failing server never hides the rest.
    pub async fn health_check(&self) -> HashMap<String, ServerHealth> {
        let runtimes: Vec<(String, Arc<ServerRuntime>)> = self
            .runtimes
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut results = HashMap::new();
        for (name, runtime) in runtimes {
            let health = match runtime.client.ping().await {
                Ok(()) => ServerHealth {
                    healthy: true,
                    error: None,
                },
                Err(e) => ServerHealth {
                    healthy: false,
                    error: Some(e.to_string()),
                },
            };
            results.insert(name, health);
        }
        results
    }

    /// Rebuild the aggregated tool index from every connected server.
    pub async fn reindex_tools(&self) -> usize {
        let runtimes: Vec<Arc<ServerRuntime>> = self
            .runtimes
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut index = HashMap::new();
        for runtime in runtimes {
            match runtime.client.list_tools().await {
                Ok(tools) => {
                    let mut cached = runtime.tools.write().await;
                    *cached = tools.clone();
                    drop(cached);
                    let mut info = runtime.info.write().await;
                    info.tool_count = tools.len();
                    drop(info);
                    for tool in tools {
                        index.insert(
                            format!("{}::{}", runtime.config.name, tool.name),
                            tool,
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        "Failed to refresh tools for MCP server '{}': {}",
                        runtime.config.name, e
                    );
                }
            }
        }

        let count = index.len();
        let mut shared = self.tool_index.write().await;
        *shared = index;
        info!("Tool index rebuilt with {} tools", count);
        count
    }

    pub async fn indexed_tools(&self) -> Vec<String> {
        let index = self.tool_index.read().await;
        let mut names: Vec<String> = index.keys().cloned().collect();
        names.sort();
        names
    }

    /// Shutdown all servers
    pub async fn shutdown_all(&self) {
        let names: Vec<String> = self
            .runtimes
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for name in names {
            if let Err(e) = self.stop_server(&name).await {
                error!("Error stopping server '{}': {}", name, e);
            }
        }
    }

    fn start_health_loop(&self, runtime: Arc<ServerRuntime>, interval_ms: u64) {
        let server_name = runtime.config.name.clone();

        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_millis(interval_ms));

            loop {
                ticker.tick().await;

                if runtime.shutdown.load(Ordering::SeqCst) {
                    break;
                }

                match runtime.client.ping().await {
                    Ok(()) => {
                        let mut info = runtime.info.write().await;
                        info.last_ping_at = Some(Utc::now());
                        if info.status == ServerStatus::Degraded {
                            info.status = ServerStatus::Ready;
                        }
                    }
                    Err(e) => {
                        warn!(
                            "Health check failed for MCP server '{}': {}",
                            server_name, e
                        );
                        let mut info = runtime.info.write().await;
                        info.status = ServerStatus::Degraded;
                        info.last_error = Some(e.to_string());
                    }
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ScriptedClient;
    use crate::config::TransportConfig;

    fn scripted_manager() -> McpManager {
        McpManager::new(Box::new(|config: &McpServerConfig| {
            let client: Box<dyn McpClient> = if config.name == "broken" {
                Box::new(ScriptedClient::failing_connect())
            } else {
                Box::new(ScriptedClient::with_tool_names(&["query", "describe"]))
            };
            Ok(client)
        }))
    }

    fn config(name: &str) -> McpServerConfig {
        McpServerConfig {
            name: name.to_string(),
            enabled: true,
            transport: TransportConfig::Sse {
                url: "http://localhost:9000".to_string(),
            },
            request_timeout_ms: 1000,
            // no background loop in tests
            healthcheck_interval_ms: 0,
        }
    }

    #[tokio::test]
    async fn add_server_rejects_duplicates() {
        let manager = scripted_manager();
        manager.add_server(config("files")).await.expect("add");
        let err = manager.add_server(config("files")).await.expect_err("dup");
        assert!(matches!(err, McpError::AlreadyRunning(_)));
    }

    #[tokio::test]
    async fn add_server_surfaces_connect_failures() {
        let manager = scripted_manager();
        let err = manager.add_server(config("broken")).await.expect_err("broken");
        assert!(matches!(err, McpError::Connection(_)));
        assert!(!manager.is_server_running("broken"));
    }

    #[tokio::test]
    async fn tools_and_health_per_server() {
        let manager = scripted_manager();
        manager.add_server(config("files")).await.expect("add");

        let tools = manager.list_tools("files").await.expect("tools");
        assert_eq!(tools.len(), 2);

        let health = manager.health_check().await;
        assert!(health.get("files").expect("entry").healthy);

        let count = manager.reindex_tools().await;
        assert_eq!(count, 2);
        let indexed = manager.indexed_tools().await;
        assert_eq!(indexed, vec!["files::describe", "files::query"]);
    }

    #[tokio::test]
    async fn stop_server_removes_runtime() {
        let manager = scripted_manager();
        manager.add_server(config("files")).await.expect("add");
        manager.stop_server("files").await.expect("stop");
        assert!(!manager.is_server_running("files"));
        let err = manager.stop_server("files").await.expect_err("gone");
        assert!(matches!(err, McpError::NotRunning(_)));
    }
}
