use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::McpServerConfig;
use crate::error::{McpError, Result};
use crate::types::McpTool;

/// Protocol client for one connected MCP server. The manager only needs
/// connect, ping, tool listing, and disconnect.
#[async_trait]
pub trait McpClient: Send + Sync {
    async fn connect(&self) -> Result<()>;

    async fn ping(&self) -> Result<()>;

    async fn list_tools(&self) -> Result<Vec<McpTool>>;

    async fn disconnect(&self) -> Result<()>;
}

/// Builds a client for a server config. Lets the server wire real stdio/sse
/// transports while tests plug in scripted clients.
pub trait McpClientFactory: Send + Sync {
    fn build(&self, config: &McpServerConfig) -> Result<Box<dyn McpClient>>;
}

impl<F> McpClientFactory for F
where
    F: Fn(&McpServerConfig) -> Result<Box<dyn McpClient>> + Send + Sync,
{
    fn build(&self, config: &McpServerConfig) -> Result<Box<dyn McpClient>> {
        self(config)
    }
}

/// In-memory client used by tests and offline servers: fixed tool list,
/// optional failure switches.
pub struct ScriptedClient {
    tools: Vec<McpTool>,
    fail_ping: Mutex<bool>,
    fail_connect: bool,
}

impl ScriptedClient {
    pub fn new(tools: Vec<McpTool>) -> Self {
        Self {
            tools,
            fail_ping: Mutex::new(false),
            fail_connect: false,
        }
    }

    pub fn with_tool_names(names: &[&str]) -> Self {
        let tools = names
            .iter()
            .map(|name| McpTool {
                name: name.to_string(),
                description: format!("scripted tool {}", name),
                parameters: serde_json::json!({"type": "object", "properties": HashMap::<String, serde_json::Value>::new()}),
            })
            .collect();
        Self::new(tools)
    }

    pub fn failing_connect() -> Self {
        let mut client = Self::new(Vec::new());
        client.fail_connect = true;
        client
    }

    pub fn set_ping_failure(&self, fail: bool) {
        let mut guard = self.fail_ping.lock().unwrap_or_else(|e| e.into_inner());
        *guard = fail;
    }
}

#[async_trait]
impl McpClient for ScriptedClient {
    async fn connect(&self) -> Result<()> {
        if self.fail_connect {
            return Err(McpError::Connection("scripted connect failure".to_string()));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let failing = *self.fail_ping.lock().unwrap_or_else(|e| e.into_inner());
        if failing {
            return Err(McpError::Transport("scripted ping failure".to_string()));
        }
        Ok(())
    }

    async fn list_tools(&self) -> Result<Vec<McpTool>> {
        Ok(self.tools.clone())
    }

    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}
