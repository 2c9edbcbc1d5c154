use std::sync::Arc;

use async_trait::async_trait;

use weave_core::{Agent, AgentConfig, ServiceError};

use crate::apps::{AppInfo, AppSpec};

/// External agent backend. The server delegates lifecycle transitions here
/// and treats most failures as non-fatal; only build and rebuild must
/// succeed.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    async fn create_agent(&self, config: &AgentConfig) -> Result<Arc<dyn Agent>, ServiceError>;

    async fn start_agent(&self, name: &str) -> Result<(), ServiceError>;

    async fn stop_agent(&self, name: &str) -> Result<(), ServiceError>;

    async fn delete_agent(&self, name: &str) -> Result<(), ServiceError>;

    /// Rebuild an agent from its registered config file.
    async fn reload_agent_from_file(&self, name: &str) -> Result<Arc<dyn Agent>, ServiceError>;

    async fn register_config(&self, config: &AgentConfig) -> Result<(), ServiceError>;

    /// Drop the runtime entry without touching durable records, so a
    /// recreate with the same name cannot collide with a live instance.
    async fn remove_agent_runtime(&self, name: &str) -> Result<(), ServiceError>;
}

/// UI-app source consumed by the `/apps` surface.
#[async_trait]
pub trait AppProvider: Send + Sync {
    async fn list_app_info(&self) -> Vec<AppInfo>;

    async fn get_app_html(&self, name: &str) -> Option<String>;

    async fn create_app(&self, spec: AppSpec) -> Result<AppInfo, ServiceError>;

    async fn update_app(&self, name: &str, spec: AppSpec) -> Result<AppInfo, ServiceError>;

    async fn delete_app(&self, name: &str) -> Result<(), ServiceError>;

    async fn list_component_types(&self) -> Vec<String>;
}
