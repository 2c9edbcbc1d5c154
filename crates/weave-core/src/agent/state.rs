use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::AgentConfig;

/// Declared lifecycle status of a registered agent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Initializing,
    Running,
    Stopped,
    Error,
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentStatus::Initializing => "initializing",
            AgentStatus::Running => "running",
            AgentStatus::Stopped => "stopped",
            AgentStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Mutable lifecycle record stored by the server, separate from the agent
/// value itself. Snapshots are returned by value so callers never hold a
/// reference under the server lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub id: String,
    pub name: String,
    pub status: AgentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<AgentConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AgentState {
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: AgentStatus) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            name: name.into(),
            status,
            created_at: now,
            updated_at: now,
            config: None,
            error_message: None,
        }
    }

    pub fn set_status(&mut self, status: AgentStatus) {
        self.status = status;
        self.updated_at = Utc::now();
        if status != AgentStatus::Error {
            self.error_message = None;
        }
    }
}

/// Snapshot returned to callers: the state record joined with live session
/// count and uptime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub id: String,
    pub name: String,
    pub description: String,
    pub status: AgentStatus,
    pub provider: String,
    pub model: String,
    pub session_count: usize,
    pub uptime_seconds: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}
