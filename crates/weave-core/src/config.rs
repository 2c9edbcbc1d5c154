use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Declarative agent configuration. Nested sections are optional on input;
/// [`AgentConfig::ensure_defaults`] fills the missing ones before the config
/// reaches code that dereferences them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MemoryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub behavior: Option<BehaviorConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_memory_type", rename = "type")]
    pub memory_type: String,
    #[serde(default = "default_max_history")]
    pub max_history: u32,
}

fn default_memory_type() -> String {
    "memory".to_string()
}

fn default_max_history() -> u32 {
    50
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            memory_type: default_memory_type(),
            max_history: default_max_history(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BehaviorConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default = "default_max_tool_executions")]
    pub max_tool_executions: u32,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_timeout_seconds() -> u64 {
    300
}

fn default_max_turns() -> u32 {
    25
}

fn default_max_tool_executions() -> u32 {
    50
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            timeout_seconds: default_timeout_seconds(),
            max_turns: default_max_turns(),
            max_tool_executions: default_max_tool_executions(),
        }
    }
}

impl AgentConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            system_prompt: String::new(),
            llm: None,
            tools: None,
            memory: None,
            behavior: None,
        }
    }

    /// Load a config from a YAML or JSON file, selected by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ServiceError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ServiceError::invalid_argument(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let config: AgentConfig = if is_json {
            serde_json::from_str(&content).map_err(|e| {
                ServiceError::invalid_argument(format!("invalid JSON agent config: {}", e))
            })?
        } else {
            serde_yaml::from_str(&content).map_err(|e| {
                ServiceError::invalid_argument(format!("invalid YAML agent config: {}", e))
            })?
        };
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ServiceError> {
        if self.name.trim().is_empty() {
            return Err(ServiceError::invalid_argument("agent name is required"));
        }
        Ok(())
    }

    /// Fill absent nested sections with fixed defaults. Idempotent; never
    /// overwrites fields the caller has set.
    pub fn ensure_defaults(&mut self) {
        if self.llm.is_none() {
            self.llm = Some(LlmConfig::default());
        }
        if self.tools.is_none() {
            self.tools = Some(ToolsConfig::default());
        }
        if self.memory.is_none() {
            self.memory = Some(MemoryConfig::default());
        }
        if self.behavior.is_none() {
            self.behavior = Some(BehaviorConfig::default());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn ensure_defaults_fills_missing_sections() {
        let mut config = AgentConfig::new("helper");
        config.ensure_defaults();

        let memory = config.memory.as_ref().expect("memory default");
        assert_eq!(memory.memory_type, "memory");
        assert_eq!(memory.max_history, 50);

        let behavior = config.behavior.as_ref().expect("behavior default");
        assert_eq!(behavior.max_iterations, 10);
        assert_eq!(behavior.timeout_seconds, 300);
        assert_eq!(behavior.max_turns, 25);
        assert_eq!(behavior.max_tool_executions, 50);
    }

    #[test]
    fn ensure_defaults_keeps_caller_values() {
        let mut config = AgentConfig::new("helper");
        config.memory = Some(MemoryConfig {
            memory_type: "sqlite".to_string(),
            max_history: 7,
        });
        config.ensure_defaults();
        config.ensure_defaults();

        let memory = config.memory.as_ref().expect("memory kept");
        assert_eq!(memory.memory_type, "sqlite");
        assert_eq!(memory.max_history, 7);
    }

    #[test]
    fn validate_rejects_empty_name() {
        let config = AgentConfig::new("  ");
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_parses_yaml_and_json() {
        let mut yaml = tempfile::NamedTempFile::with_suffix(".yaml").expect("temp yaml");
        writeln!(yaml, "name: helper\nsystem_prompt: be brief").expect("write yaml");
        let config = AgentConfig::from_file(yaml.path()).expect("parse yaml");
        assert_eq!(config.name, "helper");
        assert_eq!(config.system_prompt, "be brief");

        let mut json = tempfile::NamedTempFile::with_suffix(".json").expect("temp json");
        writeln!(json, "{{\"name\": \"helper2\"}}").expect("write json");
        let config = AgentConfig::from_file(json.path()).expect("parse json");
        assert_eq!(config.name, "helper2");
    }

    #[test]
    fn from_file_rejects_malformed_content() {
        let mut file = tempfile::NamedTempFile::with_suffix(".json").expect("temp file");
        writeln!(file, "not json").expect("write");
        let err = AgentConfig::from_file(file.path()).expect_err("should fail");
        assert_eq!(err.code, crate::error::RpcCode::InvalidArgument);
    }
}
