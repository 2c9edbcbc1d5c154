use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Execution stage reported while an agent works through a query.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    PatternSelection,
    SchemaDiscovery,
    LlmGeneration,
    ToolExecution,
    HumanInTheLoop,
    GuardrailCheck,
    SelfCorrection,
    Completed,
    Failed,
}

impl std::fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProgressStage::PatternSelection => "pattern_selection",
            ProgressStage::SchemaDiscovery => "schema_discovery",
            ProgressStage::LlmGeneration => "llm_generation",
            ProgressStage::ToolExecution => "tool_execution",
            ProgressStage::HumanInTheLoop => "human_in_the_loop",
            ProgressStage::GuardrailCheck => "guardrail_check",
            ProgressStage::SelfCorrection => "self_correction",
            ProgressStage::Completed => "completed",
            ProgressStage::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HitlKind {
    ToolPermission,
    Clarification,
}

/// Carried on a `human_in_the_loop` frame so the stream consumer can answer
/// through the grant/answer endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlRequest {
    pub request_id: String,
    pub kind: HitlKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    pub description: String,
    pub risk_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: ProgressStage,
    /// 0..=100
    pub progress: u32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial_content: Option<String>,
    #[serde(default)]
    pub is_token_stream: bool,
    #[serde(default)]
    pub token_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttft_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hitl_request: Option<HitlRequest>,
}

impl ProgressEvent {
    pub fn stage(stage: ProgressStage, progress: u32, message: impl Into<String>) -> Self {
        Self {
            stage,
            progress: progress.min(100),
            message: message.into(),
            tool_name: None,
            timestamp: Utc::now(),
            partial_content: None,
            is_token_stream: false,
            token_count: 0,
            ttft_ms: None,
            hitl_request: None,
        }
    }

    pub fn tool(tool_name: impl Into<String>, progress: u32, message: impl Into<String>) -> Self {
        let mut event = Self::stage(ProgressStage::ToolExecution, progress, message);
        event.tool_name = Some(tool_name.into());
        event
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::stage(ProgressStage::Failed, 0, message)
    }

    pub fn with_partial_content(mut self, content: impl Into<String>, token_count: u32) -> Self {
        self.partial_content = Some(content.into());
        self.is_token_stream = true;
        self.token_count = token_count;
        self
    }

    pub fn with_ttft_ms(mut self, ttft_ms: u64) -> Self {
        self.ttft_ms = Some(ttft_ms);
        self
    }

    pub fn with_hitl_request(mut self, request: HitlRequest) -> Self {
        self.stage = ProgressStage::HumanInTheLoop;
        self.hitl_request = Some(request);
        self
    }
}
