use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use weave_core::Message;

#[derive(Error, Debug)]
pub enum LLMError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Authentication error: {0}")]
    Auth(String),
}

pub type Result<T> = std::result::Result<T, LLMError>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub usage: TokenUsage,
}

#[async_trait]
pub trait LLMProvider: Send + Sync {
    /// Single chat completion over the full message history.
    ///
    /// # Arguments
    /// * `messages` - Chat messages, oldest first
    /// * `tools` - Names of tools the model may mention
    async fn chat(&self, messages: &[Message], tools: &[String]) -> Result<LLMResponse>;

    fn name(&self) -> String;

    fn model(&self) -> String;
}
