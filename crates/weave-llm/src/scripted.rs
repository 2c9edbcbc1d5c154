use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use weave_core::Message;

use crate::provider::{LLMError, LLMProvider, LLMResponse, Result, TokenUsage};

/// Deterministic provider used by tests and offline servers. Pops queued
/// responses in order; once the queue is empty it echoes the last user
/// message.
pub struct ScriptedProvider {
    model: String,
    responses: Mutex<VecDeque<Result<LLMResponse>>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            model: "scripted-1".to_string(),
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn push_text(&self, content: impl Into<String>) {
        self.push_response(LLMResponse {
            content: content.into(),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                cost_usd: 0.0001,
            },
        });
    }

    pub fn push_response(&self, response: LLMResponse) {
        let mut queue = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        queue.push_back(Ok(response));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        let mut queue = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        queue.push_back(Err(LLMError::Api(message.into())));
    }
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LLMProvider for ScriptedProvider {
    async fn chat(&self, messages: &[Message], _tools: &[String]) -> Result<LLMResponse> {
        let queued = {
            let mut queue = self.responses.lock().unwrap_or_else(|e| e.into_inner());
            queue.pop_front()
        };
        if let Some(result) = queued {
            return result;
        }

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == weave_core::Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(LLMResponse {
            content: format!("echo: {}", last_user),
            usage: TokenUsage {
                input_tokens: last_user.len() as u32 / 4,
                output_tokens: 8,
                cost_usd: 0.0,
            },
        })
    }

    fn name(&self) -> String {
        "scripted".to_string()
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pops_queued_responses_then_echoes() {
        let provider = ScriptedProvider::new();
        provider.push_text("first");

        let messages = vec![Message::user("hello")];
        let reply = provider.chat(&messages, &[]).await.expect("first reply");
        assert_eq!(reply.content, "first");

        let reply = provider.chat(&messages, &[]).await.expect("echo reply");
        assert_eq!(reply.content, "echo: hello");
    }

    #[tokio::test]
    async fn queued_errors_surface() {
        let provider = ScriptedProvider::new();
        provider.push_error("rate limited");
        let err = provider
            .chat(&[Message::user("hi")], &[])
            .await
            .expect_err("queued error");
        assert!(err.to_string().contains("rate limited"));
    }
}
