use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use weave_core::{Message, Role};

use crate::provider::{LLMError, LLMProvider, LLMResponse, Result, TokenUsage};

/// Per-million-token prices used for cost accounting.
#[derive(Debug, Clone, Copy)]
pub struct Pricing {
    pub input_per_million_usd: f64,
    pub output_per_million_usd: f64,
}

impl Default for Pricing {
    fn default() -> Self {
        Self {
            input_per_million_usd: 0.15,
            output_per_million_usd: 0.60,
        }
    }
}

pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    pricing: Pricing,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            pricing: Pricing::default(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    fn build_request_body(&self, messages: &[Message]) -> serde_json::Value {
        let wire_messages: Vec<serde_json::Value> = messages
            .iter()
            .map(|msg| {
                serde_json::json!({
                    "role": role_name(msg.role),
                    "content": msg.content,
                })
            })
            .collect();

        serde_json::json!({
            "model": self.model,
            "messages": wire_messages,
        })
    }

    fn cost_for(&self, input_tokens: u32, output_tokens: u32) -> f64 {
        (input_tokens as f64 * self.pricing.input_per_million_usd
            + output_tokens as f64 * self.pricing.output_per_million_usd)
            / 1_000_000.0
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(&self, messages: &[Message], _tools: &[String]) -> Result<LLMResponse> {
        let body = self.build_request_body(messages);

        log::debug!("Request body messages count: {}", messages.len());

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await?;
            if status.as_u16() == 401 {
                return Err(LLMError::Auth(text));
            }
            return Err(LLMError::Api(format!("HTTP {}: {}", status, text)));
        }

        let completion: OpenAICompletion = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| LLMError::Api("completion contained no choices".to_string()))?;

        let usage = completion.usage.unwrap_or_default();
        Ok(LLMResponse {
            content,
            usage: TokenUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
                cost_usd: self.cost_for(usage.prompt_tokens, usage.completion_tokens),
            },
        })
    }

    fn name(&self) -> String {
        "openai".to_string()
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}

#[derive(Debug, Deserialize)]
struct OpenAICompletion {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct OpenAIUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_uses_per_million_prices() {
        let provider = OpenAIProvider::new("sk-test").with_pricing(Pricing {
            input_per_million_usd: 1.0,
            output_per_million_usd: 2.0,
        });
        let cost = provider.cost_for(1_000_000, 500_000);
        assert!((cost - 2.0).abs() < 1e-9);
    }

    #[test]
    fn request_body_maps_roles() {
        let provider = OpenAIProvider::new("sk-test").with_model("gpt-4o");
        let messages = vec![Message::system("be brief"), Message::user("hi")];
        let body = provider.build_request_body(&messages);
        assert_eq!(body["model"], "gpt-4o");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "hi");
    }
}
