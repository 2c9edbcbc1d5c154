pub mod openai;
pub mod provider;
pub mod scripted;

pub use openai::OpenAIProvider;
pub use provider::{LLMError, LLMProvider, LLMResponse, Result, TokenUsage};
pub use scripted::ScriptedProvider;
