//! LLM access for evalloop.
//!
//! [`LlmClient`] talks to any OpenAI-compatible chat endpoint using explicitly
//! supplied [`Credentials`]. [`GEvalMetric`] builds an LLM-graded metric on top
//! of any [`ChatModel`].

mod client;
mod geval;

pub use client::{Credentials, LlmClient};
pub use geval::{GEvalMetric, MetricOutcome};

use async_trait::async_trait;
use evalloop_core::AgentError;

/// A complete (non-streaming) chat response.
#[derive(Debug, Clone, Default)]
pub struct LlmResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Single-turn chat: a system prompt plus one user message.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn chat(&self, system_prompt: &str, user_input: &str) -> Result<LlmResponse, AgentError>;
}
