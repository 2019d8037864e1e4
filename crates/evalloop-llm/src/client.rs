//! OpenAI-compatible chat client.

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use evalloop_config::{ConfigError, SecretSource};
use evalloop_core::{AgentError, ModelConfig};
use tracing::{debug, error, info};

use crate::{ChatModel, LlmResponse};

/// API key and base URL for the grading endpoint.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_base: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl Credentials {
    pub const API_KEY: &'static str = "OPENAI_API_KEY";
    pub const API_BASE: &'static str = "OPENAI_API_BASE";

    pub fn new(api_key: impl Into<String>, api_base: Option<String>) -> Self {
        Self { api_key: api_key.into(), api_base }
    }

    /// Both the key and the base URL are required.
    pub fn from_secrets(secrets: &dyn SecretSource) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: secrets.require(Self::API_KEY)?,
            api_base: Some(secrets.require(Self::API_BASE)?),
        })
    }
}

pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl LlmClient {
    pub fn new(model: &ModelConfig, credentials: Credentials) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(credentials.api_key);
        if let Some(base) = model.api_base.as_ref().or(credentials.api_base.as_ref()) {
            config = config.with_api_base(base);
        }
        info!("LlmClient: model={}, api_base={:?}", model.model, credentials.api_base);

        Self {
            client: Client::with_config(config),
            model: model.model.clone(),
        }
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn chat(&self, system_prompt: &str, user_input: &str) -> Result<LlmResponse, AgentError> {
        let start = std::time::Instant::now();

        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_prompt)
            .build()
            .map_err(|e| AgentError::InvalidInput(e.to_string()))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(user_input)
            .build()
            .map_err(|e| AgentError::InvalidInput(e.to_string()))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![system.into(), user.into()])
            .temperature(0.0)
            .build()
            .map_err(|e| AgentError::InvalidInput(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            error!("Chat completion failed: {}", e);
            AgentError::LlmError(e.to_string())
        })?;

        let (input_tokens, output_tokens) = response
            .usage
            .as_ref()
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AgentError::LlmError("empty completion".into()))?;

        debug!(
            model = %self.model,
            input_tokens,
            output_tokens,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Chat completion"
        );

        Ok(LlmResponse { content, input_tokens, output_tokens })
    }
}
