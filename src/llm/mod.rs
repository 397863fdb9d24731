pub mod prompt;


use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::LlmConfig;
use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}

impl ChatTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Turns an ordered conversation into reply text. Has no effect on broker state.
#[async_trait]
pub trait Narrator: Send + Sync {
    async fn narrate(&self, turns: &[ChatTurn]) -> Result<String, LlmError>;
}

#[derive(Clone)]
pub struct LLMClient {
    pub client: Client<OpenAIConfig>,
    pub model: String,
}

impl LLMClient {
    pub fn new(api_key: String, base_url: Option<String>, model: String) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        let client = Client::with_config(config);
        Self { client, model }
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &LlmConfig) -> Option<Self> {
        let key = config.api_key.clone().filter(|k| !k.trim().is_empty())?;
        Some(Self::new(key, config.base_url.clone(), config.model.clone()))
    }

    fn to_message(turn: &ChatTurn) -> Result<ChatCompletionRequestMessage, LlmError> {
        let content = turn.content.as_str();
        Ok(match turn.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(content)
                .build()?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(content)
                .build()?
                .into(),
        })
    }
}

#[async_trait]
impl Narrator for LLMClient {
    async fn narrate(&self, turns: &[ChatTurn]) -> Result<String, LlmError> {
        info!(
            "🤖 Sending {} turn(s) to LLM (Model: {})...",
            turns.len(),
            self.model
        );

        let messages = turns
            .iter()
            .map(Self::to_message)
            .collect::<Result<Vec<_>, _>>()?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .build()?;

        let response = self.client.chat().create(request).await?;
        info!("🤖 LLM Response received.");

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(LlmError::Empty)
    }
}

/// Stand-in when no model is configured; callers fall back to plain text.
pub struct OfflineNarrator;

#[async_trait]
impl Narrator for OfflineNarrator {
    async fn narrate(&self, _turns: &[ChatTurn]) -> Result<String, LlmError> {
        Err(LlmError::NotConfigured)
    }
}
