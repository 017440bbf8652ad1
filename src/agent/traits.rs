//! Language-model seam consumed by the classifier and the conversational fallback.

use crate::infra::{UsageEvent, UsageTracker};
use crate::providers::{ChatMessage, Provider};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

/// Which job a model instance does. Recorded with every usage event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// Strict, low-temperature tool/parameter extraction.
    Classifier,
    /// Open conversation. Its output is never parsed.
    Responder,
}

impl ModelRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Classifier => "classifier",
            Self::Responder => "responder",
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model that turns a prompt plus prior conversation into text.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn respond(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        usage: &dyn UsageTracker,
    ) -> Result<String>;

    fn name(&self) -> &str;
}

/// [`LanguageModel`] backed by a chat-completions [`Provider`].
pub struct ProviderModel {
    provider: Box<dyn Provider>,
    role: ModelRole,
    model: String,
    temperature: f64,
    system_prompt: Option<String>,
}

impl ProviderModel {
    pub fn new(provider: Box<dyn Provider>, role: ModelRole, model: &str, temperature: f64) -> Self {
        Self {
            provider,
            role,
            model: model.to_string(),
            temperature,
            system_prompt: None,
        }
    }

    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn role(&self) -> ModelRole {
        self.role
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_messages(&self, prompt: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        if let Some(sys) = &self.system_prompt {
            messages.push(ChatMessage::system(sys.as_str()));
        }
        messages.extend_from_slice(history);
        messages.push(ChatMessage::user(prompt));
        messages
    }
}

#[async_trait]
impl LanguageModel for ProviderModel {
    async fn respond(
        &self,
        prompt: &str,
        history: &[ChatMessage],
        usage: &dyn UsageTracker,
    ) -> Result<String> {
        let messages = self.build_messages(prompt, history);
        let response = self
            .provider
            .chat_with_history(&messages, &self.model, self.temperature)
            .await?;

        if let Some(tokens) = response.usage {
            let event = UsageEvent {
                role: self.role.as_str().to_string(),
                provider: self.provider.name().to_string(),
                model: self.model.clone(),
                input_tokens: tokens.input_tokens,
                output_tokens: tokens.output_tokens,
                timestamp: chrono::Utc::now(),
            };
            if let Err(e) = usage.record(event).await {
                tracing::warn!(role = %self.role, error = %e, "Failed to record usage");
            }
        }

        Ok(response.text)
    }

    fn name(&self) -> &str {
        self.role.as_str()
    }
}
