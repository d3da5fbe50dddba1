use reqwest::Client;
use tracing::debug;

use crate::config::{Config, ModelProvider};
use crate::error::InvocationError;
use crate::providers;

pub const TEMPERATURE_MIN: f32 = 0.0;
pub const TEMPERATURE_MAX: f32 = 1.0;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const MAX_TOKENS_MIN: u32 = 50;
pub const MAX_TOKENS_MAX: u32 = 300;
pub const DEFAULT_MAX_TOKENS: u32 = 100;

const QUESTION_TEMPLATE: &str = "Question:{input}";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }
}

/// Sampling settings for one call, already clamped to the form's ranges.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplingParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl SamplingParams {
    pub fn new(model: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        let temperature = if temperature.is_finite() {
            temperature.clamp(TEMPERATURE_MIN, TEMPERATURE_MAX)
        } else {
            DEFAULT_TEMPERATURE
        };
        Self {
            model: model.into(),
            temperature,
            max_tokens: max_tokens.clamp(MAX_TOKENS_MIN, MAX_TOKENS_MAX),
        }
    }
}

pub fn render_question(question: &str) -> String {
    QUESTION_TEMPLATE.replace("{input}", question)
}

/// System prompt followed by the templated question.
pub fn build_messages(system_prompt: &str, question: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if !system_prompt.trim().is_empty() {
        messages.push(Message::system(system_prompt));
    }
    messages.push(Message::user(render_question(question)));
    messages
}

pub async fn chat(
    client: &Client,
    cfg: &Config,
    api_key: Option<&str>,
    params: &SamplingParams,
    messages: &[Message],
) -> Result<String, InvocationError> {
    debug!(
        provider = cfg.model_provider.as_str(),
        model = %params.model,
        message_count = messages.len(),
        "dispatching model chat request"
    );

    match cfg.model_provider {
        ModelProvider::Groq => {
            let api_key = api_key.ok_or(InvocationError::MissingCredential)?;
            providers::groq::chat(client, cfg, api_key, params, messages).await
        }
        ModelProvider::Ollama => providers::ollama::chat(client, cfg, params, messages).await,
    }
}
