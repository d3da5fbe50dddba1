use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::InvocationError;
use crate::model::{Message, SamplingParams};
use crate::providers::transport::{Endpoint, post_json};
use crate::providers::{WireMessage, endpoint_url, wire_messages};

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

fn chat_url(base_url: &str) -> String {
    endpoint_url(base_url, "chat/completions")
}

fn first_choice_content(parsed: ChatCompletionResponse) -> Result<String, InvocationError> {
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(InvocationError::EmptyResponse)
}

pub async fn chat(
    client: &Client,
    cfg: &Config,
    api_key: &str,
    params: &SamplingParams,
    messages: &[Message],
) -> Result<String, InvocationError> {
    let api_url = chat_url(&cfg.model_base_url);
    let body = ChatCompletionRequest {
        model: &params.model,
        messages: wire_messages(messages),
        temperature: params.temperature,
        max_tokens: params.max_tokens,
        stream: false,
    };
    debug!(
        api_url = %api_url,
        model = %params.model,
        temperature = params.temperature,
        max_tokens = params.max_tokens,
        "sending groq chat completion request"
    );

    let endpoint = Endpoint {
        provider: "groq",
        api_url: &api_url,
        bearer: Some(api_key),
        timeout_secs: cfg.model_timeout_secs,
    };
    let parsed: ChatCompletionResponse = post_json(client, &endpoint, &body).await?;
    let content = first_choice_content(parsed)?;
    debug!(
        model = %params.model,
        response_len = content.len(),
        "received groq chat completion"
    );
    Ok(content)
}
