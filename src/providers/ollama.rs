//! Local Ollama server. Needs no credential; sampling settings travel in
//! `options`, with the output cap named `num_predict`.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Config;
use crate::error::InvocationError;
use crate::model::{Message, SamplingParams};
use crate::providers::transport::{Endpoint, post_json};
use crate::providers::{WireMessage, endpoint_url, wire_messages};

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: Vec<WireMessage<'a>>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaReply,
}

#[derive(Debug, Deserialize)]
struct OllamaReply {
    #[serde(default)]
    content: String,
}

fn request_body<'a>(params: &'a SamplingParams, messages: &'a [Message]) -> OllamaChatRequest<'a> {
    OllamaChatRequest {
        model: &params.model,
        stream: false,
        messages: wire_messages(messages),
        options: OllamaOptions {
            temperature: params.temperature,
            num_predict: params.max_tokens,
        },
    }
}

pub async fn chat(
    client: &Client,
    cfg: &Config,
    params: &SamplingParams,
    messages: &[Message],
) -> Result<String, InvocationError> {
    let api_url = endpoint_url(&cfg.model_base_url, "api/chat");
    debug!(api_url = %api_url, model = %params.model, "sending ollama chat request");

    let endpoint = Endpoint {
        provider: "ollama",
        api_url: &api_url,
        bearer: None,
        timeout_secs: cfg.model_timeout_secs,
    };
    let parsed: OllamaChatResponse =
        post_json(client, &endpoint, &request_body(params, messages)).await?;

    if parsed.message.content.trim().is_empty() {
        return Err(InvocationError::EmptyResponse);
    }
    Ok(parsed.message.content)
}

#[cfg(test)]
mod tests {
    use super::{OllamaChatResponse, request_body};
    use crate::model::{SamplingParams, build_messages};
    use crate::providers::endpoint_url;

    #[test]
    fn endpoint_url_trims_trailing_slash() {
        assert_eq!(
            endpoint_url("http://localhost:11434/", "api/chat"),
            "http://localhost:11434/api/chat"
        );
    }

    #[test]
    fn request_body_maps_max_tokens_to_num_predict() {
        let messages = build_messages("sys", "hi");
        let params = SamplingParams::new("qwen2.5:3b", 0.25, 80);

        let json = serde_json::to_value(request_body(&params, &messages))
            .expect("request should serialize");
        assert_eq!(json["model"], "qwen2.5:3b");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 80);
        assert_eq!(json["options"]["temperature"], 0.25);
        assert_eq!(json["messages"][1]["role"], "user");
    }

    #[test]
    fn response_reads_message_content() {
        let parsed: OllamaChatResponse = serde_json::from_str(
            r#"{"model":"qwen2.5:3b","message":{"role":"assistant","content":"hey"},"done":true}"#,
        )
        .expect("response should parse");
        assert_eq!(parsed.message.content, "hey");
    }
}
