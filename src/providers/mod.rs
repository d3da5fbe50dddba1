pub mod groq;
pub mod ollama;
mod transport;

use serde::Serialize;

use crate::model::Message;

/// `{role, content}` pair; both supported APIs use this shape.
#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

fn wire_messages(messages: &[Message]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|msg| WireMessage {
            role: msg.role.as_str(),
            content: &msg.content,
        })
        .collect()
}

fn endpoint_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path)
}
