use reqwest::Client;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::Config;
use crate::error::InvocationError;
use crate::model::{self, Message, SamplingParams};

pub struct ModelGatewayRequest {
    pub question: String,
    /// Credential typed into the form; blank values fall back to the configured key.
    pub api_key: Option<String>,
    pub params: SamplingParams,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelGatewayResponse {
    pub content: String,
}

pub type ModelGatewayFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ModelGatewayResponse, InvocationError>> + Send + 'a>>;

/// One question in, one answer (or failure) out. No retries.
pub trait ModelGateway: Send + Sync {
    fn chat<'a>(&'a self, request: ModelGatewayRequest) -> ModelGatewayFuture<'a>;
}

type ModelChatFuture<'a> = Pin<Box<dyn Future<Output = Result<String, InvocationError>> + Send + 'a>>;

trait ChatBackend: Send + Sync {
    fn chat<'a>(
        &'a self,
        client: &'a Client,
        cfg: &'a Config,
        api_key: Option<&'a str>,
        params: &'a SamplingParams,
        messages: &'a [Message],
    ) -> ModelChatFuture<'a>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProviderChatBackend;

impl ChatBackend for ProviderChatBackend {
    fn chat<'a>(
        &'a self,
        client: &'a Client,
        cfg: &'a Config,
        api_key: Option<&'a str>,
        params: &'a SamplingParams,
        messages: &'a [Message],
    ) -> ModelChatFuture<'a> {
        Box::pin(async move { model::chat(client, cfg, api_key, params, messages).await })
    }
}

pub struct HostModelGateway<B = ProviderChatBackend> {
    client: Client,
    cfg: Arc<Config>,
    backend: B,
}

impl HostModelGateway<ProviderChatBackend> {
    pub fn new(client: Client, cfg: Arc<Config>) -> Self {
        Self {
            client,
            cfg,
            backend: ProviderChatBackend,
        }
    }
}

impl<B> HostModelGateway<B> {
    #[cfg(test)]
    fn with_backend(client: Client, cfg: Arc<Config>, backend: B) -> Self {
        Self {
            client,
            cfg,
            backend,
        }
    }

    fn resolve_api_key<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        requested
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .or(self.cfg.default_api_key.as_deref())
    }
}

impl<B> ModelGateway for HostModelGateway<B>
where
    B: ChatBackend,
{
    fn chat<'a>(&'a self, request: ModelGatewayRequest) -> ModelGatewayFuture<'a> {
        Box::pin(async move {
            let messages = model::build_messages(&self.cfg.system_prompt, &request.question);
            let api_key = self.resolve_api_key(request.api_key.as_deref());
            let content = self
                .backend
                .chat(&self.client, &self.cfg, api_key, &request.params, &messages)
                .await?;
            Ok(ModelGatewayResponse { content })
        })
    }
}
