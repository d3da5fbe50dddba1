use std::env;
use std::net::SocketAddr;
use std::num::NonZeroU32;

use chrono::TimeDelta;

use crate::rate_limit::{
    DEFAULT_QUOTA_LIMIT, DEFAULT_QUOTA_WINDOW_SECS, MAX_QUOTA_WINDOW_SECS, QuotaPolicy,
};

const DEFAULT_MODEL_PROVIDER: &str = "groq";
const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL_CHOICES: &[&str] = &["groq/compound-mini", "groq/compound"];
const DEFAULT_SYSTEM_PROMPT: &str = "You are helpful assistant , please respond to the user queries in a concise and helpful manner.";
const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8501";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelProvider {
    Groq,
    Ollama,
}

impl ModelProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Groq => "groq",
            Self::Ollama => "ollama",
        }
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::Groq)
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Groq => DEFAULT_GROQ_BASE_URL,
            Self::Ollama => DEFAULT_OLLAMA_BASE_URL,
        }
    }
}

/// Identifiers handed to the external tracing service, if configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub api_key: Option<String>,
    pub project: Option<String>,
}

impl ObservabilityConfig {
    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub model_provider: ModelProvider,
    pub model_base_url: String,
    pub default_api_key: Option<String>,
    pub model_choices: Vec<String>,
    pub system_prompt: String,
    pub model_timeout_secs: u64,
    pub quota: QuotaPolicy,
    /// Raw `BIND_ADDR`; parsed at startup so a bad value aborts with context.
    pub bind_addr: String,
    pub observability: ObservabilityConfig,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    pub fn from_env_with(mut get_var: impl FnMut(&str) -> Option<String>) -> Self {
        let model_provider = parse_model_provider(get_var("MODEL_PROVIDER").as_deref());
        let model_base_url = non_blank(get_var("MODEL_BASE_URL"))
            .unwrap_or_else(|| model_provider.default_base_url().to_string());
        let quota = QuotaPolicy::new(
            parse_quota_limit(get_var("QUOTA_LIMIT").as_deref()),
            parse_quota_window(get_var("QUOTA_WINDOW_SECS").as_deref()),
        );

        Self {
            model_provider,
            model_base_url,
            default_api_key: non_blank(get_var("GROQ_API_KEY")),
            model_choices: parse_model_choices(get_var("MODEL_CHOICES").as_deref()),
            system_prompt: get_var("SYSTEM_PROMPT")
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            model_timeout_secs: parse_model_timeout_secs(
                get_var("MODEL_TIMEOUT_SECS").as_deref(),
            ),
            quota,
            bind_addr: non_blank(get_var("BIND_ADDR"))
                .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
            observability: ObservabilityConfig {
                api_key: non_blank(get_var("LANGCHAIN_API_KEY")),
                project: non_blank(get_var("LANGCHAIN_PROJECT")),
            },
        }
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind_addr.trim().parse()
    }

    pub fn default_model(&self) -> &str {
        self.model_choices
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_MODEL_CHOICES[0])
    }

    pub fn is_known_model(&self, model: &str) -> bool {
        self.model_choices.iter().any(|choice| choice == model)
    }
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_positive_u64(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn parse_model_timeout_secs(raw: Option<&str>) -> u64 {
    parse_positive_u64(raw, DEFAULT_MODEL_TIMEOUT_SECS)
}

fn parse_model_provider(raw: Option<&str>) -> ModelProvider {
    match raw
        .unwrap_or(DEFAULT_MODEL_PROVIDER)
        .trim()
        .to_ascii_lowercase()
        .as_str()
    {
        "ollama" => ModelProvider::Ollama,
        _ => ModelProvider::Groq,
    }
}

fn parse_model_choices(raw: Option<&str>) -> Vec<String> {
    let choices: Vec<String> = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|choice| !choice.is_empty())
        .map(str::to_string)
        .collect();

    if choices.is_empty() {
        DEFAULT_MODEL_CHOICES
            .iter()
            .map(|choice| (*choice).to_string())
            .collect()
    } else {
        choices
    }
}

fn parse_quota_limit(raw: Option<&str>) -> NonZeroU32 {
    raw.and_then(|value| value.trim().parse::<NonZeroU32>().ok())
        .or_else(|| NonZeroU32::new(DEFAULT_QUOTA_LIMIT))
        .unwrap_or(NonZeroU32::MIN)
}

fn parse_quota_window(raw: Option<&str>) -> TimeDelta {
    let secs = parse_positive_u64(raw, DEFAULT_QUOTA_WINDOW_SECS);
    Some(secs)
        .filter(|secs| *secs <= MAX_QUOTA_WINDOW_SECS)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(TimeDelta::try_seconds)
        .unwrap_or_else(|| TimeDelta::seconds(DEFAULT_QUOTA_WINDOW_SECS as i64))
}
