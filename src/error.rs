use thiserror::Error;

/// Any failure of a single model call. Never retried and never charged
/// against the session quota.
#[derive(Error, Debug)]
pub enum InvocationError {
    #[error("No API key provided. Enter a Groq API key or set GROQ_API_KEY.")]
    MissingCredential,

    #[error(
        "Model request timed out after {timeout_secs}s while calling '{api_url}'. \
         Increase MODEL_TIMEOUT_SECS or check model responsiveness."
    )]
    Timeout { api_url: String, timeout_secs: u64 },

    #[error(
        "Connection refused by model API at '{api_url}'. \
         Ensure the model provider is running and MODEL_BASE_URL is correct."
    )]
    ConnectionRefused { api_url: String },

    #[error(
        "Failed to connect to model API at '{api_url}'. \
         Check MODEL_BASE_URL and network connectivity."
    )]
    Connect { api_url: String },

    #[error("Failed to call model API at '{api_url}': {message}")]
    Request { api_url: String, message: String },

    #[error("Model request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse model chat response: {0}")]
    Parse(String),

    #[error("Model returned an empty response")]
    EmptyResponse,
}
