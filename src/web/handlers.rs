use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::FormRejection;
use axum::extract::{Form, State};
use axum::http::header::{CONTENT_TYPE, COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::InvocationError;
use crate::model::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE, SamplingParams};
use crate::model_gateway::ModelGatewayRequest;
use crate::rate_limit::format_retry_after;
use crate::session::{Rejection, SESSION_COOKIE};
use crate::web::AppState;
use crate::web::page::{Notice, PageView, render};

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

#[derive(Debug, Deserialize)]
pub struct AskForm {
    #[serde(default)]
    api_key: String,
    #[serde(default)]
    model: String,
    #[serde(default = "default_temperature")]
    temperature: f32,
    #[serde(default = "default_max_tokens")]
    max_tokens: u32,
    #[serde(default)]
    question: String,
}

enum Outcome {
    EmptyQuestion,
    UnknownModel(String),
    QuotaExceeded { retry_after: TimeDelta },
    Busy,
    Answer(String),
    Failed(InvocationError),
}

impl Outcome {
    fn status(&self) -> StatusCode {
        match self {
            Self::EmptyQuestion | Self::Answer(_) => StatusCode::OK,
            Self::UnknownModel(_) => StatusCode::BAD_REQUEST,
            Self::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Busy => StatusCode::CONFLICT,
            Self::Failed(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn notice(&self, limit: u32) -> Notice {
        match self {
            Self::EmptyQuestion => Notice::info("Please enter a question"),
            Self::UnknownModel(model) => Notice::error(format!("Error: unknown model '{model}'")),
            Self::QuotaExceeded { retry_after } => Notice::error(format!(
                "Daily limit of {limit} queries reached. Try again in {}.",
                format_retry_after(*retry_after)
            )),
            Self::Busy => Notice::error(
                "Error: your previous question is still being answered. Please wait.",
            ),
            Self::Answer(text) => Notice::answer(text),
            Self::Failed(err) => Notice::error(format!("Error: {err}")),
        }
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
}

fn session_cookie_header(id: Uuid) -> Option<HeaderValue> {
    HeaderValue::from_str(&format!(
        "{SESSION_COOKIE}={id}; Path=/; HttpOnly; SameSite=Lax"
    ))
    .ok()
}

fn page_response(
    state: &AppState,
    status: StatusCode,
    session_id: Uuid,
    new_session: bool,
    view: &PageView,
) -> Response {
    let mut response = match render(&state.templates, view) {
        Ok(html) => (status, Html(html)).into_response(),
        Err(err) => {
            error!(error = %err, "failed to render page");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(CONTENT_TYPE, "text/plain; charset=utf-8")],
                "failed to render page",
            )
                .into_response();
        }
    };

    if new_session && let Some(cookie) = session_cookie_header(session_id) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    response
}

pub async fn index(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let now = Utc::now();
    let (session_id, created) = state.sessions.resolve(session_cookie(&headers), now);
    let view = blank_view(&state, session_id, now);
    page_response(&state, StatusCode::OK, session_id, created, &view)
}

fn blank_view(state: &AppState, session_id: Uuid, now: DateTime<Utc>) -> PageView {
    PageView::new(
        &state.cfg.model_choices,
        state.cfg.default_model(),
        DEFAULT_TEMPERATURE,
        DEFAULT_MAX_TOKENS,
        state.sessions.remaining(session_id, now),
        state.sessions.policy().limit.get(),
    )
}

pub async fn ask(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    form: Result<Form<AskForm>, FormRejection>,
) -> Response {
    let now = Utc::now();
    let (session_id, created) = state.sessions.resolve(session_cookie(&headers), now);
    let limit = state.sessions.policy().limit.get();

    // Malformed submissions get the form back instead of a bare rejection.
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            warn!(
                session_id = %session_id,
                error = %rejection.body_text(),
                "rejected malformed form"
            );
            let mut view = blank_view(&state, session_id, now);
            view.notice = Some(Notice::error(
                "Error: invalid form submission. Please check the settings and try again.",
            ));
            return page_response(&state, rejection.status(), session_id, created, &view);
        }
    };
    let params = SamplingParams::new(form.model.trim(), form.temperature, form.max_tokens);
    let question = form.question.trim();

    let outcome = if question.is_empty() {
        Outcome::EmptyQuestion
    } else if !state.cfg.is_known_model(&params.model) {
        warn!(session_id = %session_id, model = %params.model, "rejected unknown model");
        Outcome::UnknownModel(params.model.clone())
    } else {
        match state.sessions.begin(session_id, now) {
            Err(Rejection::QuotaExceeded { retry_after }) => {
                info!(
                    session_id = %session_id,
                    retry_after_secs = retry_after.num_seconds(),
                    "query rejected by session quota"
                );
                Outcome::QuotaExceeded { retry_after }
            }
            Err(Rejection::Busy) => {
                info!(session_id = %session_id, "query rejected while another is in flight");
                Outcome::Busy
            }
            Ok(in_flight) => {
                let span = info_span!(
                    "ask",
                    session_id = %session_id,
                    model = %params.model,
                    tracing_project = state.cfg.observability.project.as_deref().unwrap_or("")
                );
                let request = ModelGatewayRequest {
                    question: question.to_string(),
                    api_key: Some(form.api_key.clone()),
                    params: params.clone(),
                };

                match state.gateway.chat(request).instrument(span).await {
                    Ok(response) => {
                        in_flight.succeed(Utc::now());
                        info!(
                            session_id = %session_id,
                            response_len = response.content.len(),
                            "question answered"
                        );
                        Outcome::Answer(response.content)
                    }
                    Err(err) => {
                        in_flight.fail();
                        warn!(session_id = %session_id, error = %err, "model invocation failed");
                        Outcome::Failed(err)
                    }
                }
            }
        }
    };

    let selected = if state.cfg.is_known_model(&params.model) {
        params.model.as_str()
    } else {
        state.cfg.default_model()
    };
    let mut view = PageView::new(
        &state.cfg.model_choices,
        selected,
        params.temperature,
        params.max_tokens,
        state.sessions.remaining(session_id, Utc::now()),
        limit,
    );
    if !matches!(outcome, Outcome::Answer(_)) {
        view.question = question.to_string();
    }
    view.notice = Some(outcome.notice(limit));

    page_response(&state, outcome.status(), session_id, created, &view)
}

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339()
    }))
}
