use minijinja::Environment;
use serde::Serialize;

use crate::model::{MAX_TOKENS_MAX, MAX_TOKENS_MIN, TEMPERATURE_MAX, TEMPERATURE_MIN};

pub const PAGE_TEMPLATE_NAME: &str = "index.html";

const PAGE_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
  <meta charset="utf-8">
  <title>{{ title }}</title>
  <style>
    body { font-family: sans-serif; max-width: 56rem; margin: 2rem auto; padding: 0 1rem; }
    .settings { display: grid; grid-template-columns: repeat(4, 1fr); gap: 1rem; }
    .notice { padding: .75rem 1rem; border-radius: .25rem; margin-top: 1rem; white-space: pre-wrap; }
    .answer { background: #eef6ee; }
    .error { background: #fbeaea; color: #8a1f1f; }
    .info { background: #f1f1f1; }
    .quota { color: #555; }
  </style>
</head>
<body>
  <h1>{{ title }}</h1>
  <form method="post" action="/ask">
    <h2>Settings</h2>
    <div class="settings">
      <label>Enter your Groq API Key
        <input type="password" name="api_key" autocomplete="off">
      </label>
      <label>Select LLM model
        <select name="model">
          {% for model in models %}<option value="{{ model.name }}"{% if model.selected %} selected{% endif %}>{{ model.name }}</option>{% endfor %}
        </select>
      </label>
      <label>Temperature
        <input type="range" name="temperature" min="{{ temperature_min }}" max="{{ temperature_max }}" step="0.01" value="{{ temperature }}">
      </label>
      <label>Max Tokens
        <input type="range" name="max_tokens" min="{{ max_tokens_min }}" max="{{ max_tokens_max }}" step="1" value="{{ max_tokens }}">
      </label>
    </div>
    <hr>
    <p>Please ask any question</p>
    <label>Enter your question
      <input type="text" name="question" value="{{ question }}" size="60">
    </label>
    <button type="submit">Ask</button>
  </form>
  <p class="quota">{{ remaining }}/{{ limit }} queries remaining today</p>
  {% if notice %}<div class="notice {{ notice.kind }}">{{ notice.text }}</div>{% endif %}
</body>
</html>
"#;

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ModelOption {
    pub name: String,
    pub selected: bool,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeKind {
    Answer,
    Error,
    Info,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn answer(text: &str) -> Self {
        Self {
            kind: NoticeKind::Answer,
            text: format!("Assistant: {}", text.trim()),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Error,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Info,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PageView {
    pub title: &'static str,
    pub models: Vec<ModelOption>,
    /// Pre-formatted so the slider does not echo `0.699999988`.
    pub temperature: String,
    pub temperature_min: f32,
    pub temperature_max: f32,
    pub max_tokens: u32,
    pub max_tokens_min: u32,
    pub max_tokens_max: u32,
    pub question: String,
    pub remaining: u32,
    pub limit: u32,
    pub notice: Option<Notice>,
}

impl PageView {
    pub fn new(
        choices: &[String],
        selected: &str,
        temperature: f32,
        max_tokens: u32,
        remaining: u32,
        limit: u32,
    ) -> Self {
        Self {
            title: "Demo Q&A Chatbot",
            models: choices
                .iter()
                .map(|name| ModelOption {
                    name: name.clone(),
                    selected: name == selected,
                })
                .collect(),
            temperature: format!("{temperature:.2}"),
            temperature_min: TEMPERATURE_MIN,
            temperature_max: TEMPERATURE_MAX,
            max_tokens,
            max_tokens_min: MAX_TOKENS_MIN,
            max_tokens_max: MAX_TOKENS_MAX,
            question: String::new(),
            remaining,
            limit,
            notice: None,
        }
    }
}

pub fn templates() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    env.add_template(PAGE_TEMPLATE_NAME, PAGE_TEMPLATE)?;
    Ok(env)
}

pub fn render(env: &Environment<'_>, view: &PageView) -> Result<String, minijinja::Error> {
    env.get_template(PAGE_TEMPLATE_NAME)?.render(view)
}

#[cfg(test)]
mod tests {
    use super::{Notice, PageView, render, templates};

    fn view() -> PageView {
        let choices = vec!["groq/compound-mini".to_string(), "groq/compound".to_string()];
        PageView::new(&choices, "groq/compound", 0.7, 100, 49, 50)
    }

    #[test]
    fn renders_form_controls_and_quota() {
        let env = templates().expect("template should compile");
        let html = render(&env, &view()).expect("page should render");

        assert!(html.contains(r#"type="password" name="api_key""#));
        // minijinja escapes `/` inside values; browsers decode it back.
        assert!(html.contains(r#"compound" selected>"#));
        assert!(html.contains(r#"compound-mini">"#));
        assert_eq!(html.matches(" selected>").count(), 1);
        assert!(html.contains(r#"value="0.70""#));
        assert!(html.contains("49/50 queries remaining today"));
        assert!(!html.contains(r#"class="notice"#));
    }

    #[test]
    fn escapes_user_controlled_text() {
        let env = templates().expect("template should compile");
        let mut view = view();
        view.question = r#""><script>alert(1)</script>"#.to_string();
        view.notice = Some(Notice::answer("<b>bold</b>"));

        let html = render(&env, &view).expect("page should render");
        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;b&gt;bold&lt;&#x2f;b&gt;") || html.contains("&lt;b&gt;bold&lt;/b&gt;"));
        assert!(html.contains(r#"class="notice answer""#));
    }

    #[test]
    fn answer_notice_carries_assistant_label() {
        assert_eq!(Notice::answer("  hi \n").text, "Assistant: hi");
    }
}
