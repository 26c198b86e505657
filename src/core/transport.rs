//! Non-streaming chat-completions client.
//!
//! [`Transport`] wraps a shared `reqwest::Client` and turns every failure
//! into a [`TransportError`] variant so the coordinator can render a precise
//! transcript entry. Calls never retry on their own.

use std::error::Error as StdError;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::api::models::fetch_models;
use crate::api::{ChatMessage, ChatRequest, ChatResponse, ModelsResponse};
use crate::core::message::ROLE_SYSTEM;
use crate::utils::url::{construct_api_url, normalize_base_url};

const CHAT_COMPLETIONS_ENDPOINT: &str = "v1/chat/completions";
const BODY_SNIPPET_CHARS: usize = 200;

/// Failure modes of a single transport call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Invalid server URL \"{0}\"")]
    BadUrl(String),

    #[error("Cannot reach the server: {0}")]
    Unreachable(String),

    #[error("The request timed out. The server may be busy or the model too slow.")]
    Timeout,

    #[error("Server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("The server returned no choices. The model may still be loading.")]
    EmptyChoices,

    #[error("Could not decode the server response ({detail}): {snippet}")]
    Decode { detail: String, snippet: String },

    #[error("The server is reachable but no model is loaded.")]
    NoModelLoaded,

    #[error("Request cancelled")]
    Cancelled,
}

/// Machine-readable classification of a [`TransportError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    BadUrl,
    Unreachable,
    Timeout,
    Http,
    EmptyChoices,
    Decode,
    NoModelLoaded,
    Cancelled,
}

impl TransportError {
    pub fn kind(&self) -> TransportErrorKind {
        match self {
            TransportError::BadUrl(_) => TransportErrorKind::BadUrl,
            TransportError::Unreachable(_) => TransportErrorKind::Unreachable,
            TransportError::Timeout => TransportErrorKind::Timeout,
            TransportError::Http { .. } => TransportErrorKind::Http,
            TransportError::EmptyChoices => TransportErrorKind::EmptyChoices,
            TransportError::Decode { .. } => TransportErrorKind::Decode,
            TransportError::NoModelLoaded => TransportErrorKind::NoModelLoaded,
            TransportError::Cancelled => TransportErrorKind::Cancelled,
        }
    }

    /// Cooperative cancellation is expected and never shown to the user.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, TransportError::Cancelled)
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return TransportError::Timeout;
        }
        if err.is_builder() {
            let url = err.url().map(|url| url.to_string()).unwrap_or_default();
            return TransportError::BadUrl(url);
        }
        if err.is_decode() {
            return TransportError::Decode {
                detail: error_chain(&err),
                snippet: String::new(),
            };
        }
        TransportError::Unreachable(error_chain(&err))
    }
}

/// Flatten an error and its sources into one line of diagnostics.
fn error_chain(err: &dyn StdError) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(inner) = source {
        let text = inner.to_string();
        if !parts.iter().any(|part| part == &text) {
            parts.push(text);
        }
        source = inner.source();
    }
    parts.join(": ")
}

pub(crate) fn body_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    let mut snippet: String = trimmed.chars().take(BODY_SNIPPET_CHARS).collect();
    if trimmed.chars().count() > BODY_SNIPPET_CHARS {
        snippet.push('…');
    }
    snippet
}

/// Resolve and validate an endpoint URL against the configured base.
pub(crate) fn endpoint_url(base_url: &str, endpoint: &str) -> Result<String, TransportError> {
    let normalized = normalize_base_url(base_url);
    let parsed = reqwest::Url::parse(&normalized)
        .map_err(|_| TransportError::BadUrl(base_url.trim().to_string()))?;
    let scheme_ok = matches!(parsed.scheme(), "http" | "https");
    if !scheme_ok || parsed.host_str().map_or(true, str::is_empty) {
        return Err(TransportError::BadUrl(base_url.trim().to_string()));
    }
    Ok(construct_api_url(&normalized, endpoint))
}

/// Build the outbound message list.
///
/// The system prompt is injected as the first message unless the transcript
/// already carries a system-role message. An empty prompt is never injected.
pub fn build_payload_messages(messages: &[ChatMessage], system_prompt: &str) -> Vec<ChatMessage> {
    let has_system = messages.iter().any(|message| message.role == ROLE_SYSTEM);
    let mut payload = Vec::with_capacity(messages.len() + 1);
    if !has_system && !system_prompt.trim().is_empty() {
        payload.push(ChatMessage::new(ROLE_SYSTEM, system_prompt));
    }
    payload.extend(messages.iter().cloned());
    payload
}

/// Per-call tuning for outbound requests.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub chat_timeout: Duration,
    pub title_timeout: Duration,
    pub models_timeout: Duration,
    pub temperature: f32,
    pub max_tokens: Option<i32>,
    pub title_temperature: f32,
    pub title_max_tokens: i32,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            chat_timeout: Duration::from_secs(600),
            title_timeout: Duration::from_secs(20),
            models_timeout: Duration::from_secs(10),
            temperature: 0.7,
            max_tokens: None,
            title_temperature: 0.2,
            title_max_tokens: 32,
        }
    }
}

/// The server-facing half of the coordinator.
///
/// Implemented by [`Transport`]; tests substitute scripted backends.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Everything `GET /v1/models` reports.
    async fn list_models(&self) -> Result<ModelsResponse, TransportError>;

    /// The id of the model the server reports as loaded, if any.
    async fn loaded_model(&self) -> Result<Option<String>, TransportError> {
        let models = self.list_models().await?;
        Ok(models.loaded_model().map(str::to_string))
    }

    /// Full chat reply using the long timeout budget.
    async fn send_chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        system_prompt: &str,
    ) -> Result<String, TransportError>;

    /// Short-budget completion used for title generation.
    async fn send_title(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        system_prompt: &str,
    ) -> Result<String, TransportError>;
}

#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
    base_url: String,
    options: TransportOptions,
}

impl Transport {
    pub fn new(base_url: impl Into<String>, options: TransportOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            options,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    async fn complete(
        &self,
        request: ChatRequest,
        timeout: Duration,
    ) -> Result<String, TransportError> {
        let url = endpoint_url(&self.base_url, CHAT_COMPLETIONS_ENDPOINT)?;
        debug!(
            url = %url,
            model = %request.model,
            messages = request.messages.len(),
            timeout_secs = timeout.as_secs(),
            "Sending chat completion request"
        );

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .timeout(timeout)
            .json(&request)
            .send()
            .await
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(TransportError::from_reqwest)?;

        if !status.is_success() {
            return Err(TransportError::Http {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }

        parse_chat_response(&body)
    }
}

pub(crate) fn parse_chat_response(body: &str) -> Result<String, TransportError> {
    let decoded: ChatResponse =
        serde_json::from_str(body).map_err(|err| TransportError::Decode {
            detail: err.to_string(),
            snippet: body_snippet(body),
        })?;

    if let Some(usage) = &decoded.usage {
        debug!(
            prompt_tokens = ?usage.prompt_tokens,
            completion_tokens = ?usage.completion_tokens,
            total_tokens = ?usage.total_tokens,
            "Chat completion usage"
        );
    }

    let choice = decoded
        .choices
        .into_iter()
        .next()
        .ok_or(TransportError::EmptyChoices)?;
    debug!(finish_reason = ?choice.finish_reason, "Chat completion received");
    choice.message.content.ok_or_else(|| TransportError::Decode {
        detail: "first choice has no message content".to_string(),
        snippet: body_snippet(body),
    })
}

#[async_trait]
impl ChatBackend for Transport {
    async fn list_models(&self) -> Result<ModelsResponse, TransportError> {
        fetch_models(&self.client, &self.base_url, self.options.models_timeout).await
    }

    async fn send_chat(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        system_prompt: &str,
    ) -> Result<String, TransportError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: build_payload_messages(&messages, system_prompt),
            temperature: self.options.temperature,
            max_tokens: self.options.max_tokens,
            stream: false,
        };
        self.complete(request, self.options.chat_timeout).await
    }

    async fn send_title(
        &self,
        messages: Vec<ChatMessage>,
        model: &str,
        system_prompt: &str,
    ) -> Result<String, TransportError> {
        let request = ChatRequest {
            model: model.to_string(),
            messages: build_payload_messages(&messages, system_prompt),
            temperature: self.options.title_temperature,
            max_tokens: Some(self.options.title_max_tokens),
            stream: false,
        };
        self.complete(request, self.options.title_timeout).await
    }
}
