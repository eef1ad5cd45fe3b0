//! Backends that talk to the Gemini `generateContent` endpoint.
//!
//! Each backend keeps its own chat session as a bounded history of wire
//! [`Content`] entries and sends it along with every new turn. A turn is only
//! recorded in the session once the remote has answered it.

mod structured;

pub use structured::{StructuredGeminiBackend, StructuredReply, SYSTEM_INSTRUCTION};

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::api::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, ThinkingConfig,
    UsageMetadata,
};
use crate::core::backend::{BackendError, ResponseBackend, SegmentStream};
use crate::core::config::settings::{GeminiSettings, ThinkingLevel, ENV_GEMINI_API_KEY};
use crate::core::history::ConversationHistory;
use crate::core::message::{Message, MessageMetadata, TITLE_ANSWER};
use crate::core::segment::ResponseSegment;
use crate::utils::url::construct_api_url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Sends one `generateContent` request.
#[async_trait]
pub trait GenerateContent: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, BackendError>;
}

/// HTTPS transport authenticated with an API key header.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn from_settings(settings: &GeminiSettings) -> Result<Self, BackendError> {
        let api_key = settings
            .api_key
            .as_deref()
            .ok_or(BackendError::MissingCredential {
                variable: ENV_GEMINI_API_KEY,
            })?;
        Self::new(&settings.base_url, api_key)
    }
}

#[async_trait]
impl GenerateContent for HttpTransport {
    async fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, BackendError> {
        let url = construct_api_url(&self.base_url, &format!("models/{model}:generateContent"));
        debug!(%url, turns = request.contents.len(), "sending generateContent request");

        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                summary: summarize_error_body(&body),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}

fn extract_error_summary(value: &serde_json::Value) -> Option<String> {
    let summary = value
        .pointer("/error/message")
        .and_then(|v| v.as_str())
        .map(str::to_owned)
        .or_else(|| {
            value.get("error").and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.to_string()),
                _ => None,
            })
        })
        .or_else(|| {
            value
                .get("message")
                .and_then(|v| v.as_str().map(str::to_owned))
        });

    summary.map(|text| text.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// One-line description of an error response body.
pub fn summarize_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    serde_json::from_str::<serde_json::Value>(trimmed)
        .ok()
        .as_ref()
        .and_then(extract_error_summary)
        .filter(|summary| !summary.is_empty())
        .unwrap_or_else(|| trimmed.split_whitespace().collect::<Vec<_>>().join(" "))
}

/// Reply text and usage line of the first candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateReply {
    pub text: String,
    pub log: String,
}

impl CandidateReply {
    pub fn from_response(response: &GenerateContentResponse) -> Result<Self, BackendError> {
        let candidate = response
            .candidates
            .first()
            .ok_or(BackendError::EmptyResponse)?;
        let text = candidate
            .content
            .as_ref()
            .map(Content::reply_text)
            .unwrap_or_default();
        if text.trim().is_empty() {
            return Err(BackendError::EmptyResponse);
        }

        let finish_reason = candidate
            .finish_reason
            .as_deref()
            .map(capitalize)
            .unwrap_or_else(|| "Unknown".to_string());
        let log = format_usage_log(
            response.model_version.as_deref().unwrap_or("unknown"),
            &finish_reason,
            response.usage_metadata.as_ref(),
        );
        Ok(Self { text, log })
    }
}

/// `STOP` becomes `Stop`, `MAX_TOKENS` becomes `Max_tokens`.
fn capitalize(raw: &str) -> String {
    let lower = raw.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Compact usage line shown under a reply.
pub fn format_usage_log(
    model_version: &str,
    finish_reason: &str,
    usage: Option<&UsageMetadata>,
) -> String {
    let mut parts = vec![
        format!("Model: {model_version}"),
        format!("Finish: {finish_reason}"),
    ];

    if let Some(usage) = usage {
        let count = |value: Option<u64>| value.unwrap_or(0);
        let mut tokens = vec![
            format!("Prompt: {}", count(usage.prompt_token_count)),
            format!("Response: {}", count(usage.candidates_token_count)),
        ];
        if let Some(thoughts) = usage.thoughts_token_count.filter(|n| *n > 0) {
            tokens.push(format!("Thoughts: {thoughts}"));
        }
        tokens.push(format!("Total: {}", count(usage.total_token_count)));
        parts.push(tokens.join(" | "));
    }

    parts.join(" | ")
}

pub(crate) fn thinking_config(level: ThinkingLevel) -> GenerationConfig {
    GenerationConfig {
        thinking_config: Some(ThinkingConfig {
            thinking_level: level,
        }),
        ..Default::default()
    }
}

/// Plain-text chat with a remote model.
///
/// The supplied conversation context is ignored; the backend replays its own
/// session instead.
pub struct GeminiBackend {
    transport: Box<dyn GenerateContent>,
    model: String,
    thinking_level: ThinkingLevel,
    session: ConversationHistory<Content>,
}

impl GeminiBackend {
    pub fn new<T>(transport: T, model: &str, thinking_level: ThinkingLevel, session_rounds: i64) -> Self
    where
        T: GenerateContent + 'static,
    {
        Self {
            transport: Box::new(transport),
            model: model.to_string(),
            thinking_level,
            session: ConversationHistory::new(session_rounds, 2),
        }
    }

    pub fn from_settings(settings: &GeminiSettings, session_rounds: i64) -> Result<Self, BackendError> {
        let transport = HttpTransport::from_settings(settings)?;
        Ok(Self::new(
            transport,
            &settings.model,
            settings.bare_thinking_level,
            session_rounds,
        ))
    }

    pub fn session_len(&self) -> usize {
        self.session.size()
    }

    async fn exchange(&self, message: &str) -> Result<ResponseSegment, BackendError> {
        let user_turn = Content::user(message);
        let mut contents = self.session.get_all_messages();
        contents.push(user_turn.clone());

        let request = GenerateContentRequest {
            contents,
            system_instruction: None,
            generation_config: Some(thinking_config(self.thinking_level)),
        };
        let response = self.transport.generate(&self.model, &request).await?;
        let reply = CandidateReply::from_response(&response)?;

        self.session
            .add_messages([user_turn, Content::model(reply.text.clone())]);
        Ok(ResponseSegment::plain(reply.text)
            .with_metadata(Some(MessageMetadata::titled(TITLE_ANSWER).with_log(reply.log))))
    }
}

impl ResponseBackend for GeminiBackend {
    fn respond<'a>(
        &'a mut self,
        message: &'a str,
        _context: Option<&'a [Message]>,
        _actor_label: &'a str,
    ) -> SegmentStream<'a> {
        stream::once(async move {
            self.exchange(message).await.unwrap_or_else(|err| {
                warn!(backend = "gemini", error = %err, "request failed");
                err.into_segment()
            })
        })
        .boxed()
    }

    fn reset(&mut self) {
        self.session.clear();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FakeTransport;
    use super::*;
    use crate::core::message::{TITLE_API_ERROR, TITLE_NO_CANDIDATES};

    async fn respond_once(backend: &mut GeminiBackend, message: &str) -> Vec<ResponseSegment> {
        backend.respond(message, None, "Phoenix").collect().await
    }

    #[tokio::test]
    async fn reply_carries_usage_log_and_extends_session() {
        let transport = FakeTransport::default();
        transport.push_text("Hi!");
        transport.push_text("Again!");
        let mut backend = GeminiBackend::new(transport.clone(), "m", ThinkingLevel::Low, 10);

        let first = respond_once(&mut backend, "hello").await;
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].content, "Hi!");
        let metadata = first[0].metadata.clone().expect("metadata");
        assert_eq!(metadata.title.as_deref(), Some(TITLE_ANSWER));
        assert_eq!(
            metadata.log.as_deref(),
            Some("Model: gemini-test | Finish: Stop | Prompt: 3 | Response: 5 | Thoughts: 2 | Total: 10")
        );

        respond_once(&mut backend, "more").await;
        let requests = transport.requests();
        assert_eq!(requests[0].contents.len(), 1);
        assert_eq!(
            requests[1].contents,
            vec![Content::user("hello"), Content::model("Hi!"), Content::user("more")]
        );
        assert_eq!(backend.session_len(), 4);
    }

    #[tokio::test]
    async fn failures_become_single_error_segment_and_skip_session() {
        let transport = FakeTransport::default();
        transport.push(Err(BackendError::Status {
            status: 400,
            summary: "API key not valid".to_string(),
        }));
        let mut backend = GeminiBackend::new(transport.clone(), "m", ThinkingLevel::Minimal, 10);

        let segments = respond_once(&mut backend, "hello").await;
        assert_eq!(segments.len(), 1);
        assert!(segments[0].is_error());
        assert_eq!(segments[0].content, "API Error: API key not valid");
        assert_eq!(
            segments[0].metadata.as_ref().and_then(|m| m.title.as_deref()),
            Some(TITLE_API_ERROR)
        );
        assert_eq!(backend.session_len(), 0);

        // The fake runs dry and reports no candidates.
        let segments = respond_once(&mut backend, "again").await;
        assert_eq!(
            segments[0].metadata.as_ref().and_then(|m| m.title.as_deref()),
            Some(TITLE_NO_CANDIDATES)
        );
    }

    #[tokio::test]
    async fn reset_starts_a_new_session() {
        let transport = FakeTransport::default();
        transport.push_text("one");
        transport.push_text("two");
        let mut backend = GeminiBackend::new(transport.clone(), "m", ThinkingLevel::Minimal, 10);

        respond_once(&mut backend, "first").await;
        backend.reset();
        respond_once(&mut backend, "second").await;

        assert_eq!(transport.requests()[1].contents, vec![Content::user("second")]);
    }

    #[test]
    fn usage_log_omits_thoughts_when_absent() {
        let usage = UsageMetadata {
            prompt_token_count: Some(1),
            candidates_token_count: Some(2),
            thoughts_token_count: None,
            total_token_count: Some(3),
        };
        assert_eq!(
            format_usage_log("v1", "Max_tokens", Some(&usage)),
            "Model: v1 | Finish: Max_tokens | Prompt: 1 | Response: 2 | Total: 3"
        );
        assert_eq!(format_usage_log("v1", "Stop", None), "Model: v1 | Finish: Stop");
        assert_eq!(capitalize("MAX_TOKENS"), "Max_tokens");
    }

    #[test]
    fn error_bodies_are_summarized() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid.\n Please pass a valid key."}}"#;
        assert_eq!(
            summarize_error_body(body),
            "API key not valid. Please pass a valid key."
        );
        assert_eq!(summarize_error_body("  upstream\n timeout "), "upstream timeout");
        assert_eq!(summarize_error_body(""), "<empty>");
    }

    #[test]
    fn missing_api_key_is_a_configuration_error() {
        let settings = GeminiSettings {
            api_key: None,
            model: "m".to_string(),
            base_url: "https://example.invalid".to_string(),
            bare_thinking_level: ThinkingLevel::Minimal,
            pretty_thinking_level: ThinkingLevel::Minimal,
            pretty_history_rounds: 10,
        };
        assert!(matches!(
            GeminiBackend::from_settings(&settings, 10),
            Err(BackendError::MissingCredential { .. })
        ));
    }
}
