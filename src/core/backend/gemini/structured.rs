use futures_util::stream::{self, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use super::{thinking_config, CandidateReply, GenerateContent, HttpTransport};
use crate::api::{Content, GenerateContentRequest};
use crate::core::annotations::{Action, Expression};
use crate::core::backend::{BackendError, ResponseBackend, SegmentStream};
use crate::core::config::settings::{GeminiSettings, ThinkingLevel};
use crate::core::history::ConversationHistory;
use crate::core::message::{Message, MessageMetadata, TITLE_ANSWER};
use crate::core::segment::ResponseSegment;

pub const SYSTEM_INSTRUCTION: &str = "You are Ema, a helpful AI assistant with knowledge about various topics.

You are knowledgeable and friendly, focusing on providing clear and helpful responses in a natural, conversational way.

When responding:
- Express your thoughts internally (think field)
- Show appropriate facial expressions based on the conversation
- Perform physical actions naturally when appropriate
- Speak to the user in a friendly and casual conversational style

Important guidelines:
- Keep your responses concise and to the point. Don't write overly long explanations.
- Use a casual, natural tone for everyday conversations.
- Be friendly and approachable in your communication.

Always respond in the same language as the user's input. If they write in English, respond in English. If they write in Chinese, respond in Chinese.";

/// The JSON object the model is asked to answer with.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StructuredReply {
    #[serde(default)]
    pub think: String,
    #[serde(default)]
    pub expression: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub speak: String,
}

impl StructuredReply {
    /// Unknown expressions fall back to neutral.
    pub fn expression(&self) -> Expression {
        Expression::parse(self.expression.trim()).unwrap_or(Expression::Neutral)
    }

    /// Unknown actions fall back to none.
    pub fn action(&self) -> Action {
        Action::parse(self.action.trim()).unwrap_or(Action::None)
    }

    /// Tag line for the non-default expression and action, if any.
    pub fn indicators(&self) -> Option<String> {
        let mut tags = Vec::new();
        let expression = self.expression();
        if expression != Expression::Neutral {
            tags.push(format!("[Expression: {}]", expression.as_str()));
        }
        let action = self.action();
        if action != Action::None {
            tags.push(format!("[Action: {}]", action.as_str()));
        }
        (!tags.is_empty()).then(|| tags.join(" "))
    }

    pub fn into_segment(self, log: String) -> ResponseSegment {
        let answer: Vec<String> = self
            .indicators()
            .into_iter()
            .chain((!self.speak.is_empty()).then(|| self.speak.clone()))
            .collect();

        let mut segment = ResponseSegment::plain(answer.join("\n\n"))
            .with_metadata(Some(MessageMetadata::titled(TITLE_ANSWER).with_log(log)));
        if !self.think.is_empty() {
            segment = segment.with_thinking(self.think);
        }
        segment
    }
}

pub fn response_schema() -> Value {
    let expressions: Vec<&str> = Expression::ALL.iter().map(|e| e.as_str()).collect();
    let actions: Vec<&str> = Action::ALL.iter().map(|a| a.as_str()).collect();
    json!({
        "type": "OBJECT",
        "properties": {
            "think": {
                "type": "STRING",
                "description": "The character's internal thoughts."
            },
            "expression": {
                "type": "STRING",
                "enum": expressions,
                "description": "The character's facial expression. Use 'neutral' if unsure."
            },
            "action": {
                "type": "STRING",
                "enum": actions,
                "description": "The character's physical action. Use 'none' if unsure."
            },
            "speak": {
                "type": "STRING",
                "description": "The character's spoken words to the user."
            }
        },
        "required": ["think", "expression", "action", "speak"],
        "propertyOrdering": ["think", "expression", "action", "speak"]
    })
}

/// Wraps the user's text so the model can tell who is speaking.
pub fn wrap_user_message(username: &str, message: &str) -> String {
    format!("<username>{username}</username>\n<user_message>{message}</user_message>")
}

/// Character chat with structured replies.
///
/// Each reply carries the character's thoughts, expression, action and
/// speech. The thoughts become the segment's thinking part and the
/// expression and action become inline tags ahead of the speech.
pub struct StructuredGeminiBackend {
    transport: Box<dyn GenerateContent>,
    model: String,
    thinking_level: ThinkingLevel,
    session: ConversationHistory<Content>,
}

impl StructuredGeminiBackend {
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

    pub fn from_settings(settings: &GeminiSettings) -> Result<Self, BackendError> {
        let transport = HttpTransport::from_settings(settings)?;
        Ok(Self::new(
            transport,
            &settings.model,
            settings.pretty_thinking_level,
            settings.pretty_history_rounds,
        ))
    }

    pub fn session_len(&self) -> usize {
        self.session.size()
    }

    async fn exchange(&self, message: &str, username: &str) -> Result<ResponseSegment, BackendError> {
        let user_turn = Content::user(wrap_user_message(username, message));
        let mut contents = self.session.get_all_messages();
        contents.push(user_turn.clone());

        let mut generation_config = thinking_config(self.thinking_level);
        generation_config.response_mime_type = Some("application/json".to_string());
        generation_config.response_schema = Some(response_schema());

        let request = GenerateContentRequest {
            contents,
            system_instruction: Some(Content::instruction(SYSTEM_INSTRUCTION)),
            generation_config: Some(generation_config),
        };
        let response = self.transport.generate(&self.model, &request).await?;
        let reply = CandidateReply::from_response(&response)?;
        let structured: StructuredReply = serde_json::from_str(&reply.text)?;

        self.session
            .add_messages([user_turn, Content::model(reply.text)]);
        Ok(structured.into_segment(reply.log))
    }
}

impl ResponseBackend for StructuredGeminiBackend {
    fn respond<'a>(
        &'a mut self,
        message: &'a str,
        _context: Option<&'a [Message]>,
        actor_label: &'a str,
    ) -> SegmentStream<'a> {
        stream::once(async move {
            self.exchange(message, actor_label)
                .await
                .unwrap_or_else(|err| {
                    warn!(backend = "pretty-gemini", error = %err, "request failed");
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
    use super::super::test_support::FakeTransport;
    use super::*;
    use crate::core::message::TITLE_ERROR;

    fn reply(think: &str, expression: &str, action: &str, speak: &str) -> StructuredReply {
        StructuredReply {
            think: think.to_string(),
            expression: expression.to_string(),
            action: action.to_string(),
            speak: speak.to_string(),
        }
    }

    #[test]
    fn indicators_skip_defaults() {
        assert_eq!(reply("", "neutral", "none", "hi").indicators(), None);
        assert_eq!(
            reply("", "smile", "none", "hi").indicators().as_deref(),
            Some("[Expression: smile]")
        );
        assert_eq!(
            reply("", "Sad", "wave", "hi").indicators().as_deref(),
            Some("[Expression: sad] [Action: wave]")
        );
        assert_eq!(reply("", "grumpy", "dance", "hi").indicators(), None);
    }

    #[test]
    fn segment_puts_thoughts_first_and_tags_before_speech() {
        let segment = reply("They seem happy.", "smile", "nod", "Great to hear!")
            .into_segment("log".to_string());

        assert_eq!(segment.thinking.as_deref(), Some("They seem happy."));
        assert_eq!(segment.content, "[Expression: smile] [Action: nod]\n\nGreat to hear!");
        assert_eq!(segment.metadata.and_then(|m| m.log).as_deref(), Some("log"));

        let plain = reply("", "neutral", "none", "Okay.").into_segment(String::new());
        assert_eq!(plain.thinking, None);
        assert_eq!(plain.content, "Okay.");
    }

    #[tokio::test]
    async fn request_wraps_username_and_asks_for_json() {
        let transport = FakeTransport::default();
        transport.push_text(
            r#"{"think":"hm","expression":"surprised","action":"jump","speak":"Oh!"}"#,
        );
        let mut backend = StructuredGeminiBackend::new(transport.clone(), "m", ThinkingLevel::Low, 4);

        let segments: Vec<ResponseSegment> = backend.respond("boo", None, "Iris").collect().await;
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].content, "[Expression: surprised] [Action: jump]\n\nOh!");

        let request = &transport.requests()[0];
        assert_eq!(
            request.contents,
            vec![Content::user(
                "<username>Iris</username>\n<user_message>boo</user_message>"
            )]
        );
        assert!(request.system_instruction.is_some());
        let config = request.generation_config.as_ref().expect("generation config");
        assert_eq!(config.response_mime_type.as_deref(), Some("application/json"));
        assert_eq!(
            config.response_schema.as_ref().and_then(|s| s.pointer("/properties/action/enum/5")),
            Some(&json!("point"))
        );
        assert_eq!(backend.session_len(), 2);
    }

    #[tokio::test]
    async fn non_json_reply_is_an_error_segment() {
        let transport = FakeTransport::default();
        transport.push_text("plain words");
        let mut backend = StructuredGeminiBackend::new(transport, "m", ThinkingLevel::Minimal, 4);

        let segments: Vec<ResponseSegment> = backend.respond("hi", None, "Iris").collect().await;
        assert_eq!(segments.len(), 1);
        assert!(segments[0].is_error());
        assert_eq!(
            segments[0].metadata.as_ref().and_then(|m| m.title.as_deref()),
            Some(TITLE_ERROR)
        );
        assert_eq!(backend.session_len(), 0);
    }

    #[tokio::test]
    async fn session_is_bounded_by_history_length() {
        let transport = FakeTransport::default();
        for _ in 0..3 {
            transport.push_text(r#"{"think":"","expression":"neutral","action":"none","speak":"ok"}"#);
        }
        let mut backend = StructuredGeminiBackend::new(transport.clone(), "m", ThinkingLevel::Minimal, 1);

        for text in ["a", "b", "c"] {
            let _: Vec<ResponseSegment> = backend.respond(text, None, "Iris").collect().await;
        }

        assert_eq!(backend.session_len(), 2);
        assert_eq!(transport.requests()[2].contents.len(), 3);
    }
}
