use futures_util::stream::{self, StreamExt};

use crate::core::backend::{ResponseBackend, SegmentStream};
use crate::core::message::{Message, MessageMetadata, Role};
use crate::core::segment::ResponseSegment;

const GREETING_WORDS: [&str; 3] = ["hello", "hi", "hey"];
const QUESTION_MARKERS: [char; 3] = ['?', '？', '吗'];

/// Context-aware replies built from a handful of rules.
///
/// The reply depends on how many user turns the supplied context holds and
/// on whether the message looks like a greeting or a question.
#[derive(Debug, Clone)]
pub struct RuleBasedBackend {
    show_thinking: bool,
}

impl Default for RuleBasedBackend {
    fn default() -> Self {
        Self::new(true)
    }
}

impl RuleBasedBackend {
    pub fn new(show_thinking: bool) -> Self {
        Self { show_thinking }
    }

    fn segment(&self, content: String, reason: &str) -> ResponseSegment {
        let metadata = self
            .show_thinking
            .then(|| MessageMetadata::titled(format!("💭 Thinking: {reason}")));
        ResponseSegment::plain(content).with_metadata(metadata)
    }

    pub fn reply(
        &self,
        message: &str,
        context: Option<&[Message]>,
        actor_label: &str,
    ) -> Vec<ResponseSegment> {
        let user_turns = context
            .unwrap_or_default()
            .iter()
            .filter(|entry| entry.role == Role::User)
            .count();

        let mut segments = Vec::new();
        if self.show_thinking {
            segments.push(self.segment(
                format!("{actor_label}, I received your message: '{message}'"),
                "reading the message",
            ));
        }

        let (content, reason) = match user_turns {
            0 => (
                "This is our first conversation, nice to meet you!".to_string(),
                "first message".to_string(),
            ),
            n if n < 3 => (
                format!("This is exchange number {} between us.", n + 1),
                format!("{n} earlier exchanges"),
            ),
            _ => (
                "We have talked quite a lot already!".to_string(),
                "long conversation".to_string(),
            ),
        };
        segments.push(self.segment(content, &reason));

        if is_greeting(message) {
            segments.push(self.segment(
                format!("[Expression: smile] [Action: wave]\n\nHello {actor_label}! How can I help?"),
                "greeting detected",
            ));
        } else if message.contains(&QUESTION_MARKERS[..]) {
            segments.push(self.segment(
                "[Expression: serious] [Action: nod]\n\nThat is a good question! Let me think...".to_string(),
                "question detected",
            ));
        }

        segments
    }
}

fn is_greeting(message: &str) -> bool {
    message.contains("你好")
        || message
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| GREETING_WORDS.iter().any(|g| word.eq_ignore_ascii_case(g)))
}

impl ResponseBackend for RuleBasedBackend {
    fn respond<'a>(
        &'a mut self,
        message: &'a str,
        context: Option<&'a [Message]>,
        actor_label: &'a str,
    ) -> SegmentStream<'a> {
        stream::iter(self.reply(message, context, actor_label)).boxed()
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(user_turns: usize) -> Vec<Message> {
        (0..user_turns)
            .flat_map(|i| {
                [
                    Message::user(format!("question {i}")),
                    Message::assistant(format!("answer {i}")),
                ]
            })
            .collect()
    }

    #[test]
    fn first_contact_greeting_yields_three_segments() {
        let backend = RuleBasedBackend::default();
        let segments = backend.reply("Hello there", None, "Iris");

        assert_eq!(segments.len(), 3);
        assert!(segments[0].content.starts_with("Iris, I received"));
        assert!(segments[1].content.contains("first conversation"));
        assert!(segments[2].content.contains("Hello Iris!"));
        assert_eq!(
            segments[2].metadata.as_ref().and_then(|m| m.title.as_deref()),
            Some("💭 Thinking: greeting detected")
        );
    }

    #[test]
    fn counts_user_turns_in_context() {
        let backend = RuleBasedBackend::default();
        let context = history(2);
        let segments = backend.reply("what now?", Some(&context), "Iris");

        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].content, "This is exchange number 3 between us.");
        assert!(segments[2].content.contains("good question"));

        let long = history(5);
        let segments = backend.reply("ok", Some(&long), "Iris");
        assert_eq!(segments.len(), 2);
        assert!(segments[1].content.contains("quite a lot"));
    }

    #[test]
    fn without_thinking_titles_are_omitted() {
        let backend = RuleBasedBackend::new(false);
        let segments = backend.reply("你好吗", None, "Iris");

        assert_eq!(segments.len(), 2);
        assert!(segments.iter().all(|segment| segment.metadata.is_none()));
    }

    #[test]
    fn words_containing_hi_are_not_greetings() {
        let backend = RuleBasedBackend::new(false);
        let segments = backend.reply("this is fine", None, "Iris");
        assert_eq!(segments.len(), 1);
    }
}
