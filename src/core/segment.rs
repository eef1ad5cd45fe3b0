use std::fmt::Display;

use crate::core::message::{MessageMetadata, Role, TITLE_ANSWER};

/// One unit of backend output, rendered as one bubble.
///
/// `thinking` is the optional reasoning part shown before `content`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseSegment {
    pub role: Role,
    pub thinking: Option<String>,
    pub content: String,
    pub metadata: Option<MessageMetadata>,
}

impl ResponseSegment {
    pub fn answer(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            thinking: None,
            content: content.into(),
            metadata: Some(MessageMetadata::titled(TITLE_ANSWER)),
        }
    }

    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            thinking: None,
            content: content.into(),
            metadata: None,
        }
    }

    /// Single-segment stand-in for a failed backend call.
    pub fn error(title: &str, detail: impl Display) -> Self {
        Self {
            role: Role::Assistant,
            thinking: None,
            content: detail.to_string(),
            metadata: Some(MessageMetadata::error(title)),
        }
    }

    pub fn with_thinking(mut self, thinking: impl Into<String>) -> Self {
        self.thinking = Some(thinking.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Option<MessageMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn thinking_text(&self) -> &str {
        self.thinking.as_deref().unwrap_or("")
    }

    /// Segments with no thinking and no content produce no bubble.
    pub fn is_blank(&self) -> bool {
        self.thinking_text().is_empty() && self.content.is_empty()
    }

    pub fn is_error(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::message::TITLE_ERROR;

    #[test]
    fn blank_detection_considers_both_parts() {
        assert!(ResponseSegment::plain("").is_blank());
        assert!(ResponseSegment::plain("").with_thinking("").is_blank());
        assert!(!ResponseSegment::plain("").with_thinking("hmm").is_blank());
        assert!(!ResponseSegment::answer("hello").is_blank());
    }

    #[test]
    fn error_segments_carry_marker() {
        let segment = ResponseSegment::error(TITLE_ERROR, "Unexpected error: timed out");
        assert!(segment.is_error());
        assert_eq!(segment.content, "Unexpected error: timed out");
        assert_eq!(segment.role, Role::Assistant);
    }
}
