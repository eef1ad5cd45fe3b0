use serde::{Deserialize, Serialize};

pub const TITLE_ANSWER: &str = "💡 Answer";
pub const TITLE_ERROR: &str = "❌ Error";
pub const TITLE_API_ERROR: &str = "❌ API Error";
pub const TITLE_NO_CANDIDATES: &str = "⚠️ Error";
pub const TITLE_INTERRUPTED: &str = "⏹ Interrupted";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_assistant(self) -> bool {
        self == Role::Assistant
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl PartialEq<&str> for Role {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// Display and diagnostic details attached to a message.
///
/// `log` is free-form text (usually token usage) shown beneath a bubble.
/// `error` marks replies that stand in for a failed backend call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
}

impl MessageMetadata {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = Some(log.into());
        self
    }

    pub fn error(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            log: None,
            error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Option<MessageMetadata>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.title.as_deref())
    }

    pub fn is_error(&self) -> bool {
        self.metadata.as_ref().is_some_and(|m| m.error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_strings() {
        assert_eq!(Role::try_from("user"), Ok(Role::User));
        assert_eq!(Role::try_from("assistant"), Ok(Role::Assistant));
        assert!(Role::try_from("system").is_err());
        assert_eq!(String::from(Role::Assistant), "assistant");
        assert!(Role::User == "user");
    }

    #[test]
    fn metadata_omits_absent_fields_when_serialized() {
        let message = Message::assistant("hi").with_metadata(Some(MessageMetadata::titled(
            TITLE_ANSWER,
        )));
        let json = serde_json::to_value(&message).expect("serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "role": "assistant",
                "content": "hi",
                "metadata": { "title": TITLE_ANSWER }
            })
        );
    }

    #[test]
    fn metadata_absence_is_valid_on_input() {
        let message: Message =
            serde_json::from_str(r#"{"role":"assistant","content":"ok"}"#).expect("parse");
        assert!(message.metadata.is_none());
        assert!(!message.is_error());
        assert_eq!(message.title(), None);
    }

    #[test]
    fn error_metadata_sets_marker() {
        let message =
            Message::assistant("boom").with_metadata(Some(MessageMetadata::error(TITLE_ERROR)));
        assert!(message.is_error());
        assert_eq!(message.title(), Some(TITLE_ERROR));
    }
}
