//! Response backends and the registry the session picks them from.
//!
//! A backend turns one user message into a finite, ordered stream of
//! [`ResponseSegment`]s. Failures never escape as errors: a backend reports
//! them as a single error-marked segment so the conversation stays usable.
//!
//! The stream borrows the backend mutably, so one backend instance serves
//! one request at a time; callers sharing an instance across tasks must
//! serialize access themselves.

pub mod gemini;
pub mod rules;
pub mod scripted;

use std::error::Error as StdError;
use std::fmt;

use futures_util::stream::BoxStream;
use tracing::{info, warn};

use crate::core::config::settings::Settings;
use crate::core::message::{Message, TITLE_API_ERROR, TITLE_ERROR, TITLE_NO_CANDIDATES};
use crate::core::segment::ResponseSegment;

pub use gemini::{GeminiBackend, StructuredGeminiBackend};
pub use rules::RuleBasedBackend;
pub use scripted::ScriptedBackend;

pub type SegmentStream<'a> = BoxStream<'a, ResponseSegment>;

pub trait ResponseBackend: Send {
    /// Produces the reply to `message`.
    ///
    /// `context` holds earlier turns of the conversation, oldest first.
    /// `actor_label` is the name the user goes by.
    fn respond<'a>(
        &'a mut self,
        message: &'a str,
        context: Option<&'a [Message]>,
        actor_label: &'a str,
    ) -> SegmentStream<'a>;

    /// Forgets any conversation state the backend keeps on its own.
    fn reset(&mut self);
}

#[derive(Debug)]
pub enum BackendError {
    /// A required credential was not configured.
    MissingCredential { variable: &'static str },
    /// The request could not be sent or its body could not be read.
    Transport(reqwest::Error),
    /// The remote answered with a non-success status.
    Status { status: u16, summary: String },
    /// The remote answered with a body we could not interpret.
    Decode(serde_json::Error),
    /// The remote answered without any candidate reply.
    EmptyResponse,
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::MissingCredential { variable } => write!(
                f,
                "API key not provided. Set the {variable} environment variable."
            ),
            BackendError::Transport(err) => write!(f, "request failed: {err}"),
            BackendError::Status { status, summary } => write!(f, "HTTP {status}: {summary}"),
            BackendError::Decode(err) => write!(f, "malformed response: {err}"),
            BackendError::EmptyResponse => write!(f, "no candidates returned"),
        }
    }
}

impl StdError for BackendError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            BackendError::Transport(err) => Some(err),
            BackendError::Decode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for BackendError {
    fn from(err: reqwest::Error) -> Self {
        BackendError::Transport(err)
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::Decode(err)
    }
}

impl BackendError {
    /// The apologetic bubble shown in place of a reply.
    pub fn into_segment(self) -> ResponseSegment {
        match self {
            BackendError::Status { summary, .. } => {
                ResponseSegment::error(TITLE_API_ERROR, format!("API Error: {summary}"))
            }
            BackendError::EmptyResponse => ResponseSegment::error(
                TITLE_NO_CANDIDATES,
                "I apologize, but I couldn't generate a response. Please try again.",
            ),
            other => ResponseSegment::error(TITLE_ERROR, format!("Unexpected error: {other}")),
        }
    }
}

struct RegisteredBackend {
    key: String,
    display_name: String,
    backend: Box<dyn ResponseBackend>,
}

/// A backend that could not be constructed, kept for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnavailableBackend {
    pub key: String,
    pub display_name: String,
    pub reason: String,
}

/// Selectable backends in registration order.
#[derive(Default)]
pub struct BackendRegistry {
    available: Vec<RegisteredBackend>,
    unavailable: Vec<UnavailableBackend>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every built-in backend. Remote backends whose configuration
    /// is incomplete are recorded as unavailable instead.
    pub fn builtin(settings: &Settings) -> Self {
        let mut registry = Self::new();
        registry.register("simple", "Simple (scripted)", ScriptedBackend::default());
        registry.register("rules", "Rule-based", RuleBasedBackend::default());
        registry.register_result(
            "gemini",
            "Gemini",
            GeminiBackend::from_settings(&settings.gemini, settings.history_rounds),
        );
        registry.register_result(
            "pretty-gemini",
            "Gemini (structured)",
            StructuredGeminiBackend::from_settings(&settings.gemini),
        );
        registry
    }

    pub fn register<B>(&mut self, key: &str, display_name: &str, backend: B)
    where
        B: ResponseBackend + 'static,
    {
        self.available.retain(|entry| entry.key != key);
        self.unavailable.retain(|entry| entry.key != key);
        self.available.push(RegisteredBackend {
            key: key.to_string(),
            display_name: display_name.to_string(),
            backend: Box::new(backend),
        });
    }

    pub fn register_result<B>(
        &mut self,
        key: &str,
        display_name: &str,
        backend: Result<B, BackendError>,
    ) where
        B: ResponseBackend + 'static,
    {
        match backend {
            Ok(backend) => {
                info!(backend = key, "backend available");
                self.register(key, display_name, backend);
            }
            Err(err) => {
                warn!(backend = key, error = %err, "backend unavailable");
                self.available.retain(|entry| entry.key != key);
                self.unavailable.retain(|entry| entry.key != key);
                self.unavailable.push(UnavailableBackend {
                    key: key.to_string(),
                    display_name: display_name.to_string(),
                    reason: err.to_string(),
                });
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.available.iter().any(|entry| entry.key == key)
    }

    pub fn keys(&self) -> Vec<&str> {
        self.available.iter().map(|entry| entry.key.as_str()).collect()
    }

    pub fn first_key(&self) -> Option<&str> {
        self.available.first().map(|entry| entry.key.as_str())
    }

    /// The key registered after `key`, wrapping around.
    pub fn next_key(&self, key: &str) -> Option<&str> {
        let position = self.available.iter().position(|entry| entry.key == key);
        let next = position.map_or(0, |index| (index + 1) % self.available.len());
        self.available.get(next).map(|entry| entry.key.as_str())
    }

    pub fn display_name(&self, key: &str) -> Option<&str> {
        self.available
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.display_name.as_str())
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut (dyn ResponseBackend + 'static)> {
        self.available
            .iter_mut()
            .find(|entry| entry.key == key)
            .map(|entry| entry.backend.as_mut())
    }

    /// `(key, display name)` of every selectable backend.
    pub fn available(&self) -> Vec<(&str, &str)> {
        self.available
            .iter()
            .map(|entry| (entry.key.as_str(), entry.display_name.as_str()))
            .collect()
    }

    pub fn unavailable(&self) -> &[UnavailableBackend] {
        &self.unavailable
    }

    pub fn is_empty(&self) -> bool {
        self.available.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::{Config, SettingsOverrides};

    fn settings_without_key() -> Settings {
        Settings::resolve(&Config::default(), |_| None, &SettingsOverrides::default())
    }

    #[test]
    fn missing_credentials_leave_remote_backends_unavailable() {
        let registry = BackendRegistry::builtin(&settings_without_key());

        assert_eq!(registry.keys(), vec!["simple", "rules"]);
        let unavailable: Vec<&str> = registry
            .unavailable()
            .iter()
            .map(|entry| entry.key.as_str())
            .collect();
        assert_eq!(unavailable, vec!["gemini", "pretty-gemini"]);
        assert!(registry.unavailable()[0].reason.contains("GEMINI_API_KEY"));
    }

    #[test]
    fn credentials_make_remote_backends_available() {
        let settings = Settings::resolve(
            &Config::default(),
            |key| (key == "GEMINI_API_KEY").then(|| "test-key".to_string()),
            &SettingsOverrides::default(),
        );
        let registry = BackendRegistry::builtin(&settings);
        assert_eq!(
            registry.keys(),
            vec!["simple", "rules", "gemini", "pretty-gemini"]
        );
        assert!(registry.unavailable().is_empty());
    }

    #[test]
    fn next_key_wraps_around() {
        let registry = BackendRegistry::builtin(&settings_without_key());
        assert_eq!(registry.next_key("simple"), Some("rules"));
        assert_eq!(registry.next_key("rules"), Some("simple"));
        assert_eq!(registry.next_key("missing"), Some("simple"));
        assert_eq!(BackendRegistry::new().next_key("simple"), None);
    }

    #[test]
    fn re_registering_replaces_previous_entry() {
        let mut registry = BackendRegistry::new();
        registry.register("simple", "First", ScriptedBackend::default());
        registry.register("simple", "Second", ScriptedBackend::default());
        assert_eq!(registry.available(), vec![("simple", "Second")]);
    }

    #[test]
    fn error_segments_use_distinct_titles() {
        let status = BackendError::Status {
            status: 429,
            summary: "quota exceeded".to_string(),
        }
        .into_segment();
        assert!(status.is_error());
        assert_eq!(status.content, "API Error: quota exceeded");
        assert_eq!(
            status.metadata.and_then(|m| m.title).as_deref(),
            Some(TITLE_API_ERROR)
        );

        let empty = BackendError::EmptyResponse.into_segment();
        assert_eq!(
            empty.metadata.and_then(|m| m.title).as_deref(),
            Some(TITLE_NO_CANDIDATES)
        );

        let missing = BackendError::MissingCredential {
            variable: "GEMINI_API_KEY",
        }
        .into_segment();
        assert!(missing.content.starts_with("Unexpected error: API key not provided"));
    }
}
