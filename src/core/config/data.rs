use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persistent user configuration. Unset keys fall back to built-in defaults
/// when resolved into [`Settings`](super::settings::Settings).
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Config {
    /// Conversation rounds kept as context for backends
    pub history_rounds: Option<i64>,
    /// Messages that make up one round (user + assistant by default)
    pub messages_per_round: Option<i64>,
    /// Pause between streamed characters, in milliseconds
    pub streaming_delay_ms: Option<u64>,
    /// Backend selected at startup (e.g., "simple", "pretty-gemini")
    pub default_backend: Option<String>,
    /// Name the assistant addresses the user by
    pub username: Option<String>,
    pub gemini_model: Option<String>,
    pub gemini_base_url: Option<String>,
    /// Thinking level for the remote backends: minimal, low, medium or high
    pub thinking_level: Option<String>,
    pub user_avatar: Option<String>,
    pub ema_avatar: Option<String>,
    /// Directory holding `<expression>_<action>.jpg` avatar images
    pub expression_images_dir: Option<String>,
}

/// Keys accepted by `ema set` / `ema unset`.
pub const CONFIG_KEYS: &[&str] = &[
    "history-rounds",
    "messages-per-round",
    "streaming-delay-ms",
    "default-backend",
    "username",
    "gemini-model",
    "gemini-base-url",
    "thinking-level",
    "user-avatar",
    "ema-avatar",
    "expression-images-dir",
];

/// Get a user-friendly display string for a path
/// Converts absolute paths to use ~ notation on Unix-like systems when possible
pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
