//! Effective runtime settings.
//!
//! Values are layered: built-in defaults, then `config.toml`, then
//! environment variables, then command-line overrides.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::core::config::data::Config;
use crate::core::history::{DEFAULT_MAX_ROUNDS, DEFAULT_MESSAGES_PER_ROUND};
use crate::core::streaming::DEFAULT_STREAMING_DELAY;

pub const DEFAULT_BACKEND: &str = "simple";
pub const DEFAULT_USERNAME: &str = "Phoenix";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_USER_AVATAR: &str = "assets/imgs/user.png";
pub const DEFAULT_EMA_AVATAR: &str = "assets/imgs/ema.png";
pub const DEFAULT_EXPRESSION_IMAGES_DIR: &str = "assets/gen_imgs";

pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_GEMINI_MODEL: &str = "GEMINI_MODEL";
pub const ENV_GEMINI_BASE_URL: &str = "GEMINI_BASE_URL";
pub const ENV_BARE_THINKING_LEVEL: &str = "BARE_GEMINI_BOT_THINKING_LEVEL";
pub const ENV_PRETTY_THINKING_LEVEL: &str = "PRETTY_GEMINI_BOT_THINKING_LEVEL";
pub const ENV_PRETTY_HISTORY_LENGTH: &str = "PRETTY_GEMINI_BOT_HISTORY_LENGTH";
pub const ENV_USER_AVATAR: &str = "USER_AVATAR";
pub const ENV_EMA_AVATAR: &str = "EMA_AVATAR";
pub const ENV_EXPRESSION_IMGS_DIR: &str = "EXPRESSION_IMGS_DIR";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ThinkingLevel {
    #[default]
    Minimal,
    Low,
    Medium,
    High,
}

impl ThinkingLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "minimal" => Some(Self::Minimal),
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for ThinkingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection details shared by the remote backends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub bare_thinking_level: ThinkingLevel,
    pub pretty_thinking_level: ThinkingLevel,
    /// Rounds the structured backend keeps in its private session.
    pub pretty_history_rounds: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarSettings {
    pub user_avatar: PathBuf,
    pub ema_avatar: PathBuf,
    pub expression_images_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub history_rounds: i64,
    pub messages_per_round: i64,
    pub streaming_delay: Duration,
    pub backend: String,
    pub username: String,
    pub gemini: GeminiSettings,
    pub avatar: AvatarSettings,
}

/// Command-line values that win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub backend: Option<String>,
    pub username: Option<String>,
    pub streaming_delay_ms: Option<u64>,
    pub history_rounds: Option<i64>,
}

impl Settings {
    pub fn from_process_env(config: &Config, overrides: &SettingsOverrides) -> Self {
        Self::resolve(config, |key| std::env::var(key).ok(), overrides)
    }

    pub fn resolve<E>(config: &Config, env: E, overrides: &SettingsOverrides) -> Self
    where
        E: Fn(&str) -> Option<String>,
    {
        let env_value = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let configured_level = config
            .thinking_level
            .as_deref()
            .and_then(|raw| parse_level_or_warn("thinking_level", raw))
            .unwrap_or_default();
        let level_from_env = |key: &str| {
            env_value(key)
                .and_then(|raw| parse_level_or_warn(key, &raw))
                .unwrap_or(configured_level)
        };

        let history_rounds = overrides
            .history_rounds
            .or(config.history_rounds)
            .unwrap_or(DEFAULT_MAX_ROUNDS);

        let pretty_history_rounds = env_value(ENV_PRETTY_HISTORY_LENGTH)
            .and_then(|raw| match raw.parse::<i64>() {
                Ok(rounds) => Some(rounds),
                Err(_) => {
                    warn!(key = ENV_PRETTY_HISTORY_LENGTH, value = %raw, "ignoring non-numeric history length");
                    None
                }
            })
            .unwrap_or(DEFAULT_MAX_ROUNDS);

        let delay_ms = overrides
            .streaming_delay_ms
            .or(config.streaming_delay_ms);

        // Chat turns are one user message plus one folded reply.
        if let Some(requested) = config
            .messages_per_round
            .filter(|n| *n != DEFAULT_MESSAGES_PER_ROUND)
        {
            warn!(
                key = "messages_per_round",
                value = requested,
                "only two messages per round are supported, ignoring"
            );
        }

        Settings {
            history_rounds,
            messages_per_round: DEFAULT_MESSAGES_PER_ROUND,
            streaming_delay: delay_ms.map_or(DEFAULT_STREAMING_DELAY, Duration::from_millis),
            backend: overrides
                .backend
                .clone()
                .or_else(|| config.default_backend.clone())
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            username: overrides
                .username
                .clone()
                .or_else(|| config.username.clone())
                .unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            gemini: GeminiSettings {
                api_key: env_value(ENV_GEMINI_API_KEY),
                model: env_value(ENV_GEMINI_MODEL)
                    .or_else(|| config.gemini_model.clone())
                    .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
                base_url: env_value(ENV_GEMINI_BASE_URL)
                    .or_else(|| config.gemini_base_url.clone())
                    .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string()),
                bare_thinking_level: level_from_env(ENV_BARE_THINKING_LEVEL),
                pretty_thinking_level: level_from_env(ENV_PRETTY_THINKING_LEVEL),
                pretty_history_rounds,
            },
            avatar: AvatarSettings {
                user_avatar: env_value(ENV_USER_AVATAR)
                    .or_else(|| config.user_avatar.clone())
                    .unwrap_or_else(|| DEFAULT_USER_AVATAR.to_string())
                    .into(),
                ema_avatar: env_value(ENV_EMA_AVATAR)
                    .or_else(|| config.ema_avatar.clone())
                    .unwrap_or_else(|| DEFAULT_EMA_AVATAR.to_string())
                    .into(),
                expression_images_dir: env_value(ENV_EXPRESSION_IMGS_DIR)
                    .or_else(|| config.expression_images_dir.clone())
                    .unwrap_or_else(|| DEFAULT_EXPRESSION_IMAGES_DIR.to_string())
                    .into(),
            },
        }
    }
}

fn parse_level_or_warn(source: &str, raw: &str) -> Option<ThinkingLevel> {
    let level = ThinkingLevel::parse(raw);
    if level.is_none() {
        warn!(source, value = raw, "unknown thinking level, using minimal");
    }
    level
}
