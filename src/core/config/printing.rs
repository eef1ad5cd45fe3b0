use crate::core::config::data::{Config, CONFIG_KEYS};
use crate::core::config::settings::ThinkingLevel;

/// Why a `set`/`unset` request was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigEditError {
    UnknownKey(String),
    InvalidValue { key: String, reason: String },
}

impl std::fmt::Display for ConfigEditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigEditError::UnknownKey(key) => write!(
                f,
                "Unknown config key: {key} (expected one of: {})",
                CONFIG_KEYS.join(", ")
            ),
            ConfigEditError::InvalidValue { key, reason } => {
                write!(f, "Invalid value for {key}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigEditError {}

fn invalid(key: &str, reason: impl Into<String>) -> ConfigEditError {
    ConfigEditError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

fn non_negative(key: &str, value: &str) -> Result<i64, ConfigEditError> {
    value
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= 0)
        .ok_or_else(|| invalid(key, "expected a non-negative integer"))
}

impl Config {
    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), ConfigEditError> {
        let value = value.trim();
        match key {
            "history-rounds" => self.history_rounds = Some(non_negative(key, value)?),
            "messages-per-round" => {
                let n = non_negative(key, value)?;
                if n == 0 {
                    return Err(invalid(key, "a round needs at least one message"));
                }
                self.messages_per_round = Some(n);
            }
            "streaming-delay-ms" => {
                self.streaming_delay_ms = Some(
                    value
                        .parse::<u64>()
                        .map_err(|_| invalid(key, "expected milliseconds"))?,
                )
            }
            "default-backend" => self.default_backend = Some(value.to_string()),
            "username" => self.username = Some(value.to_string()),
            "gemini-model" => self.gemini_model = Some(value.to_string()),
            "gemini-base-url" => self.gemini_base_url = Some(value.to_string()),
            "thinking-level" => {
                let level = ThinkingLevel::parse(value)
                    .ok_or_else(|| invalid(key, "expected minimal, low, medium or high"))?;
                self.thinking_level = Some(level.as_str().to_string());
            }
            "user-avatar" => self.user_avatar = Some(value.to_string()),
            "ema-avatar" => self.ema_avatar = Some(value.to_string()),
            "expression-images-dir" => self.expression_images_dir = Some(value.to_string()),
            _ => return Err(ConfigEditError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn unset_value(&mut self, key: &str) -> Result<(), ConfigEditError> {
        match key {
            "history-rounds" => self.history_rounds = None,
            "messages-per-round" => self.messages_per_round = None,
            "streaming-delay-ms" => self.streaming_delay_ms = None,
            "default-backend" => self.default_backend = None,
            "username" => self.username = None,
            "gemini-model" => self.gemini_model = None,
            "gemini-base-url" => self.gemini_base_url = None,
            "thinking-level" => self.thinking_level = None,
            "user-avatar" => self.user_avatar = None,
            "ema-avatar" => self.ema_avatar = None,
            "expression-images-dir" => self.expression_images_dir = None,
            _ => return Err(ConfigEditError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    pub fn display_lines(&self) -> Vec<String> {
        fn show<T: ToString>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map_or_else(|| "(unset)".to_string(), ToString::to_string)
        }

        vec![
            format!("  history-rounds: {}", show(&self.history_rounds)),
            format!("  messages-per-round: {}", show(&self.messages_per_round)),
            format!("  streaming-delay-ms: {}", show(&self.streaming_delay_ms)),
            format!("  default-backend: {}", show(&self.default_backend)),
            format!("  username: {}", show(&self.username)),
            format!("  gemini-model: {}", show(&self.gemini_model)),
            format!("  gemini-base-url: {}", show(&self.gemini_base_url)),
            format!("  thinking-level: {}", show(&self.thinking_level)),
            format!("  user-avatar: {}", show(&self.user_avatar)),
            format!("  ema-avatar: {}", show(&self.ema_avatar)),
            format!("  expression-images-dir: {}", show(&self.expression_images_dir)),
        ]
    }

    pub fn print_all(&self) {
        println!("Current configuration:");
        for line in self.display_lines() {
            println!("{line}");
        }
    }
}
