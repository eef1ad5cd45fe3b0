//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod backend_list;
pub mod say;

use std::error::Error;

use clap::{Parser, Subcommand};

use crate::cli::backend_list::list_backends;
use crate::cli::say::run_say;
use crate::core::config::{Config, Settings, SettingsOverrides};
use crate::ui::chat_loop::run_chat;
use crate::utils::logging::{init_tracing, LogTarget};

#[derive(Parser)]
#[command(name = "ema")]
#[command(version)]
#[command(about = "A terminal companion chat with live expressions")]
#[command(
    long_about = "Ema is a full-screen terminal companion chat. Replies stream in one \
character at a time from a pluggable backend, and [Expression: ...] / [Action: ...] \
tags in the text drive the companion's mood in the side panel.\n\n\
Backends:\n\
  simple            Scripted replies (default)\n\
  rules             Context-aware rule-based replies\n\
  gemini            Remote model, plain text (needs GEMINI_API_KEY)\n\
  pretty-gemini     Remote model with structured expressions (needs GEMINI_API_KEY)\n\n\
Environment Variables:\n\
  GEMINI_API_KEY    API key for the remote backends\n\
  GEMINI_MODEL      Remote model name\n\
  EMA_LOG           Log filter (e.g. debug, ema=trace)\n\n\
Controls:\n\
  Enter             Send the message\n\
  Esc               Stop the reply in progress\n\
  Tab               Switch to the next backend\n\
  Ctrl+L            Clear the conversation\n\
  Up/Down           Scroll through the conversation\n\
  Ctrl+C            Quit the application"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Backend to chat with (see `ema backends`)
    #[arg(short = 'b', long, global = true, value_name = "BACKEND")]
    pub backend: Option<String>,

    /// Name the companion calls you by
    #[arg(short = 'u', long, global = true, value_name = "NAME")]
    pub username: Option<String>,

    /// Pause between streamed characters, in milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Conversation rounds kept as context
    #[arg(long, global = true, value_name = "ROUNDS")]
    pub rounds: Option<i64>,

    /// Write diagnostic logs to the specified file
    #[arg(short = 'l', long, global = true)]
    pub log: Option<String>,
}

impl Args {
    fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            backend: self.backend.clone(),
            username: self.username.clone(),
            streaming_delay_ms: self.delay_ms,
            history_rounds: self.rounds,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the chat interface (default)
    Chat,
    /// Send one message and print the reply without the TUI
    Say {
        /// The message to send
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        prompt: Vec<String>,
    },
    /// List backends and whether they can be used
    Backends,
    /// Set configuration values
    Set {
        /// Configuration key to set
        key: Option<String>,
        /// Value to set for the key (can be multiple words)
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        value: Option<Vec<String>>,
    },
    /// Unset configuration values
    Unset {
        /// Configuration key to unset
        key: String,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let overrides = args.overrides();

    match args.command.unwrap_or(Commands::Chat) {
        Commands::Set { key, value } => {
            let mut config = Config::load()?;
            let value = value.map(|parts| parts.join(" ")).filter(|v| !v.is_empty());
            match (key, value) {
                (Some(key), Some(value)) => match config.set_value(&key, &value) {
                    Ok(()) => {
                        config.save()?;
                        println!("✅ Set {key} to: {value}");
                    }
                    Err(err) => {
                        eprintln!("❌ {err}");
                        std::process::exit(1);
                    }
                },
                _ => config.print_all(),
            }
            Ok(())
        }
        Commands::Unset { key } => {
            let mut config = Config::load()?;
            match config.unset_value(&key) {
                Ok(()) => {
                    config.save()?;
                    println!("✅ Unset {key}");
                }
                Err(err) => {
                    eprintln!("❌ {err}");
                    std::process::exit(1);
                }
            }
            Ok(())
        }
        Commands::Backends => {
            init_tracing(LogTarget::file_or(args.log.as_deref(), LogTarget::Stderr))?;
            let settings = Settings::from_process_env(&Config::load()?, &overrides);
            list_backends(&settings);
            Ok(())
        }
        Commands::Say { prompt } => {
            init_tracing(LogTarget::file_or(args.log.as_deref(), LogTarget::Stderr))?;
            let settings = Settings::from_process_env(&Config::load()?, &overrides);
            run_say(prompt, settings).await
        }
        Commands::Chat => {
            init_tracing(LogTarget::file_or(args.log.as_deref(), LogTarget::Disabled))?;
            let settings = Settings::from_process_env(&Config::load()?, &overrides);
            run_chat(settings).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_become_overrides() {
        let args = Args::parse_from(["ema", "say", "-b", "rules", "--delay-ms", "0", "hello", "there"]);
        let overrides = args.overrides();
        assert_eq!(overrides.backend.as_deref(), Some("rules"));
        assert_eq!(overrides.streaming_delay_ms, Some(0));
        assert_eq!(overrides.username, None);
        match args.command {
            Some(Commands::Say { prompt }) => assert_eq!(prompt, vec!["hello", "there"]),
            _ => panic!("expected say"),
        }
    }

    #[test]
    fn set_joins_multi_word_values() {
        let args = Args::parse_from(["ema", "set", "username", "Mary", "Ann"]);
        match args.command {
            Some(Commands::Set { key, value }) => {
                assert_eq!(key.as_deref(), Some("username"));
                assert_eq!(value, Some(vec!["Mary".to_string(), "Ann".to_string()]));
            }
            _ => panic!("expected set"),
        }
    }

    #[test]
    fn no_subcommand_means_chat() {
        let args = Args::parse_from(["ema", "-u", "Iris", "--rounds", "3"]);
        assert!(args.command.is_none());
        assert_eq!(args.overrides().history_rounds, Some(3));
        assert_eq!(args.overrides().username.as_deref(), Some("Iris"));
    }
}
