//! Diagnostic logging setup.
//!
//! The filter comes from `EMA_LOG` (same syntax as `RUST_LOG`) and defaults
//! to `warn`. The chat UI owns the terminal, so it logs to a file or not at
//! all; one-shot commands log to stderr.

use std::error::Error;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_FILTER_ENV: &str = "EMA_LOG";
const DEFAULT_FILTER: &str = "warn";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
    Disabled,
}

impl LogTarget {
    /// File if one was given, otherwise `fallback`.
    pub fn file_or(path: Option<&str>, fallback: LogTarget) -> Self {
        path.map_or(fallback, |path| LogTarget::File(PathBuf::from(path)))
    }
}

pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init_tracing(target: LogTarget) -> Result<(), Box<dyn Error>> {
    let registry = tracing_subscriber::registry().with(env_filter());
    match target {
        LogTarget::Disabled => return Ok(()),
        LogTarget::Stderr => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()?,
        LogTarget::File(path) => {
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(Mutex::new(file)),
                )
                .try_init()?
        }
    }
    Ok(())
}
