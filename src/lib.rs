//! Ema is a terminal companion chat. Replies stream in from pluggable
//! backends while `[Expression: ...]` and `[Action: ...]` tags in the text
//! drive the companion's on-screen state.
//!
//! The crate is organized in a few layers:
//! - [`core`] owns the bounded conversation history, the backend seam and
//!   its built-in implementations, the streaming renderer and the session
//!   state machine that ties them together.
//! - [`ui`] draws the terminal interface and runs the interactive loop.
//! - [`api`] defines the request and response payloads of the remote API.
//! - [`utils`] holds logging setup and URL helpers.
//!
//! The binary (`src/main.rs`) routes through [`crate::cli::main`], which
//! dispatches into [`ui::chat_loop`] for interactive sessions.

pub mod api;
pub mod cli;
pub mod core;
pub mod ui;
pub mod utils;
