//! Terminal UI for interactive chat sessions.
//!
//! - [`chat_loop`]: the event loop that reads keys, hands messages to the
//!   session controller and drains its events.
//! - [`app`]: the state the screen is drawn from.
//! - [`renderer`] and [`scroll`]: frame layout and transcript line building.

pub mod app;
pub mod chat_loop;
pub mod renderer;
pub mod scroll;
