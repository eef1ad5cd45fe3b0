pub mod annotations;
pub mod avatar;
pub mod backend;
pub mod config;
pub mod history;
pub mod message;
pub mod segment;
pub mod session;
pub mod streaming;
