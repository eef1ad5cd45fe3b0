pub mod data;
pub mod io;
pub mod printing;
pub mod settings;

pub use data::Config;
pub use settings::{Settings, SettingsOverrides};
