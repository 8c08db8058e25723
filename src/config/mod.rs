//! Configuration module.
//!
//! Provides `AppConfig` (top-level settings), sub-configs for the view,
//! speech and save subsystems, `AppPaths` for the cross-platform config
//! directory, and TOML persistence via `AppConfig::load` / `AppConfig::save`.

pub mod paths;
pub mod settings;

pub use paths::AppPaths;
pub use settings::{
    AppConfig, SaveConfig, SpeechConfig, TextDelivery, UnreadableImagePolicy, ViewConfig,
};
