//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a hand-written `settings.toml`
//! only needs the keys it changes.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// ViewConfig
// ---------------------------------------------------------------------------

/// Page view settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Page → canvas scale factor.
    pub zoom: f32,
    /// Extra margin, in canvas pixels, around each image when hit-testing a
    /// click.
    pub click_tolerance_px: f32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            zoom: 1.5,
            click_tolerance_px: 8.0,
        }
    }
}

// ---------------------------------------------------------------------------
// TextDelivery
// ---------------------------------------------------------------------------

/// How the speech program receives the text to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDelivery {
    /// Appended as the last command-line argument, after `--`.
    Argument,
    /// Written to the program's standard input.
    Stdin,
}

impl Default for TextDelivery {
    fn default() -> Self {
        Self::Argument
    }
}

// ---------------------------------------------------------------------------
// SpeechConfig
// ---------------------------------------------------------------------------

/// Settings for the background text-to-speech worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Start the speech worker at all.  When `false`, read-aloud is disabled.
    pub enabled: bool,
    /// Text-to-speech program, looked up on `PATH`.
    pub program: String,
    /// Arguments passed before the text.
    pub args: Vec<String>,
    pub text_delivery: TextDelivery,
    /// How often an idle worker re-checks its stop signal.
    pub poll_interval_ms: u64,
    /// Bounded wait for the old worker when restarting.
    pub restart_timeout_ms: u64,
    /// Bounded wait for the worker on exit.
    pub shutdown_timeout_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        let (program, args, text_delivery) = platform_speech_command();
        Self {
            enabled: true,
            program,
            args,
            text_delivery,
            poll_interval_ms: 200,
            restart_timeout_ms: 500,
            shutdown_timeout_ms: 1_000,
        }
    }
}

#[cfg(target_os = "windows")]
fn platform_speech_command() -> (String, Vec<String>, TextDelivery) {
    (
        "powershell".into(),
        vec![
            "-NoProfile".into(),
            "-Command".into(),
            "Add-Type -AssemblyName System.Speech; \
             (New-Object System.Speech.Synthesis.SpeechSynthesizer).Speak([Console]::In.ReadToEnd())"
                .into(),
        ],
        TextDelivery::Stdin,
    )
}

#[cfg(target_os = "macos")]
fn platform_speech_command() -> (String, Vec<String>, TextDelivery) {
    ("say".into(), vec!["-r".into(), "150".into()], TextDelivery::Argument)
}

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
fn platform_speech_command() -> (String, Vec<String>, TextDelivery) {
    (
        "espeak-ng".into(),
        vec!["-s".into(), "150".into()],
        TextDelivery::Argument,
    )
}

// ---------------------------------------------------------------------------
// SaveConfig
// ---------------------------------------------------------------------------

/// What save-commit does with a replacement image that cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnreadableImagePolicy {
    /// Refuse to save and report every unreadable image.
    Abort,
    /// Leave those records out and save the rest.
    Skip,
}

impl Default for UnreadableImagePolicy {
    fn default() -> Self {
        Self::Abort
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveConfig {
    pub unreadable_image: UnreadableImagePolicy,
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use pdf_retouch::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub view: ViewConfig,
    pub speech: SpeechConfig,
    pub save: SaveConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet
    /// (first-run scenario) so callers never need to special-case a missing
    /// file.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path (useful for tests).
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path (useful for tests).
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    /// A default `AppConfig` survives a TOML round trip.
    #[test]
    fn round_trip_toml() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("settings.toml");

        let original = AppConfig::default();
        original.save_to(&path).expect("save");

        let loaded = AppConfig::load_from(&path).expect("load");

        // ViewConfig
        assert_eq!(original.view.zoom, loaded.view.zoom);
        assert_eq!(original.view.click_tolerance_px, loaded.view.click_tolerance_px);

        // SpeechConfig
        assert_eq!(original.speech.enabled, loaded.speech.enabled);
        assert_eq!(original.speech.program, loaded.speech.program);
        assert_eq!(original.speech.args, loaded.speech.args);
        assert_eq!(original.speech.text_delivery, loaded.speech.text_delivery);
        assert_eq!(original.speech.poll_interval_ms, loaded.speech.poll_interval_ms);

        // SaveConfig
        assert_eq!(original.save.unreadable_image, loaded.save.unreadable_image);
    }

    /// `load_from` on a non-existent path must return `Default` without error.
    #[test]
    fn load_missing_returns_default() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("nonexistent.toml");

        let config = AppConfig::load_from(&path).expect("should not error");
        let default = AppConfig::default();

        assert_eq!(config.view.zoom, default.view.zoom);
        assert_eq!(config.speech.program, default.speech.program);
        assert_eq!(config.save.unreadable_image, default.save.unreadable_image);
    }

    #[test]
    fn default_values() {
        let cfg = AppConfig::default();

        assert_eq!(cfg.view.zoom, 1.5);
        assert_eq!(cfg.view.click_tolerance_px, 8.0);
        assert!(cfg.speech.enabled);
        assert!(!cfg.speech.program.is_empty());
        assert_eq!(cfg.speech.poll_interval_ms, 200);
        assert_eq!(cfg.speech.restart_timeout_ms, 500);
        assert_eq!(cfg.speech.shutdown_timeout_ms, 1_000);
        assert_eq!(cfg.save.unreadable_image, UnreadableImagePolicy::Abort);
    }

    /// A partial file only overrides the keys it names.
    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("partial.toml");
        std::fs::write(
            &path,
            "[save]\nunreadable_image = \"skip\"\n\n[speech]\ntext_delivery = \"stdin\"\n",
        )
        .expect("write");

        let cfg = AppConfig::load_from(&path).expect("load");
        assert_eq!(cfg.save.unreadable_image, UnreadableImagePolicy::Skip);
        assert_eq!(cfg.speech.text_delivery, TextDelivery::Stdin);
        assert_eq!(cfg.view.zoom, 1.5);
        assert_eq!(cfg.speech.poll_interval_ms, 200);
    }

    /// Modified non-default values survive a round trip.
    #[test]
    fn round_trip_modified_values() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("modified.toml");

        let mut cfg = AppConfig::default();
        cfg.view.zoom = 2.0;
        cfg.speech.enabled = false;
        cfg.speech.program = "festival".into();
        cfg.speech.args = vec!["--tts".into()];
        cfg.speech.text_delivery = TextDelivery::Stdin;
        cfg.save.unreadable_image = UnreadableImagePolicy::Skip;

        cfg.save_to(&path).expect("save");
        let loaded = AppConfig::load_from(&path).expect("load");

        assert_eq!(loaded.view.zoom, 2.0);
        assert!(!loaded.speech.enabled);
        assert_eq!(loaded.speech.program, "festival");
        assert_eq!(loaded.speech.args, vec!["--tts".to_string()]);
        assert_eq!(loaded.speech.text_delivery, TextDelivery::Stdin);
        assert_eq!(loaded.save.unreadable_image, UnreadableImagePolicy::Skip);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[view]\nzoom = \"large\"\n").expect("write");
        assert!(AppConfig::load_from(&path).is_err());
    }
}
