// Brltab Preferences
// Runtime tunables for the translation engine, loadable from TOML

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Errors loading a preferences file.
#[derive(Debug, thiserror::Error)]
pub enum PrefsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(String),
}

/// Runtime preferences consumed by the translator.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Prefs {
    /// How long a chord must be held before its long-press (secondary)
    /// command fires, in milliseconds.
    pub long_press_time_ms: u64,

    /// Interval between repeats of a repeatable command while its chord
    /// stays held, in milliseconds.
    pub autorepeat_interval_ms: u64,

    /// Whether repeatable commands autorepeat at all.
    pub autorepeat_enabled: bool,

    /// Fire a deferred command on the first key release of a chord rather
    /// than waiting for the last.
    pub on_first_release: bool,

    /// Autorelease watchdog setting: 0 disables it, otherwise the timeout
    /// is 5000ms doubled per step above 1.
    pub autorelease_setting: u8,

    /// Try braille-keyboard chord interpretation even when a binding
    /// matched.
    pub braille_quick_space: bool,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            long_press_time_ms: 300,
            autorepeat_interval_ms: 100,
            autorepeat_enabled: true,
            on_first_release: true,
            autorelease_setting: 0,
            braille_quick_space: false,
        }
    }
}

impl Prefs {
    pub fn from_toml(content: &str) -> Result<Self, PrefsError> {
        toml::from_str(content).map_err(|e| PrefsError::TomlParse(e.to_string()))
    }

    /// Load from a TOML file; a missing file yields the defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, PrefsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn long_press_time(&self) -> Duration {
        Duration::from_millis(self.long_press_time_ms)
    }

    pub fn autorepeat_interval(&self) -> Duration {
        Duration::from_millis(self.autorepeat_interval_ms)
    }

    /// The autorelease timeout per the exponential schedule
    /// `5000ms << (setting - 1)`, or None when disabled.
    pub fn autorelease_time(&self) -> Option<Duration> {
        match self.autorelease_setting {
            0 => None,
            setting => Some(Duration::from_millis(5000u64 << (setting as u64 - 1))),
        }
    }
}
