//! Application settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::AppPaths;

// ---------------------------------------------------------------------------
// AudioSettings
// ---------------------------------------------------------------------------

/// Settings for audio output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Output device name — `None` means the system default.
    pub device: Option<String>,
    /// Linear output gain (0.0 – 1.0).
    pub volume: f32,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            device: None,
            volume: 1.0,
        }
    }
}

// ---------------------------------------------------------------------------
// RepeatSettings
// ---------------------------------------------------------------------------

/// Settings for repeat-mode looping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepeatSettings {
    /// Silence between loop iterations, in milliseconds.
    pub gap_ms: u64,
}

impl Default for RepeatSettings {
    fn default() -> Self {
        Self { gap_ms: 500 }
    }
}

// ---------------------------------------------------------------------------
// LibrarySettings
// ---------------------------------------------------------------------------

/// Where book bundles live.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibrarySettings {
    /// Book directory — `None` means the platform data dir
    /// ([`AppPaths::books_dir`]).
    pub books_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// ReaderConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level application configuration, serialised as `settings.toml`.
///
/// # Persistence
///
/// ```rust,no_run
/// use storytap::config::ReaderConfig;
///
/// // Load (returns Default when file is missing)
/// let config = ReaderConfig::load().unwrap();
///
/// // Modify and save
/// // config.save().unwrap();
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReaderConfig {
    /// Audio output settings.
    pub audio: AudioSettings,
    /// Repeat-mode settings.
    pub repeat: RepeatSettings,
    /// Book library settings.
    pub library: LibrarySettings,
}

impl ReaderConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(ReaderConfig::default())` when the file does not exist
    /// yet (first-run scenario) so callers never need to special-case a
    /// missing file.
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

    /// Returns `true` when no `settings.toml` file exists yet.
    pub fn is_first_run() -> bool {
        !AppPaths::new().settings_file.exists()
    }

    /// Resolved book directory, honouring the override.
    pub fn books_dir(&self) -> PathBuf {
        self.library
            .books_dir
            .clone()
            .unwrap_or_else(|| AppPaths::new().books_dir)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
