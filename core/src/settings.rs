//! Settings persistence
//!
//! The assistant reads its enabled flag, language and volume from a store at
//! startup and writes them back on every change. Two stores ship here:
//! - `MemorySettingsStore` - tests and embedding hosts that persist elsewhere
//! - `FileSettingsStore` - a small TOML file

use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::language::Language;
use crate::{BusVoiceError, Result};

/// Default output volume when nothing has been stored yet
pub const DEFAULT_VOLUME: f32 = 0.8;

/// Persisted assistant preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub enabled: bool,
    pub language: Language,
    pub volume: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: false,
            language: Language::English,
            volume: DEFAULT_VOLUME,
        }
    }
}

impl Settings {
    /// Copy with the volume clamped into 0.0..=1.0 (NaN becomes the default)
    pub fn sanitized(mut self) -> Self {
        self.volume = clamp_volume(self.volume);
        self
    }
}

pub(crate) fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        DEFAULT_VOLUME
    } else {
        volume.clamp(0.0, 1.0)
    }
}

/// External persistence for [`Settings`]
pub trait SettingsStore: Send + Sync {
    /// `Ok(None)` when nothing has been saved yet
    fn load(&self) -> Result<Option<Settings>>;

    fn save(&self, settings: &Settings) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    current: Mutex<Option<Settings>>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            current: Mutex::new(Some(settings)),
        }
    }

    /// Last saved value
    pub fn current(&self) -> Option<Settings> {
        self.current.lock().clone()
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Option<Settings>> {
        Ok(self.current())
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        *self.current.lock() = Some(settings.clone());
        Ok(())
    }
}

/// TOML file store
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<Option<Settings>> {
        if !self.path.exists() {
            debug!(target: "settings", path = ?self.path, "No settings file yet");
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        let settings: Settings = toml::from_str(&raw)?;
        info!(target: "settings", path = ?self.path, language = %settings.language, "Loaded settings");
        Ok(Some(settings.sanitized()))
    }

    fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let body = toml::to_string_pretty(settings)?;
        // Write aside then rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path).map_err(|e| {
            BusVoiceError::Settings(format!("failed to replace {}: {}", self.path.display(), e))
        })?;
        debug!(target: "settings", path = ?self.path, "Saved settings");
        Ok(())
    }
}
