use std::fs;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// Persisted on/off flags for the two audio subsystems.
///
/// Read once at startup; each manager seeds its master volume from the
/// matching flag. A disabled subsystem still dispatches normally, it just
/// runs at zero master volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub is_music_enabled: bool,
    pub is_sound_enabled: bool,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            is_music_enabled: true,
            is_sound_enabled: true,
        }
    }
}

impl AudioSettings {
    /// Load settings from a JSON file.
    /// Creates the default file if it doesn't exist yet.
    pub fn load(path: &Path) -> AppResult<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            let settings = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse settings at {}", path.display()))?;
            Ok(settings)
        } else {
            let settings = Self::default();
            settings.save(path)?;
            tracing::info!("Created default audio settings at {}", path.display());
            Ok(settings)
        }
    }

    /// Save settings to disk as pretty JSON
    pub fn save(&self, path: &Path) -> AppResult<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create settings directory {}", parent.display())
                })?;
            }
        }

        let json = serde_json::to_string_pretty(self).context("Failed to serialize settings")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write settings to {}", path.display()))?;

        Ok(())
    }
}
