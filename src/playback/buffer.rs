//! Preloaded audio buffers
//!
//! Buffers hold the encoded bytes of one clip in memory together with the
//! identifier callers use to request it. Decoding is verified once at load
//! time so playback never has to touch the filesystem.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use rodio::{Decoder, Source};

use crate::error::AudioError;

/// A named, immutable audio clip shared between managers via `Arc`.
#[derive(Debug)]
pub struct AudioBuffer {
    name: String,
    data: Arc<Vec<u8>>,
    duration: f32,
    loaded: bool,
}

impl AudioBuffer {
    /// Read an audio file into memory and verify it decodes.
    pub fn load(name: impl Into<String>, path: &Path) -> Result<Arc<Self>, AudioError> {
        let data = std::fs::read(path).map_err(|e| AudioError::LoadFailed {
            path: path.display().to_string(),
            source: Box::new(e),
        })?;
        Self::from_memory(name, data)
    }

    /// Build a buffer from already-loaded bytes, verifying decodability
    /// and capturing the decoded duration.
    pub fn from_memory(name: impl Into<String>, data: Vec<u8>) -> Result<Arc<Self>, AudioError> {
        let name = name.into();

        // Note: rodio's Decoder requires owned data with 'static lifetime
        let cursor = Cursor::new(data.clone());
        let decoder = Decoder::new(cursor).map_err(|e| AudioError::DecodeFailed {
            name: name.clone(),
            source: Box::new(e),
        })?;

        let duration = match decoder.total_duration() {
            Some(d) => d.as_secs_f32(),
            None => {
                tracing::warn!("No decoded duration available for {}, using 0s", name);
                0.0
            }
        };

        tracing::debug!(
            "Loaded audio buffer {} ({} bytes, {:.2}s)",
            name,
            data.len(),
            duration
        );

        Ok(Arc::new(Self {
            name,
            data: Arc::new(data),
            duration,
            loaded: true,
        }))
    }

    /// Synthetic buffer with no sample data. Plays logically like any other
    /// buffer but produces no device output; used for tests and for hosts
    /// that drive their own sample rendering.
    pub fn silent(name: impl Into<String>, duration: f32) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            data: Arc::new(Vec::new()),
            duration: duration.max(0.0),
            loaded: true,
        })
    }

    /// Catalog entry whose data never finished loading (e.g. the asset file
    /// was missing at startup). Lookups resolve to it, but managers skip
    /// loop and envelope work until a loaded buffer takes its place.
    pub fn placeholder(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            data: Arc::new(Vec::new()),
            duration: 0.0,
            loaded: false,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Clip duration in seconds.
    pub fn duration(&self) -> f32 {
        self.duration
    }

    /// Whether the buffer's data is resident and ready to play.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub(crate) fn data(&self) -> &Arc<Vec<u8>> {
        &self.data
    }
}
