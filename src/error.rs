use thiserror::Error;

/// Library-level errors using thiserror for structured error handling.
///
/// Only construction-time failures surface as errors. Playback-time
/// problems (unknown clip, retrigger throttling, empty group) degrade to a
/// logged warning and an empty return instead, so nothing audible is ever
/// a hard failure for the caller.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to decode audio data: {name}")]
    DecodeFailed {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Failed to initialize audio output stream")]
    StreamInitFailed(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("A {0} manager is already enabled in this process")]
    AlreadyEnabled(&'static str),
}

/// Type alias for app-facing Results using anyhow for context chaining
pub type AppResult<T> = anyhow::Result<T>;
