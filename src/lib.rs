//! Layered, beat-synchronized background music and one-shot sound dispatch
//! for frame-ticked interactive applications.
//!
//! Two managers cover the runtime surface:
//!
//! - [`MusicLayerStack`]: a catalog of beat-annotated [`Track`]s, a bounded
//!   pool of looping voices, and an ordered stack of active tracks with
//!   crossfade envelopes and beat-quantized loop wrapping, advanced once
//!   per frame.
//! - [`OneShotSoundDispatcher`]: a round-robin pool of effect voices with
//!   per-clip retrigger throttling, numeric-suffix clip groups, a cheap
//!   positional falloff, and solo playback that ducks the music stack.
//!
//! Everything runs single-threaded on the host's frame tick. The
//! composition root owns the music stack behind an
//! `Arc<parking_lot::Mutex<_>>` and hands a clone to the dispatcher for
//! solo ducking:
//!
//! ```rust,ignore
//! let settings = AudioSettings::load(&settings_path)?;
//! let output = AudioOutput::open().ok();
//!
//! let music = Arc::new(Mutex::new(MusicLayerStack::new(
//!     tracks,
//!     MusicConfig::from_settings(&settings),
//!     output.as_ref(),
//! )?));
//! let mut sounds = OneShotSoundDispatcher::new(
//!     clips,
//!     SoundConfig::from_settings(&settings),
//!     Arc::clone(&music),
//!     output.as_ref(),
//! )?;
//!
//! // once per frame:
//! music.lock().tick(delta);
//! sounds.tick(delta, listener_position);
//! ```

pub mod error;
pub mod music;
pub mod playback;
pub mod settings;
pub mod sound;

pub use error::{AppResult, AudioError};
pub use music::{beat_to_seconds, FadeState, MusicConfig, MusicLayerStack, Track, TrackStatus, NO_MUSIC};
pub use playback::{AudioBuffer, AudioOutput, Voice};
pub use settings::AudioSettings;
pub use sound::{OneShotSoundDispatcher, Position, SoundConfig};
