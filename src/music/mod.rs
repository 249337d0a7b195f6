//! Layered, beat-synchronized background music
//!
//! [`MusicLayerStack`] owns a catalog of [`Track`]s, a bounded pool of
//! looping voices, and the ordered stack of tracks currently audible.
//! Loop boundaries are expressed in beats and converted through
//! [`beat_to_seconds`]; fades run as per-tick volume increments captured
//! at fade start (see [`FadeState`]).

pub mod stack;
pub mod track;

pub use stack::{MusicConfig, MusicLayerStack, TrackStatus};
pub use track::{beat_to_seconds, FadeState, Track, NO_MUSIC};
