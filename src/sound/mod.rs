//! One-shot and grouped sound effects

pub mod dispatcher;

pub use dispatcher::{OneShotSoundDispatcher, Position, SoundConfig};
