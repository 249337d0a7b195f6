//! Playback primitives shared by both managers
//!
//! - [`AudioBuffer`]: named, preloaded clip data with a verified decode
//! - [`AudioOutput`]: rodio output stream wrapper (optional; everything
//!   runs headless without one)
//! - [`Voice`]: one playback channel with tick-driven logical state

pub mod buffer;
pub mod output;
pub mod voice;

pub use buffer::AudioBuffer;
pub use output::AudioOutput;
pub use voice::Voice;
