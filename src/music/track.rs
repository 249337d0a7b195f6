use std::sync::Arc;

use crate::playback::AudioBuffer;

/// Sentinel name reported when a track has no buffer bound.
pub const NO_MUSIC: &str = "";

/// Convert a beat count to seconds at the given tempo.
/// Returns 0 when either argument is non-positive.
pub fn beat_to_seconds(bpm: f32, beat: f32) -> f32 {
    if beat > 0.0 && bpm > 0.0 {
        beat / bpm * 60.0
    } else {
        0.0
    }
}

/// Per-track fade envelope state.
///
/// The increment is captured once at the transition into a fading state
/// and applied unchanged every tick; if the frame duration changes after
/// the fade starts, the realized fade time drifts with it. That matches
/// the long-standing runtime behavior and stays until a revision is
/// scoped to change it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeState {
    /// No envelope applied; volume holds.
    Idle,
    FadingIn { increment: f32 },
    /// Playing at the volume set by the last `play`.
    Active,
    FadingOut { increment: f32 },
    /// Fade completed; the stack drops the track on this tick.
    PendingRemoval,
}

impl FadeState {
    /// Per-tick volume delta for the current state.
    pub fn increment(&self) -> f32 {
        match self {
            FadeState::FadingIn { increment } | FadeState::FadingOut { increment } => *increment,
            _ => 0.0,
        }
    }
}

/// A music catalog entry: an audio buffer plus beat-synchronized loop
/// metadata. The runtime fields (volume, fade state, bound voice, pause
/// offset) are only meaningful while the track sits on the active stack.
#[derive(Debug, Clone)]
pub struct Track {
    buffer: Option<Arc<AudioBuffer>>,
    pub bpm: f32,
    /// Loop window start, in beats.
    pub beat_start: f32,
    /// Loop window end, in beats. Non-positive means "full buffer length".
    pub beat_end: f32,

    pub(crate) volume: f32,
    pub(crate) fade: FadeState,
    pub(crate) voice: Option<usize>,
    pub(crate) pause_time: f32,
}

impl Track {
    pub fn new(buffer: Arc<AudioBuffer>, bpm: f32, beat_start: f32, beat_end: f32) -> Self {
        Self {
            buffer: Some(buffer),
            bpm,
            beat_start,
            beat_end,
            volume: 1.0,
            fade: FadeState::Idle,
            voice: None,
            pause_time: 0.0,
        }
    }

    /// Catalog slot with no buffer. Resolves to the [`NO_MUSIC`] sentinel
    /// and never matches a play request.
    pub fn unbound() -> Self {
        Self {
            buffer: None,
            bpm: 0.0,
            beat_start: 0.0,
            beat_end: 0.0,
            volume: 1.0,
            fade: FadeState::Idle,
            voice: None,
            pause_time: 0.0,
        }
    }

    /// The buffer's identifier, or [`NO_MUSIC`] when no buffer is bound.
    pub fn name(&self) -> &str {
        self.buffer.as_deref().map(AudioBuffer::name).unwrap_or(NO_MUSIC)
    }

    /// Buffer duration in seconds, 0 when no buffer is bound.
    pub fn length(&self) -> f32 {
        self.buffer.as_deref().map(AudioBuffer::duration).unwrap_or(0.0)
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn fade(&self) -> FadeState {
        self.fade
    }

    /// Playback offset captured by the last stop, consumed by resume.
    pub fn pause_time(&self) -> f32 {
        self.pause_time
    }

    pub(crate) fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        self.buffer.as_ref()
    }

    /// Reset runtime state for a fresh play: full volume, no envelope.
    pub(crate) fn reset_for_play(&mut self) {
        self.volume = 1.0;
        self.fade = FadeState::Active;
        self.pause_time = 0.0;
    }

    /// Enter a fading state with the given per-tick increment.
    ///
    /// Positive increments fade in, with a warm-start guard: a volume
    /// already below the step size is raised to it so the first audible
    /// tick doesn't pop.
    pub(crate) fn begin_fade(&mut self, increment: f32) {
        if increment > 0.0 {
            if self.volume < increment {
                self.volume = increment;
            }
            self.fade = FadeState::FadingIn { increment };
        } else {
            self.fade = FadeState::FadingOut { increment };
        }
    }
}
