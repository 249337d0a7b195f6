//! Playback voices
//!
//! A voice is one playback channel: it holds at most one buffer and plays
//! it from a position that advances with the host's frame tick. The
//! logical state is authoritative so behavior is identical with or without
//! a device. When an output handle is attached the state is mirrored into
//! a rodio `Sink`, best effort: a sink failure downgrades the voice to
//! logical-only playback with a logged warning.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use rodio::source::ChannelVolume;
use rodio::{Decoder, OutputStreamHandle, Sink, Source};

use super::buffer::AudioBuffer;

pub struct Voice {
    id: usize,
    buffer: Option<Arc<AudioBuffer>>,
    playing: bool,
    looping: bool,
    position: f32,
    volume: f32,
    pan: f32,
    output: Option<OutputStreamHandle>,
    sink: Option<Sink>,
}

impl Voice {
    pub fn new(id: usize, output: Option<OutputStreamHandle>) -> Self {
        Self {
            id,
            buffer: None,
            playing: false,
            looping: false,
            position: 0.0,
            volume: 1.0,
            pan: 0.0,
            output,
            sink: None,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Bind a buffer to this voice. Takes effect on the next [`start`].
    ///
    /// [`start`]: Voice::start
    pub fn bind(&mut self, buffer: Arc<AudioBuffer>) {
        self.buffer = Some(buffer);
    }

    pub fn buffer(&self) -> Option<&Arc<AudioBuffer>> {
        self.buffer.as_ref()
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Move the playback position, clamped to the bound buffer's length.
    pub fn seek(&mut self, seconds: f32) {
        let limit = self.buffer.as_ref().map(|b| b.duration()).unwrap_or(0.0);
        self.position = seconds.clamp(0.0, limit.max(0.0));
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.try_seek(Duration::from_secs_f32(self.position)) {
                tracing::trace!("Voice {}: device seek unsupported: {:?}", self.id, e);
            }
        }
    }

    /// Begin playback from the current position.
    pub fn start(&mut self) {
        self.playing = true;
        self.rebuild_sink();
    }

    /// Stop playback immediately.
    pub fn stop(&mut self) {
        self.playing = false;
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Current playback position in seconds.
    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        if let Some(sink) = &self.sink {
            sink.set_volume(self.volume);
        }
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Stereo pan in `[-1, 1]`, applied when playback starts.
    pub fn set_pan(&mut self, pan: f32) {
        self.pan = pan.clamp(-1.0, 1.0);
    }

    pub fn pan(&self) -> f32 {
        self.pan
    }

    /// Advance the playback position by one frame. Non-looping voices stop
    /// at the end of their buffer; looping voices wrap at its full length.
    pub fn advance(&mut self, delta: f32) {
        if !self.playing || delta <= 0.0 {
            return;
        }
        self.position += delta;

        let Some(duration) = self.buffer.as_ref().map(|b| b.duration()) else {
            return;
        };
        if self.looping {
            if duration > 0.0 && self.position >= duration {
                self.position %= duration;
            }
        } else if self.position >= duration {
            self.position = duration;
            self.playing = false;
            // the sink drained on its own at this point
            self.sink = None;
        }
    }

    fn rebuild_sink(&mut self) {
        self.sink = None;
        let Some(handle) = self.output.as_ref() else {
            return;
        };
        let Some(buffer) = self.buffer.as_ref() else {
            return;
        };
        if !buffer.is_loaded() || buffer.data().is_empty() {
            return;
        }

        // Note: rodio's Decoder requires owned data with 'static lifetime
        let cursor = Cursor::new(buffer.data().as_ref().clone());
        let decoder = match Decoder::new(cursor) {
            Ok(decoder) => decoder,
            Err(e) => {
                tracing::warn!("Voice {}: failed to decode {}: {}", self.id, buffer.name(), e);
                return;
            }
        };
        let sink = match Sink::try_new(handle) {
            Ok(sink) => sink,
            Err(e) => {
                tracing::warn!("Voice {}: failed to create sink: {}", self.id, e);
                return;
            }
        };

        // Each adapter returns a different type, so chain through dynamic
        // dispatch.
        let mut source: Box<dyn Source<Item = i16> + Send> = Box::new(decoder);
        if self.looping {
            source = Box::new(source.repeat_infinite());
        }
        if self.position > 0.0 {
            source = Box::new(source.skip_duration(Duration::from_secs_f32(self.position)));
        }

        let (left, right) = pan_gains(self.pan);
        sink.append(ChannelVolume::new(source, vec![left, right]));
        sink.set_volume(self.volume);
        sink.play();
        self.sink = Some(sink);
    }
}

/// Linear per-channel gains for a stereo pan in `[-1, 1]`.
fn pan_gains(pan: f32) -> (f32, f32) {
    (1.0 - pan.max(0.0), 1.0 + pan.min(0.0))
}
