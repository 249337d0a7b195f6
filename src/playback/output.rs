use rodio::{OutputStream, OutputStreamHandle};

use crate::error::AudioError;

/// Handle to the process audio device.
///
/// Keeps the rodio `OutputStream` alive for as long as any manager needs a
/// device; voices clone the stream handle to build their sinks. Managers
/// constructed without an output run headless, which is how the test suite
/// exercises every algorithm without audio hardware.
pub struct AudioOutput {
    _stream: OutputStream,
    handle: OutputStreamHandle,
}

impl AudioOutput {
    /// Open the default output device.
    pub fn open() -> Result<Self, AudioError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| AudioError::StreamInitFailed(Box::new(e)))?;
        tracing::info!("Audio output stream opened");
        Ok(Self {
            _stream: stream,
            handle,
        })
    }

    pub(crate) fn handle(&self) -> &OutputStreamHandle {
        &self.handle
    }
}
