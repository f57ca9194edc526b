//! Capture devices and audio sinks.
//!
//! Device access is platform-specific and lives outside this crate. These
//! implementations cover text-only sessions, frames pushed from another task,
//! and recording the assistant's voice to disk.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::base::{
    AudioConstraints, AudioSink, CaptureDevice, RealtimeAudioData, RealtimeError, RealtimeResult,
};
use super::openai::OPENAI_REALTIME_SAMPLE_RATE;

/// Frames buffered between a pushing producer and the transport.
const CAPTURE_CHANNEL_CAPACITY: usize = 64;

// =============================================================================
// Capture Devices
// =============================================================================

/// A capture device that never produces audio.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCaptureDevice;

#[async_trait]
impl CaptureDevice for NullCaptureDevice {
    async fn acquire(&self, _constraints: &AudioConstraints) -> RealtimeResult<mpsc::Receiver<Bytes>> {
        // Sender dropped immediately: the stream ends and the transport stops polling it
        let (_tx, rx) = mpsc::channel(1);
        Ok(rx)
    }

    fn release(&self) {}
}

/// Capture device fed by [`ChannelCaptureDevice::push`].
///
/// Each `acquire` opens a fresh stream; `release` ends it.
#[derive(Debug, Default)]
pub struct ChannelCaptureDevice {
    sender: Mutex<Option<mpsc::Sender<Bytes>>>,
    applied: Mutex<Option<AudioConstraints>>,
}

impl ChannelCaptureDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push one PCM16 frame. Returns `false` if the device is not acquired
    /// or the transport is not keeping up.
    pub fn push(&self, frame: Bytes) -> bool {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.try_send(frame).is_ok(),
            None => false,
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.sender.lock().is_some()
    }

    /// Constraints used by the most recent `acquire`.
    pub fn applied_constraints(&self) -> Option<AudioConstraints> {
        self.applied.lock().clone()
    }
}

#[async_trait]
impl CaptureDevice for ChannelCaptureDevice {
    async fn acquire(&self, constraints: &AudioConstraints) -> RealtimeResult<mpsc::Receiver<Bytes>> {
        if constraints.channel_count != 1 {
            return Err(RealtimeError::ConnectionFailed(format!(
                "unsupported channel count {}",
                constraints.channel_count
            )));
        }

        let (tx, rx) = mpsc::channel(CAPTURE_CHANNEL_CAPACITY);
        *self.sender.lock() = Some(tx);
        *self.applied.lock() = Some(constraints.clone());
        Ok(rx)
    }

    fn release(&self) {
        self.sender.lock().take();
    }
}

// =============================================================================
// Sinks
// =============================================================================

/// Discards all audio.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn write(&self, _audio: RealtimeAudioData) {}
}

/// Records the assistant's audio to a 24kHz mono 16-bit WAV file.
pub struct WavFileSink {
    path: PathBuf,
    writer: Mutex<Option<hound::WavWriter<BufWriter<File>>>>,
}

impl WavFileSink {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, hound::Error> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: OPENAI_REALTIME_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(path.as_ref(), spec)?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(Some(writer)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the file. Later writes are dropped.
    pub fn finalize(&self) -> Result<(), hound::Error> {
        match self.writer.lock().take() {
            Some(writer) => writer.finalize(),
            None => Ok(()),
        }
    }
}

impl AudioSink for WavFileSink {
    fn write(&self, audio: RealtimeAudioData) {
        let mut guard = self.writer.lock();
        let Some(writer) = guard.as_mut() else {
            return;
        };

        for chunk in audio.data.chunks_exact(2) {
            let sample = i16::from_le_bytes([chunk[0], chunk[1]]);
            if let Err(e) = writer.write_sample(sample) {
                tracing::error!(path = %self.path.display(), "Failed to write audio sample: {}", e);
                return;
            }
        }
    }
}

impl Drop for WavFileSink {
    fn drop(&mut self) {
        if let Err(e) = self.finalize() {
            tracing::warn!(path = %self.path.display(), "Failed to finalize recording: {}", e);
        }
    }
}
