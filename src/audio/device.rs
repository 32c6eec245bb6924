//! Blocking audio device adapters.
//!
//! Microphone reads and speaker writes are blocking calls, so they run on
//! the blocking pool via `spawn_blocking` and cannot stall the session's
//! protocol tasks. Read/write errors are retried with a short fixed delay
//! up to a small bound before escalating to a fatal device error.
//!
//! The actual device backends (ALSA, CoreAudio, a test fixture) live behind
//! the [`InputDevice`] / [`OutputDevice`] traits; this module only supplies
//! the offloading and retry machinery.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::AudioFrame;
use crate::bridge::{MediaSink, MediaSource};
use crate::error::BridgeError;

/// Attempts beyond the first before a device error becomes fatal.
pub const DEVICE_RETRY_LIMIT: u32 = 3;

/// Fixed delay between device retries.
pub const DEVICE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Blocking microphone-like source of fixed-size PCM frames.
pub trait InputDevice: Send + 'static {
    /// Blocking read of one frame of raw PCM bytes.
    fn read_frame(&mut self) -> io::Result<Vec<u8>>;
}

/// Blocking speaker-like consumer of PCM chunks.
pub trait OutputDevice: Send + 'static {
    /// Blocking write of one chunk of raw PCM bytes.
    fn write_chunk(&mut self, pcm: &[u8]) -> io::Result<()>;
}

// ── Capture side ───────────────────────────────────────────────────

/// [`MediaSource`] reading from a blocking input device.
pub struct DeviceSource<D: InputDevice> {
    device: Arc<Mutex<D>>,
    seq: u64,
}

impl<D: InputDevice> DeviceSource<D> {
    pub fn new(device: D) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
            seq: 0,
        }
    }
}

#[async_trait]
impl<D: InputDevice> MediaSource for DeviceSource<D> {
    async fn next_frame(&mut self) -> Result<Option<AudioFrame>, BridgeError> {
        let mut attempt = 0u32;
        loop {
            let device = Arc::clone(&self.device);
            let read = tokio::task::spawn_blocking(move || device.lock().read_frame())
                .await
                .map_err(|e| BridgeError::Device(format!("capture worker failed: {e}")))?;

            match read {
                Ok(pcm) => {
                    let frame = AudioFrame::capture(pcm, self.seq);
                    self.seq += 1;
                    return Ok(Some(frame));
                }
                Err(e) if attempt < DEVICE_RETRY_LIMIT => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "audio capture error, retrying");
                    tokio::time::sleep(DEVICE_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(BridgeError::Device(format!("microphone read failed: {e}")));
                }
            }
        }
    }
}

// ── Playback side ──────────────────────────────────────────────────

/// [`MediaSink`] writing to a blocking output device.
///
/// Text and turn notices have no speaker representation; they are logged,
/// matching what a headless host would want to see.
pub struct DeviceSink<D: OutputDevice> {
    device: Arc<Mutex<D>>,
}

impl<D: OutputDevice> DeviceSink<D> {
    pub fn new(device: D) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
        }
    }
}

#[async_trait]
impl<D: OutputDevice> MediaSink for DeviceSink<D> {
    async fn play(&mut self, pcm: &[u8]) -> Result<(), BridgeError> {
        let mut attempt = 0u32;
        loop {
            let device = Arc::clone(&self.device);
            let chunk = pcm.to_vec();
            let wrote = tokio::task::spawn_blocking(move || device.lock().write_chunk(&chunk))
                .await
                .map_err(|e| BridgeError::Device(format!("playback worker failed: {e}")))?;

            match wrote {
                Ok(()) => return Ok(()),
                Err(e) if attempt < DEVICE_RETRY_LIMIT => {
                    attempt += 1;
                    tracing::warn!(error = %e, attempt, "audio playback error, retrying");
                    tokio::time::sleep(DEVICE_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(BridgeError::Device(format!("speaker write failed: {e}")));
                }
            }
        }
    }

    async fn text(&mut self, text: &str) -> Result<(), BridgeError> {
        tracing::info!(text = %text, "model text response");
        Ok(())
    }

    async fn turn_complete(&mut self) -> Result<(), BridgeError> {
        tracing::debug!("model turn complete");
        Ok(())
    }

    async fn close(&mut self) {
        tracing::debug!("audio output released");
    }
}
