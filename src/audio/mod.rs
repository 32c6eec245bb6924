//! Audio primitives: PCM frames, the voice-activity gate, and blocking
//! device adapters.

pub mod device;
pub mod gate;

/// Sample rate the upstream service expects for input audio.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized audio coming back from the service.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// One captured frame of raw mono 16-bit little-endian PCM.
///
/// Produced once by capture, consumed once by the gate/adapter. The
/// sequence number is monotonic per session and exists for ordering
/// diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    /// Raw PCM bytes, two bytes per sample.
    pub pcm: Vec<u8>,
    /// Sample rate this frame was captured or synthesized at.
    pub sample_rate: u32,
    /// Monotonic sequence number within the session.
    pub seq: u64,
}

impl AudioFrame {
    pub fn new(pcm: Vec<u8>, sample_rate: u32, seq: u64) -> Self {
        Self {
            pcm,
            sample_rate,
            seq,
        }
    }

    /// Frame captured at the inbound rate (16 kHz).
    pub fn capture(pcm: Vec<u8>, seq: u64) -> Self {
        Self::new(pcm, INPUT_SAMPLE_RATE, seq)
    }

    pub fn byte_len(&self) -> usize {
        self.pcm.len()
    }

    /// Decode the PCM bytes as little-endian signed 16-bit samples.
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }

    /// Zero-filled frame of identical byte length, same tag data.
    pub fn silenced(&self) -> Self {
        Self {
            pcm: vec![0u8; self.pcm.len()],
            sample_rate: self.sample_rate,
            seq: self.seq,
        }
    }
}
