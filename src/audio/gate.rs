//! Voice-activity gate applied to outbound audio before forwarding.
//!
//! A frame classified as silence is not dropped: the gate emits a
//! zero-filled frame of identical byte length so the upstream transport
//! keeps seeing a constant-rate stream. Classification is stateless; the
//! same frame and the same scorer always produce the same decision.

use super::AudioFrame;
use crate::config::GateConfig;
use crate::error::BridgeError;

/// Speech-probability model behind the gate.
///
/// Implementations must be deterministic for a given frame and must not
/// retain state across calls. Samples are normalized to `-1.0..=1.0`.
pub trait SpeechScorer: Send + Sync {
    /// Speech probability in `0.0..=1.0` for one 16 kHz mono frame.
    fn score(&self, samples: &[f32]) -> f32;
}

/// RMS-energy scorer used when no neural VAD collaborator is wired in.
///
/// Maps the frame's root-mean-square amplitude against a reference level;
/// anything at or above the reference scores 1.0. An amplitude heuristic,
/// not a speech model — the [`SpeechScorer`] seam is where a real one goes.
#[derive(Debug, Clone)]
pub struct EnergyScorer {
    full_scale_rms: f32,
}

impl Default for EnergyScorer {
    fn default() -> Self {
        Self {
            full_scale_rms: 0.05,
        }
    }
}

impl SpeechScorer for EnergyScorer {
    fn score(&self, samples: &[f32]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }
        let mean_sq: f32 =
            samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        (mean_sq.sqrt() / self.full_scale_rms).min(1.0)
    }
}

/// Outcome of classifying one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Speech,
    Silence,
}

/// The gate itself: a scorer plus the threshold/frame-size parameters.
pub struct VoiceGate {
    scorer: Box<dyn SpeechScorer>,
    config: GateConfig,
}

impl VoiceGate {
    /// Gate with the default energy scorer.
    pub fn new(config: GateConfig) -> Self {
        Self::with_scorer(config, Box::new(EnergyScorer::default()))
    }

    pub fn with_scorer(config: GateConfig, scorer: Box<dyn SpeechScorer>) -> Self {
        Self { scorer, config }
    }

    /// Classify one frame. Fails with [`BridgeError::InvalidFrame`] when
    /// the frame length does not match the configured chunk size; callers
    /// must not forward such a frame.
    pub fn classify(&self, frame: &AudioFrame) -> Result<GateDecision, BridgeError> {
        let expected = self.config.frame_samples * 2;
        if frame.byte_len() != expected {
            return Err(BridgeError::InvalidFrame {
                got: frame.byte_len(),
                expected,
            });
        }

        let samples: Vec<f32> = frame
            .samples()
            .map(|s| f32::from(s) / 32768.0)
            .collect();
        let probability = self.scorer.score(&samples);

        // Threshold is inclusive: exactly 0.80 counts as speech.
        if probability >= self.config.threshold {
            Ok(GateDecision::Speech)
        } else {
            Ok(GateDecision::Silence)
        }
    }

    /// Classify and gate one frame: speech passes through byte-identical,
    /// silence becomes a zero-filled frame of the same byte length.
    pub fn apply(
        &self,
        frame: AudioFrame,
    ) -> Result<(GateDecision, AudioFrame), BridgeError> {
        match self.classify(&frame)? {
            GateDecision::Speech => Ok((GateDecision::Speech, frame)),
            GateDecision::Silence => {
                let silent = frame.silenced();
                Ok((GateDecision::Silence, silent))
            }
        }
    }
}
