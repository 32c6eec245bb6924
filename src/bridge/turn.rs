//! Turn-taking state machine.
//!
//! Capture frames are forwarded only while the session is `Listening`.
//! While the model speaks, captured audio is suppressed entirely rather
//! than gated, so speaker output cannot echo back in as input and retrigger
//! the model. `TurnComplete` both returns the session to `Listening` and
//! flushes unplayed audio — that flush is what makes barge-in cut the old
//! response off instead of letting it drain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::playback::PlaybackBuffer;
use crate::audio::gate::VoiceGate;
use crate::audio::AudioFrame;
use crate::error::BridgeError;
use crate::live::ServerEvent;

/// Who holds the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Capture flows upstream through the gate.
    Listening,
    /// The model is responding; capture is suppressed.
    ModelSpeaking,
    /// Teardown has begun; everything is discarded.
    Closing,
}

/// Notice for the local endpoint, produced while consuming server events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnNotice {
    Text(String),
    TurnComplete,
}

pub struct TurnController {
    state: Mutex<TurnState>,
    playback: Arc<PlaybackBuffer>,
    gate: VoiceGate,
    forwarded: AtomicU64,
}

impl TurnController {
    pub fn new(gate: VoiceGate, playback: Arc<PlaybackBuffer>) -> Self {
        Self {
            state: Mutex::new(TurnState::Listening),
            playback,
            gate,
            forwarded: AtomicU64::new(0),
        }
    }

    /// Decide what happens to one captured frame.
    ///
    /// `Listening`: the frame passes through the gate (silence becomes a
    /// zero-filled frame) and should be forwarded. Any other state: the
    /// frame is suppressed and `None` is returned. A wrong-size frame is an
    /// error and must not be forwarded.
    pub fn admit(&self, frame: AudioFrame) -> Result<Option<AudioFrame>, BridgeError> {
        if *self.state.lock() != TurnState::Listening {
            return Ok(None);
        }
        let (_decision, gated) = self.gate.apply(frame)?;
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        Ok(Some(gated))
    }

    /// Apply one server event to the turn state, returning any notice the
    /// local endpoint should see.
    pub fn on_server_event(&self, event: ServerEvent) -> Option<TurnNotice> {
        let mut state = self.state.lock();
        if *state == TurnState::Closing {
            return None;
        }
        match event {
            ServerEvent::AudioChunk(pcm) => {
                self.playback.enqueue(pcm);
                *state = TurnState::ModelSpeaking;
                None
            }
            ServerEvent::TextChunk(text) => Some(TurnNotice::Text(text)),
            ServerEvent::TurnComplete => {
                let dropped = self.playback.flush();
                if dropped > 0 {
                    tracing::debug!(dropped, "flushed unplayed audio at turn boundary");
                }
                *state = TurnState::Listening;
                Some(TurnNotice::TurnComplete)
            }
            ServerEvent::SetupAck => None,
            ServerEvent::Malformed(reason) => {
                tracing::warn!(reason, "malformed server event ignored");
                None
            }
        }
    }

    /// Enter `Closing`: all later frames and events are discarded.
    pub fn begin_close(&self) {
        *self.state.lock() = TurnState::Closing;
    }

    pub fn state(&self) -> TurnState {
        *self.state.lock()
    }

    /// Frames forwarded upstream so far (gated silence included).
    pub fn forwarded_frames(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::gate::SpeechScorer;
    use crate::config::GateConfig;

    struct FixedScorer(f32);

    impl SpeechScorer for FixedScorer {
        fn score(&self, _samples: &[f32]) -> f32 {
            self.0
        }
    }

    fn controller(score: f32) -> (Arc<PlaybackBuffer>, TurnController) {
        let playback = Arc::new(PlaybackBuffer::new());
        let gate = VoiceGate::with_scorer(GateConfig::default(), Box::new(FixedScorer(score)));
        let turn = TurnController::new(gate, Arc::clone(&playback));
        (playback, turn)
    }

    fn frame() -> AudioFrame {
        AudioFrame::capture(vec![0x11; 1024], 0)
    }

    #[test]
    fn listening_frames_are_forwarded() {
        let (_playback, turn) = controller(1.0);
        let out = turn.admit(frame()).unwrap();
        assert!(out.is_some());
        assert_eq!(turn.forwarded_frames(), 1);
    }

    #[test]
    fn silence_is_forwarded_zero_filled() {
        let (_playback, turn) = controller(0.0);
        let out = turn.admit(frame()).unwrap().unwrap();
        assert_eq!(out.byte_len(), 1024);
        assert!(out.pcm.iter().all(|&b| b == 0));
    }

    #[test]
    fn capture_is_suppressed_while_model_speaks() {
        let (_playback, turn) = controller(1.0);
        turn.on_server_event(ServerEvent::AudioChunk(vec![1, 2]));
        assert_eq!(turn.state(), TurnState::ModelSpeaking);

        assert!(turn.admit(frame()).unwrap().is_none());
        assert!(turn.admit(frame()).unwrap().is_none());
        assert_eq!(turn.forwarded_frames(), 0);
    }

    #[test]
    fn turn_complete_returns_to_listening_and_flushes() {
        let (playback, turn) = controller(1.0);
        for _ in 0..5 {
            turn.on_server_event(ServerEvent::AudioChunk(vec![0u8; 32]));
        }
        assert_eq!(playback.len(), 5);

        let notice = turn.on_server_event(ServerEvent::TurnComplete);
        assert_eq!(notice, Some(TurnNotice::TurnComplete));
        assert_eq!(turn.state(), TurnState::Listening);
        assert_eq!(playback.len(), 0);

        assert!(turn.admit(frame()).unwrap().is_some());
    }

    #[tokio::test]
    async fn unplayed_audio_is_dropped_not_played_late() {
        // Five chunks arrive, two get played, then the turn ends: the
        // remaining three must vanish from the queue.
        let (playback, turn) = controller(1.0);
        for i in 0..5u8 {
            turn.on_server_event(ServerEvent::AudioChunk(vec![i; 8]));
        }
        assert_eq!(playback.dequeue().await, Some(vec![0; 8]));
        assert_eq!(playback.dequeue().await, Some(vec![1; 8]));
        assert_eq!(playback.len(), 3);

        turn.on_server_event(ServerEvent::TurnComplete);
        assert_eq!(playback.len(), 0);
    }

    #[test]
    fn closing_discards_frames_and_events() {
        let (playback, turn) = controller(1.0);
        turn.begin_close();
        assert_eq!(turn.state(), TurnState::Closing);

        assert!(turn.admit(frame()).unwrap().is_none());
        assert!(turn
            .on_server_event(ServerEvent::AudioChunk(vec![1]))
            .is_none());
        assert!(turn.on_server_event(ServerEvent::TurnComplete).is_none());
        assert_eq!(turn.state(), TurnState::Closing);
        assert!(playback.is_empty());
    }

    #[test]
    fn text_chunks_become_notices() {
        let (_playback, turn) = controller(1.0);
        let notice = turn.on_server_event(ServerEvent::TextChunk("hi".into()));
        assert_eq!(notice, Some(TurnNotice::Text("hi".into())));
    }

    #[test]
    fn invalid_frame_size_is_an_error() {
        let (_playback, turn) = controller(1.0);
        let short = AudioFrame::capture(vec![0u8; 10], 0);
        let err = turn.admit(short).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidFrame { .. }));
        assert_eq!(turn.forwarded_frames(), 0);
    }
}
