//! Upstream protocol adapter for the Gemini Live streaming API
//! (BidiGenerateContent).
//!
//! `protocol` owns the wire framing: the setup handshake message, the
//! steady-state `realtime_input` frames, and the `serverContent` decoder.
//! `session` owns the WebSocket connection and its send/receive loops.

pub mod protocol;
pub mod session;

pub use session::{LiveSession, Upstream};

/// Event decoded from one upstream frame.
///
/// A single frame can yield several events: an acknowledgement, audio
/// parts, text parts, and a turn-completion marker may all share a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Setup acknowledged; the session may enter steady-state streaming.
    SetupAck,
    /// One chunk of synthesized audio (raw PCM, 24 kHz mono).
    AudioChunk(Vec<u8>),
    /// One chunk of response text.
    TextChunk(String),
    /// The model finished its response turn.
    TurnComplete,
    /// Frame that could not be decoded; dropped, never fatal.
    Malformed(String),
}
