//! Bridge error taxonomy.
//!
//! Propagation policy: device- and decode-level errors are handled at the
//! call site and never escalate on their own; connection-level errors (and
//! device errors that survive the retry budget) always tear down the whole
//! session. Cancellation is not a failure.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    /// Upstream unreachable, handshake rejected, or the streaming
    /// connection dropped mid-session.
    #[error("upstream connection error: {0}")]
    Connection(String),

    /// Microphone/speaker I/O failure that exhausted its retry budget.
    #[error("audio device error: {0}")]
    Device(String),

    /// Malformed or partially-shaped protocol frame. The offending event
    /// is dropped; the session continues.
    #[error("protocol decode error: {0}")]
    Decode(String),

    /// Audio frame of unexpected size reaching the voice-activity gate.
    /// The frame is rejected and must not be forwarded.
    #[error("invalid audio frame: got {got} bytes, expected {expected}")]
    InvalidFrame { got: usize, expected: usize },

    /// Cooperative shutdown in progress. Triggers clean resource release.
    #[error("session cancelled")]
    Cancelled,
}

impl BridgeError {
    /// Whether this error tears down the session it occurred in.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Device(_))
    }
}
