//! Session bridge: the duplex relay between a local media endpoint and the
//! upstream live service.
//!
//! The bridge is generic over two seams. [`MediaSource`] produces captured
//! audio frames (a browser WebSocket, a microphone); [`MediaSink`] consumes
//! playback audio and text notices (the same WebSocket, a speaker). One
//! [`session::Session`] supervises the capture, receive, and playback tasks
//! as a single fault domain.

use async_trait::async_trait;

use crate::audio::AudioFrame;
use crate::error::BridgeError;

pub mod playback;
pub mod registry;
pub mod session;
pub mod turn;

pub use playback::PlaybackBuffer;
pub use registry::SessionRegistry;
pub use session::Session;
pub use turn::{TurnController, TurnState};

/// Producer side of the local media endpoint.
#[async_trait]
pub trait MediaSource: Send {
    /// Next captured frame. `Ok(None)` means the producer finished cleanly;
    /// an error means it failed and the session must come down.
    async fn next_frame(&mut self) -> Result<Option<AudioFrame>, BridgeError>;
}

/// Consumer side of the local media endpoint.
#[async_trait]
pub trait MediaSink: Send {
    /// Play one chunk of synthesized PCM.
    async fn play(&mut self, pcm: &[u8]) -> Result<(), BridgeError>;

    /// Deliver one chunk of model response text.
    async fn text(&mut self, text: &str) -> Result<(), BridgeError>;

    /// Notify that the model finished its turn.
    async fn turn_complete(&mut self) -> Result<(), BridgeError>;

    /// Release the endpoint. Called exactly once, at session teardown.
    async fn close(&mut self);
}
