//! livebridge — duplex session bridge between a local audio/video producer
//! and the Gemini Live streaming API.
//!
//! A session relays gated microphone audio upstream and plays synthesized
//! audio back, with turn-taking so the model never hears itself. Browser
//! clients connect through the WebSocket gateway in [`server`]; headless
//! hosts can wire real devices through the adapters in [`audio::device`].

pub mod audio;
pub mod bridge;
pub mod config;
pub mod describe;
pub mod error;
pub mod live;
pub mod server;

pub use error::BridgeError;
