//! WebSocket session against the Gemini Live endpoint.
//!
//! `connect` dials, sends the setup message, and waits (bounded) for the
//! acknowledgement before returning; a session that exists has already
//! completed its handshake. After that, two background loops own the
//! socket halves: outbound frames flow through a channel so callers never
//! touch the sink, and inbound frames are decoded into [`ServerEvent`]s.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::protocol::{build_audio_message, build_setup_message, parse_server_message};
use super::ServerEvent;
use crate::config::BridgeConfig;
use crate::error::BridgeError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upstream service seam as the bridge sees it.
///
/// [`LiveSession`] is the real implementation; tests substitute scripted
/// ones. `send_frame` and `next_event` are independent directions and are
/// driven by different tasks.
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Forward one gated PCM frame upstream.
    async fn send_frame(&self, pcm: &[u8]) -> Result<(), BridgeError>;

    /// Next decoded event, or `None` once the upstream stream has ended.
    async fn next_event(&self) -> Option<ServerEvent>;

    /// Request an orderly close of the upstream connection. Idempotent.
    async fn shutdown(&self);
}

enum OutboundFrame {
    Audio(Vec<u8>),
    Close,
}

/// Live connection in steady state (setup already acknowledged).
#[derive(Debug)]
pub struct LiveSession {
    out_tx: mpsc::UnboundedSender<OutboundFrame>,
    event_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ServerEvent>>,
}

impl LiveSession {
    /// Dial the endpoint, perform the setup handshake, and start the
    /// send/receive loops. Fails if the dial, the setup send, or the
    /// acknowledgement (within `handshake_timeout`) fails.
    pub async fn connect(session_id: &str, config: &BridgeConfig) -> anyhow::Result<Self> {
        let url = format!("{}?key={}", config.endpoint, config.api_key);
        let (mut stream, _response) = connect_async(url.as_str()).await?;
        tracing::debug!(session_id, "upstream socket established");

        let setup = serde_json::to_string(&build_setup_message(config))?;
        stream.send(WsMessage::Text(setup.into())).await?;

        tokio::time::timeout(config.handshake_timeout, await_ack(&mut stream))
            .await
            .map_err(|_| anyhow::anyhow!("timed out waiting for setup acknowledgement"))??;
        tracing::info!(session_id, model = %config.model, "upstream session ready");

        let (write, read) = stream.split();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let id = session_id.to_string();
        tokio::spawn(outbound_loop(id.clone(), write, out_rx));
        tokio::spawn(inbound_loop(id, read, event_tx));

        Ok(Self {
            out_tx,
            event_rx: tokio::sync::Mutex::new(event_rx),
        })
    }
}

#[async_trait]
impl Upstream for LiveSession {
    async fn send_frame(&self, pcm: &[u8]) -> Result<(), BridgeError> {
        if pcm.is_empty() {
            return Ok(());
        }
        self.out_tx
            .send(OutboundFrame::Audio(pcm.to_vec()))
            .map_err(|_| BridgeError::Connection("upstream send channel closed".into()))
    }

    async fn next_event(&self) -> Option<ServerEvent> {
        self.event_rx.lock().await.recv().await
    }

    async fn shutdown(&self) {
        // A failed send means the outbound loop already exited and the
        // socket is gone; nothing left to close.
        let _ = self.out_tx.send(OutboundFrame::Close);
    }
}

/// Read frames until the setup acknowledgement arrives.
///
/// The endpoint sends its JSON in binary WebSocket frames; text frames are
/// accepted too for forward compatibility.
async fn await_ack(stream: &mut WsStream) -> anyhow::Result<()> {
    while let Some(message) = stream.next().await {
        match message? {
            WsMessage::Text(text) => {
                if parse_server_message(text.as_str()).contains(&ServerEvent::SetupAck) {
                    return Ok(());
                }
            }
            WsMessage::Binary(bytes) if bytes.first() == Some(&b'{') => {
                let text = String::from_utf8(bytes.to_vec())?;
                if parse_server_message(&text).contains(&ServerEvent::SetupAck) {
                    return Ok(());
                }
            }
            WsMessage::Close(frame) => {
                anyhow::bail!("upstream closed during handshake: {frame:?}");
            }
            _ => {}
        }
    }
    anyhow::bail!("upstream stream ended during handshake")
}

async fn outbound_loop(
    session_id: String,
    mut write: futures_util::stream::SplitSink<WsStream, WsMessage>,
    mut out_rx: mpsc::UnboundedReceiver<OutboundFrame>,
) {
    let mut chunk_count: u64 = 0;
    while let Some(frame) = out_rx.recv().await {
        match frame {
            OutboundFrame::Audio(pcm) => {
                let message = match serde_json::to_string(&build_audio_message(&pcm)) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::error!(session_id, error = %e, "audio frame serialization failed");
                        continue;
                    }
                };
                if let Err(e) = write.send(WsMessage::Text(message.into())).await {
                    tracing::error!(session_id, error = %e, "upstream send failed");
                    return;
                }
                chunk_count += 1;
                if chunk_count == 1 || chunk_count % 50 == 0 {
                    tracing::debug!(session_id, chunk_count, "audio chunks forwarded");
                }
            }
            OutboundFrame::Close => {
                if let Err(e) = write.send(WsMessage::Close(None)).await {
                    tracing::debug!(session_id, error = %e, "close frame not delivered");
                }
                return;
            }
        }
    }
}

async fn inbound_loop(
    session_id: String,
    mut read: futures_util::stream::SplitStream<WsStream>,
    event_tx: mpsc::UnboundedSender<ServerEvent>,
) {
    while let Some(message) = read.next().await {
        let text = match message {
            Ok(WsMessage::Text(text)) => text.as_str().to_owned(),
            Ok(WsMessage::Binary(bytes)) if bytes.first() == Some(&b'{') => {
                match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(e) => {
                        tracing::warn!(session_id, error = %e, "non-UTF-8 upstream frame dropped");
                        continue;
                    }
                }
            }
            Ok(WsMessage::Binary(_)) | Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_))
            | Ok(WsMessage::Frame(_)) => continue,
            Ok(WsMessage::Close(frame)) => {
                tracing::info!(session_id, ?frame, "upstream closed the connection");
                break;
            }
            Err(e) => {
                tracing::error!(session_id, error = %e, "upstream read failed");
                break;
            }
        };

        for event in parse_server_message(&text) {
            if let ServerEvent::Malformed(reason) = &event {
                tracing::warn!(session_id, reason, "malformed upstream frame dropped");
                continue;
            }
            if event_tx.send(event).is_err() {
                // Receiver dropped: the bridge is shutting down.
                return;
            }
        }
    }
}
