//! WebSocket gateway for browser clients.
//!
//! One client connection maps to one bridge session. The client speaks a
//! small tagged-JSON protocol: `audio` messages carry base64 PCM and feed
//! the live stream; `video` messages carry a base64 JPEG and take the
//! one-shot describe path, answered directly with a `text` message. The
//! describe path never touches turn state, so a frame description cannot
//! interrupt or terminate a voice exchange in flight.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use base64::Engine;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tower_http::cors::CorsLayer;

use crate::audio::AudioFrame;
use crate::audio::gate::VoiceGate;
use crate::bridge::{MediaSink, MediaSource, Session, SessionRegistry};
use crate::config::BridgeConfig;
use crate::describe::FrameDescriber;
use crate::error::BridgeError;
use crate::live::LiveSession;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BridgeConfig>,
    pub registry: Arc<SessionRegistry>,
    pub describer: Arc<dyn FrameDescriber>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until interrupted.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "gateway listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "shutdown signal handler failed");
    }
    tracing::info!("shutting down");
}

// ── Client wire protocol ───────────────────────────────────────────

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientMessage {
    /// Base64 16 kHz mono PCM for the live stream.
    Audio { data: String },
    /// Base64 JPEG for the one-shot describe path.
    Video { data: String },
}

#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientOutbound {
    Text { data: String },
    /// Base64 24 kHz mono PCM from the model.
    Audio { data: String },
    TurnComplete { data: bool },
}

/// Decode a base64 media payload, tolerating a `data:` URL prefix.
fn decode_media_payload(data: &str) -> Result<Vec<u8>, BridgeError> {
    let b64 = match data.rsplit_once(',') {
        Some((_, tail)) => tail,
        None => data,
    };
    base64::engine::general_purpose::STANDARD
        .decode(b64)
        .map_err(|e| BridgeError::Decode(format!("bad media payload: {e}")))
}

// ── Session plumbing ───────────────────────────────────────────────

/// [`MediaSource`] fed by the client read loop.
struct ChannelSource {
    rx: mpsc::UnboundedReceiver<AudioFrame>,
}

#[async_trait]
impl MediaSource for ChannelSource {
    async fn next_frame(&mut self) -> Result<Option<AudioFrame>, BridgeError> {
        Ok(self.rx.recv().await)
    }
}

/// [`MediaSink`] forwarding to the client writer task.
struct WsSink {
    out_tx: mpsc::UnboundedSender<ClientOutbound>,
    session_id: String,
}

impl WsSink {
    fn send(&self, message: ClientOutbound) -> Result<(), BridgeError> {
        self.out_tx
            .send(message)
            .map_err(|_| BridgeError::Connection("client writer gone".into()))
    }
}

#[async_trait]
impl MediaSink for WsSink {
    async fn play(&mut self, pcm: &[u8]) -> Result<(), BridgeError> {
        let data = base64::engine::general_purpose::STANDARD.encode(pcm);
        self.send(ClientOutbound::Audio { data })
    }

    async fn text(&mut self, text: &str) -> Result<(), BridgeError> {
        self.send(ClientOutbound::Text {
            data: text.to_string(),
        })
    }

    async fn turn_complete(&mut self) -> Result<(), BridgeError> {
        self.send(ClientOutbound::TurnComplete { data: true })
    }

    async fn close(&mut self) {
        tracing::debug!(session_id = %self.session_id, "client sink released");
    }
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

async fn client_session(socket: WebSocket, state: AppState) {
    let session_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(session_id, "client connected");

    let (ws_write, ws_read) = socket.split();
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_loop(ws_write, out_rx));

    // The upstream handshake happens before any bridge task exists; a
    // client whose session cannot be established gets told and dropped.
    let upstream = match LiveSession::connect(&session_id, &state.config).await {
        Ok(live) => Arc::new(live),
        Err(e) => {
            tracing::error!(session_id, error = %e, "upstream connect failed");
            let _ = out_tx.send(ClientOutbound::Text {
                data: "could not reach the voice service, try again later".into(),
            });
            drop(out_tx);
            let _ = writer.await;
            return;
        }
    };

    let (frame_tx, frame_rx) = mpsc::unbounded_channel();
    let session = Session::open(
        session_id.clone(),
        Box::new(ChannelSource { rx: frame_rx }),
        Box::new(WsSink {
            out_tx: out_tx.clone(),
            session_id: session_id.clone(),
        }),
        upstream,
        VoiceGate::new(state.config.gate.clone()),
        Some(Arc::clone(&state.registry)),
    );

    // The read loop races session death: a fatal upstream error must close
    // the client socket even when the client is idle.
    tokio::select! {
        _ = read_loop(ws_read, &session_id, &state, &frame_tx, &out_tx) => {}
        _ = session.closed() => {
            tracing::warn!(session_id, "session ended while client still connected");
            let _ = out_tx.send(ClientOutbound::Text {
                data: "voice session ended, reconnect to continue".into(),
            });
        }
    }

    drop(frame_tx);
    session.close();
    session.closed().await;
    drop(out_tx);
    let _ = writer.await;
    tracing::info!(session_id, "client disconnected");
}

async fn read_loop(
    mut ws_read: SplitStream<WebSocket>,
    session_id: &str,
    state: &AppState,
    frame_tx: &mpsc::UnboundedSender<AudioFrame>,
    out_tx: &mpsc::UnboundedSender<ClientOutbound>,
) {
    let mut seq: u64 = 0;
    while let Some(message) = ws_read.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "client read failed");
                break;
            }
        };

        let parsed: ClientMessage = match serde_json::from_str(text.as_str()) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "unrecognized client message dropped");
                continue;
            }
        };

        match parsed {
            ClientMessage::Audio { data } => match decode_media_payload(&data) {
                Ok(pcm) => {
                    if frame_tx.send(AudioFrame::capture(pcm, seq)).is_err() {
                        // Bridge is gone; nothing left to feed.
                        break;
                    }
                    seq += 1;
                }
                Err(e) => {
                    tracing::warn!(session_id, error = %e, "bad audio payload dropped");
                }
            },
            ClientMessage::Video { data } => {
                handle_video_frame(&data, state.describer.as_ref(), out_tx, session_id).await;
            }
        }
    }
}

/// One-shot describe path: decode the JPEG, ask the describer, answer with
/// a single `text` message. Failures are logged and swallowed; the live
/// stream is unaffected either way.
async fn handle_video_frame(
    data: &str,
    describer: &dyn FrameDescriber,
    out_tx: &mpsc::UnboundedSender<ClientOutbound>,
    session_id: &str,
) {
    let jpeg = match decode_media_payload(data) {
        Ok(jpeg) => jpeg,
        Err(e) => {
            tracing::warn!(session_id, error = %e, "bad video payload dropped");
            return;
        }
    };

    match describer.describe(&jpeg).await {
        Ok(description) => {
            let _ = out_tx.send(ClientOutbound::Text { data: description });
        }
        Err(e) => {
            tracing::warn!(session_id, error = %e, "frame description failed");
        }
    }
}

async fn write_loop(
    mut ws_write: SplitSink<WebSocket, Message>,
    mut out_rx: mpsc::UnboundedReceiver<ClientOutbound>,
) {
    while let Some(outbound) = out_rx.recv().await {
        let json = match serde_json::to_string(&outbound) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "client message serialization failed");
                continue;
            }
        };
        if ws_write.send(Message::Text(json.into())).await.is_err() {
            // Client is gone; drain silently until the session notices.
            break;
        }
    }
    let _ = ws_write.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audio_message_parses() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type": "audio", "data": "AAAA"}"#).unwrap();
        assert_eq!(
            parsed,
            ClientMessage::Audio {
                data: "AAAA".into()
            }
        );
    }

    #[test]
    fn video_message_parses() {
        let parsed: ClientMessage =
            serde_json::from_str(r#"{"type": "video", "data": "/9j/4A=="}"#).unwrap();
        assert!(matches!(parsed, ClientMessage::Video { .. }));
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let parsed: Result<ClientMessage, _> =
            serde_json::from_str(r#"{"type": "screenshot", "data": "x"}"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn outbound_messages_serialize_with_snake_case_tags() {
        let json = serde_json::to_string(&ClientOutbound::TurnComplete { data: true }).unwrap();
        assert_eq!(json, r#"{"type":"turn_complete","data":true}"#);

        let json = serde_json::to_string(&ClientOutbound::Text {
            data: "hi".into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"text","data":"hi"}"#);
    }

    #[test]
    fn media_payload_decodes_plain_base64() {
        let b64 = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);
        assert_eq!(decode_media_payload(&b64).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn media_payload_strips_data_url_prefix() {
        let b64 = base64::engine::general_purpose::STANDARD.encode([9u8, 8]);
        let url = format!("data:image/jpeg;base64,{b64}");
        assert_eq!(decode_media_payload(&url).unwrap(), vec![9, 8]);
    }

    #[test]
    fn bad_media_payload_is_a_decode_error() {
        let err = decode_media_payload("!!!not-base64!!!").unwrap_err();
        assert!(matches!(err, BridgeError::Decode(_)));
    }

    struct StubDescriber;

    #[async_trait]
    impl FrameDescriber for StubDescriber {
        async fn describe(&self, _jpeg: &[u8]) -> anyhow::Result<String> {
            Ok("a cat on a keyboard".into())
        }
    }

    struct FailingDescriber;

    #[async_trait]
    impl FrameDescriber for FailingDescriber {
        async fn describe(&self, _jpeg: &[u8]) -> anyhow::Result<String> {
            anyhow::bail!("quota exceeded")
        }
    }

    #[tokio::test]
    async fn video_frame_gets_exactly_one_text_reply() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let b64 = base64::engine::general_purpose::STANDARD.encode([0xFFu8, 0xD8]);

        handle_video_frame(&b64, &StubDescriber, &out_tx, "s-video").await;
        drop(out_tx);

        let mut replies = Vec::new();
        while let Some(reply) = out_rx.recv().await {
            replies.push(reply);
        }
        assert_eq!(
            replies,
            vec![ClientOutbound::Text {
                data: "a cat on a keyboard".into()
            }]
        );
    }

    #[tokio::test]
    async fn failed_description_sends_nothing() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let b64 = base64::engine::general_purpose::STANDARD.encode([1u8]);

        handle_video_frame(&b64, &FailingDescriber, &out_tx, "s-video").await;
        drop(out_tx);
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn undecodable_video_payload_sends_nothing() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        handle_video_frame("###", &StubDescriber, &out_tx, "s-video").await;
        drop(out_tx);
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn fatal_upstream_error_closes_an_idle_client_socket() {
        use std::time::Duration;
        use tokio::net::TcpListener;
        use tokio_tungstenite::tungstenite::Message as TtMessage;

        // Fake upstream: acknowledge the setup, then drop the connection.
        let upstream_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let upstream_endpoint = format!("ws://{}", upstream_listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (stream, _) = upstream_listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            let _setup = ws.next().await;
            ws.send(TtMessage::Text(r#"{"setupComplete":{}}"#.into()))
                .await
                .unwrap();
        });

        let state = AppState {
            config: Arc::new(BridgeConfig {
                api_key: "test-key".into(),
                endpoint: upstream_endpoint,
                ..BridgeConfig::default()
            }),
            registry: Arc::new(SessionRegistry::new()),
            describer: Arc::new(StubDescriber),
        };
        let gateway = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let gateway_addr = gateway.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(gateway, router(state)).await.unwrap();
        });

        let (mut client, _) =
            tokio_tungstenite::connect_async(format!("ws://{gateway_addr}/ws"))
                .await
                .unwrap();

        // The client sends nothing; the gateway must still close the socket
        // once the session dies with the upstream.
        let closed = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(message) = client.next().await {
                match message {
                    Ok(TtMessage::Close(_)) | Err(_) => return true,
                    Ok(_) => {}
                }
            }
            true
        })
        .await;
        assert_eq!(closed, Ok(true), "client socket left open after fatal upstream error");
    }
}
