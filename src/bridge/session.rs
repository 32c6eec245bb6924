//! Session lifecycle and task supervision.
//!
//! A session runs three tasks: capture (local frames, gated, upstream),
//! receive (upstream events into the turn controller), and playback (buffer
//! into the sink). They form one fault domain: the first task to finish,
//! successfully or not, brings the other two down, and teardown then
//! releases the local endpoint and the upstream connection exactly once.
//! `close` is idempotent — it only trips a cancellation token, and the
//! supervisor owns every release that follows.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::playback::PlaybackBuffer;
use super::registry::SessionRegistry;
use super::turn::{TurnController, TurnNotice, TurnState};
use super::{MediaSink, MediaSource};
use crate::audio::gate::VoiceGate;
use crate::error::BridgeError;
use crate::live::Upstream;

type SharedSink = Arc<Mutex<Box<dyn MediaSink>>>;

pub struct Session {
    id: String,
    turn: Arc<TurnController>,
    playback: Arc<PlaybackBuffer>,
    cancel: CancellationToken,
    done: CancellationToken,
}

impl Session {
    /// Start a session over an already-connected upstream and hand back a
    /// handle. The supervisor task owns all teardown; dropping the handle
    /// does not stop the session, `close` does.
    pub fn open(
        id: String,
        source: Box<dyn MediaSource>,
        sink: Box<dyn MediaSink>,
        upstream: Arc<dyn Upstream>,
        gate: VoiceGate,
        registry: Option<Arc<SessionRegistry>>,
    ) -> Arc<Self> {
        let playback = Arc::new(PlaybackBuffer::new());
        let turn = Arc::new(TurnController::new(gate, Arc::clone(&playback)));

        let session = Arc::new(Self {
            id,
            turn: Arc::clone(&turn),
            playback: Arc::clone(&playback),
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
        });

        if let Some(registry) = &registry {
            registry.insert(Arc::clone(&session));
        }

        let sink: SharedSink = Arc::new(Mutex::new(sink));
        tokio::spawn(supervise(
            Arc::clone(&session),
            source,
            sink,
            upstream,
            registry,
        ));

        session
    }

    /// Request teardown. Safe to call any number of times from anywhere.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Resolves once teardown has fully completed.
    pub async fn closed(&self) {
        self.done.cancelled().await;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn.state()
    }

    pub fn playback_len(&self) -> usize {
        self.playback.len()
    }

    pub fn forwarded_frames(&self) -> u64 {
        self.turn.forwarded_frames()
    }
}

async fn supervise(
    session: Arc<Session>,
    source: Box<dyn MediaSource>,
    sink: SharedSink,
    upstream: Arc<dyn Upstream>,
    registry: Option<Arc<SessionRegistry>>,
) {
    let session_id = session.id.clone();
    let mut tasks = JoinSet::new();

    tasks.spawn(capture_loop(
        session.cancel.clone(),
        source,
        Arc::clone(&session.turn),
        Arc::clone(&upstream),
    ));
    tasks.spawn(receive_loop(
        session.cancel.clone(),
        Arc::clone(&upstream),
        Arc::clone(&session.turn),
        Arc::clone(&sink),
    ));
    tasks.spawn(playback_loop(
        Arc::clone(&session.playback),
        Arc::clone(&sink),
    ));

    // The first task to finish decides the session's fate.
    if let Some(first) = tasks.join_next().await {
        match first {
            Ok(Ok(())) => tracing::info!(session_id, "session task finished cleanly"),
            Ok(Err(BridgeError::Cancelled)) => {}
            Ok(Err(e)) => tracing::error!(session_id, error = %e, "session task failed"),
            Err(e) => tracing::error!(session_id, error = %e, "session task panicked"),
        }
    }

    session.cancel.cancel();
    session.turn.begin_close();
    session.playback.close();
    while tasks.join_next().await.is_some() {}

    sink.lock().await.close().await;
    upstream.shutdown().await;
    if let Some(registry) = registry {
        registry.remove(&session_id);
    }

    tracing::info!(
        session_id,
        forwarded_frames = session.turn.forwarded_frames(),
        "session closed"
    );
    session.done.cancel();
}

/// Local frames into the gate and upstream. A wrong-size frame is dropped
/// with a warning; every other error ends the session.
async fn capture_loop(
    cancel: CancellationToken,
    mut source: Box<dyn MediaSource>,
    turn: Arc<TurnController>,
    upstream: Arc<dyn Upstream>,
) -> Result<(), BridgeError> {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Err(BridgeError::Cancelled),
            frame = source.next_frame() => frame?,
        };
        let Some(frame) = frame else {
            // Producer finished cleanly.
            return Ok(());
        };

        match turn.admit(frame) {
            Ok(Some(gated)) => upstream.send_frame(&gated.pcm).await?,
            Ok(None) => {}
            Err(e @ BridgeError::InvalidFrame { .. }) => {
                tracing::warn!(error = %e, "capture frame dropped");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Upstream events into the turn controller; notices onto the sink.
async fn receive_loop(
    cancel: CancellationToken,
    upstream: Arc<dyn Upstream>,
    turn: Arc<TurnController>,
    sink: SharedSink,
) -> Result<(), BridgeError> {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return Err(BridgeError::Cancelled),
            event = upstream.next_event() => event,
        };
        let Some(event) = event else {
            return Err(BridgeError::Connection("upstream stream ended".into()));
        };

        match turn.on_server_event(event) {
            Some(TurnNotice::Text(text)) => sink.lock().await.text(&text).await?,
            Some(TurnNotice::TurnComplete) => sink.lock().await.turn_complete().await?,
            None => {}
        }
    }
}

/// Buffered audio into the sink, in FIFO order. Ends when the buffer is
/// closed at teardown.
async fn playback_loop(
    playback: Arc<PlaybackBuffer>,
    sink: SharedSink,
) -> Result<(), BridgeError> {
    while let Some(chunk) = playback.dequeue().await {
        sink.lock().await.play(&chunk).await?;
    }
    Ok(())
}
