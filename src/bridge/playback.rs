//! FIFO playback buffer between the upstream receive task and the playback
//! task.
//!
//! Unbounded on purpose: the producer is a network stream that must never
//! be back-pressured into the protocol loop, and a turn's audio is finite.
//! `flush` is the barge-in primitive — it discards everything queued but
//! not yet played, so stale audio from an interrupted turn never reaches
//! the sink.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

pub struct PlaybackBuffer {
    queue: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    closed: CancellationToken,
}

impl PlaybackBuffer {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: CancellationToken::new(),
        }
    }

    /// Append one chunk. Chunks enqueued after `close` are discarded.
    pub fn enqueue(&self, pcm: Vec<u8>) {
        if self.closed.is_cancelled() {
            return;
        }
        self.queue.lock().push_back(pcm);
        self.notify.notify_one();
    }

    /// Pop the oldest chunk, waiting if the buffer is empty. Returns `None`
    /// once the buffer is closed and drained of nothing further.
    pub async fn dequeue(&self) -> Option<Vec<u8>> {
        loop {
            if let Some(chunk) = self.queue.lock().pop_front() {
                return Some(chunk);
            }
            if self.closed.is_cancelled() {
                return None;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = self.closed.cancelled() => {}
            }
        }
    }

    /// Discard everything queued but not yet dequeued. Returns how many
    /// chunks were dropped.
    pub fn flush(&self) -> usize {
        let mut queue = self.queue.lock();
        let dropped = queue.len();
        queue.clear();
        dropped
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Stop the buffer: pending and future `dequeue` calls return `None`.
    pub fn close(&self) {
        self.closed.cancel();
        self.notify.notify_one();
    }
}

impl Default for PlaybackBuffer {
    fn default() -> Self {
        Self::new()
    }
}
