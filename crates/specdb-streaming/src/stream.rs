//! Specdb Streaming Streams
//!
//! The consumer side of a watch subscription. Each stream is fed by a
//! background task that forwards events from the subscriber's broadcast buffer
//! into the stream's channel, and that closes the channel exactly once when the
//! stream is cancelled.
//!
//! @version 0.1.0
//! @author Specdb Development Team

use crate::event::Event;
use crate::subscriber::SubscriberId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

// =============================================================================
// Stream Closer
// =============================================================================

/// Cancellation handle for a stream. Cloneable and usable from any thread.
#[derive(Debug, Clone)]
pub struct StreamCloser {
    cancel: Arc<watch::Sender<bool>>,
}

impl StreamCloser {
    /// Cancel the stream. Idempotent.
    pub fn close(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_closed(&self) -> bool {
        *self.cancel.borrow()
    }
}

// =============================================================================
// Stream
// =============================================================================

/// A live sequence of change events for one subscription.
pub struct Stream {
    id: SubscriberId,
    receiver: mpsc::Receiver<Event>,
    closer: StreamCloser,
    done: watch::Receiver<bool>,
    dropped: Arc<AtomicU64>,
}

impl Stream {
    /// Start forwarding events from `source` into a new stream.
    ///
    /// `on_close` runs once, on the forwarding task, after cancellation and
    /// before the stream's channel closes. Must be called inside a tokio runtime.
    pub fn spawn<F>(id: SubscriberId, mut source: broadcast::Receiver<Event>, on_close: F) -> Self
    where
        F: FnOnce(SubscriberId) + Send + 'static,
    {
        let (sender, receiver) = mpsc::channel(1);
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let dropped = Arc::new(AtomicU64::new(0));
        let lost = dropped.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => break,
                    received = source.recv() => match received {
                        Ok(event) => {
                            tokio::select! {
                                biased;
                                _ = cancel_rx.changed() => break,
                                sent = sender.send(event) => {
                                    if sent.is_err() {
                                        break;
                                    }
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            lost.fetch_add(n, Ordering::Relaxed);
                            tracing::warn!("Stream {} lagged, dropped {} oldest events", id, n);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }

            on_close(id);
            drop(sender);
            done_tx.send_replace(true);
            tracing::debug!("Stream {} closed", id);
        });

        Self {
            id,
            receiver,
            closer: StreamCloser {
                cancel: Arc::new(cancel_tx),
            },
            done: done_rx,
            dropped,
        }
    }

    /// Get the subscriber id backing this stream.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. Returns `None` once the stream is closed,
    /// even if events were still buffered when it was.
    pub async fn next(&mut self) -> Option<Event> {
        if self.closer.is_closed() {
            self.discard();
            return None;
        }
        let event = self.receiver.recv().await;
        if self.closer.is_closed() {
            self.discard();
            return None;
        }
        event
    }

    /// Take the next event if one is ready.
    pub fn try_next(&mut self) -> Option<Event> {
        if self.closer.is_closed() {
            self.discard();
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Stop accepting events and drop whatever is buffered.
    fn discard(&mut self) {
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }

    /// Wait until the forwarding task has shut down.
    pub async fn done(&self) {
        let mut done = self.done.clone();
        while !*done.borrow_and_update() {
            if done.changed().await.is_err() {
                break;
            }
        }
    }

    /// Returns true once the forwarding task has shut down.
    pub fn is_closed(&self) -> bool {
        *self.done.borrow()
    }

    /// Cancel the stream.
    pub fn close(&self) {
        self.closer.close();
    }

    /// Get a cancellation handle that outlives borrows of the stream.
    pub fn closer(&self) -> StreamCloser {
        self.closer.clone()
    }

    /// Number of events lost because this stream fell behind.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Stream {
    fn drop(&mut self) {
        self.closer.close();
    }
}

impl std::fmt::Debug for Stream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("id", &self.id)
            .field("closed", &self.is_closed())
            .field("dropped", &self.dropped())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
