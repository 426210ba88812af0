//! Pipe destinations.
//!
//! # Design Decisions
//! - `write` never rejects a chunk; returning false asks the source to pause
//!   until the sink drains
//! - `ChannelSink` counts bytes in flight and reports full above its limit;
//!   the receiving half wakes paused sources as it consumes

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;

use super::StreamError;
use crate::config::BodyConfig;

/// Callback run once a full sink has room again.
pub type DrainCallback = Box<dyn FnOnce() + Send>;

/// Destination for [`BodyStream::pipe`](super::BodyStream::pipe).
pub trait BodySink: Send + Sync {
    /// Receive one data chunk.
    ///
    /// Returns false when the sink is above its limit; the source should
    /// pause until [`BodySink::on_drain`] fires.
    fn write(&self, chunk: &Bytes) -> bool;

    /// The source ended; no more chunks follow.
    fn finish(&self);

    /// Run `callback` once the sink has room. Sinks that never fill run it
    /// immediately.
    fn on_drain(&self, callback: DrainCallback) {
        callback();
    }
}

type ChunkSender = mpsc::UnboundedSender<Result<Bytes, StreamError>>;

struct InFlight {
    bytes: AtomicUsize,
    limit: usize,
    receiver_gone: AtomicBool,
    waiting: Mutex<Vec<DrainCallback>>,
}

impl InFlight {
    fn has_room(&self) -> bool {
        self.receiver_gone.load(Ordering::Acquire) || self.bytes.load(Ordering::Acquire) < self.limit
    }

    fn waiting(&self) -> MutexGuard<'_, Vec<DrainCallback>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wake(&self) {
        let callbacks = {
            let mut waiting = self.waiting();
            if waiting.is_empty() || !self.has_room() {
                return;
            }
            std::mem::take(&mut *waiting)
        };
        for callback in callbacks {
            callback();
        }
    }
}

/// Sink forwarding chunks into a Tokio channel, with a byte limit.
///
/// The channel closes on `finish` or `fail`, so the receiving side observes
/// end of stream even while the sink itself is still referenced by listeners.
pub struct ChannelSink {
    tx: Mutex<Option<ChunkSender>>,
    in_flight: Arc<InFlight>,
}

/// Receiving half of a [`ChannelSink`].
pub struct SinkReceiver {
    rx: mpsc::UnboundedReceiver<Result<Bytes, StreamError>>,
    in_flight: Arc<InFlight>,
}

impl ChannelSink {
    /// Create a sink limited to the default high-water mark.
    pub fn new() -> (Self, SinkReceiver) {
        Self::with_limit(BodyConfig::default().high_water_mark)
    }

    /// Create a sink that reports full once `limit` bytes are unread.
    pub fn with_limit(limit: usize) -> (Self, SinkReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let in_flight = Arc::new(InFlight {
            bytes: AtomicUsize::new(0),
            limit: limit.max(1),
            receiver_gone: AtomicBool::new(false),
            waiting: Mutex::new(Vec::new()),
        });
        (
            Self {
                tx: Mutex::new(Some(tx)),
                in_flight: in_flight.clone(),
            },
            SinkReceiver { rx, in_flight },
        )
    }

    fn lock(&self) -> MutexGuard<'_, Option<ChunkSender>> {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver `error` to the receiver and close the channel.
    pub fn fail(&self, error: StreamError) {
        if let Some(tx) = self.lock().take() {
            let _ = tx.send(Err(error));
        }
    }

    /// Whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().as_ref().map_or(true, |tx| tx.is_closed())
    }

    /// Bytes written but not yet received.
    pub fn buffered_bytes(&self) -> usize {
        self.in_flight.bytes.load(Ordering::Acquire)
    }
}

impl fmt::Debug for ChannelSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelSink")
            .field("buffered_bytes", &self.buffered_bytes())
            .field("limit", &self.in_flight.limit)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl BodySink for ChannelSink {
    fn write(&self, chunk: &Bytes) -> bool {
        if let Some(tx) = self.lock().as_ref() {
            self.in_flight.bytes.fetch_add(chunk.len(), Ordering::AcqRel);
            if tx.send(Ok(chunk.clone())).is_err() {
                self.in_flight.bytes.fetch_sub(chunk.len(), Ordering::AcqRel);
                tracing::trace!("Pipe receiver dropped, discarding chunk");
            }
        }
        self.in_flight.has_room()
    }

    fn finish(&self) {
        self.lock().take();
    }

    fn on_drain(&self, callback: DrainCallback) {
        let mut waiting = self.in_flight.waiting();
        if self.in_flight.has_room() {
            drop(waiting);
            callback();
        } else {
            waiting.push(callback);
        }
    }
}

impl SinkReceiver {
    /// Receive the next chunk, or `None` once the sink finished.
    pub async fn recv(&mut self) -> Option<Result<Bytes, StreamError>> {
        let item = self.rx.recv().await;
        self.consumed(&item);
        item
    }

    /// Non-blocking [`SinkReceiver::recv`].
    pub fn try_recv(&mut self) -> Option<Result<Bytes, StreamError>> {
        let item = self.rx.try_recv().ok();
        self.consumed(&item);
        item
    }

    fn consumed(&self, item: &Option<Result<Bytes, StreamError>>) {
        if let Some(Ok(chunk)) = item {
            self.in_flight.bytes.fetch_sub(chunk.len(), Ordering::AcqRel);
            self.in_flight.wake();
        }
    }
}

impl fmt::Debug for SinkReceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkReceiver")
            .field("buffered_bytes", &self.in_flight.bytes.load(Ordering::Acquire))
            .finish()
    }
}

/// A dropped receiver releases paused sources; their chunks are discarded.
impl Drop for SinkReceiver {
    fn drop(&mut self) {
        self.in_flight.receiver_gone.store(true, Ordering::Release);
        self.in_flight.wake();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> (Arc<AtomicUsize>, DrainCallback) {
        let count = Arc::new(AtomicUsize::new(0));
        let inner = count.clone();
        (
            count,
            Box::new(move || {
                inner.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    #[test]
    fn test_channel_sink_forwards_and_closes() {
        let (sink, mut rx) = ChannelSink::new();
        assert!(sink.write(&Bytes::from_static(b"abc")));
        sink.finish();
        sink.write(&Bytes::from_static(b"ignored"));

        assert_eq!(rx.try_recv(), Some(Ok(Bytes::from_static(b"abc"))));
        assert_eq!(rx.try_recv(), None);
        assert!(sink.is_closed());
    }

    #[test]
    fn test_channel_sink_fail() {
        let (sink, mut rx) = ChannelSink::new();
        sink.fail(StreamError::Aborted);
        sink.fail(StreamError::Closed);

        assert_eq!(rx.try_recv(), Some(Err(StreamError::Aborted)));
        assert_eq!(rx.try_recv(), None);
    }

    #[test]
    fn test_reports_full_above_limit_and_wakes_on_receive() {
        let (sink, mut rx) = ChannelSink::with_limit(4);
        assert!(sink.write(&Bytes::from_static(b"ab")));
        assert!(!sink.write(&Bytes::from_static(b"cd")));
        assert_eq!(sink.buffered_bytes(), 4);

        let (woken, callback) = counter();
        sink.on_drain(callback);
        assert_eq!(woken.load(Ordering::SeqCst), 0);

        assert_eq!(rx.try_recv(), Some(Ok(Bytes::from_static(b"ab"))));
        assert_eq!(woken.load(Ordering::SeqCst), 1);
        assert_eq!(sink.buffered_bytes(), 2);
    }

    #[test]
    fn test_on_drain_with_room_runs_immediately() {
        let (sink, _rx) = ChannelSink::with_limit(4);
        let (woken, callback) = counter();
        sink.on_drain(callback);
        assert_eq!(woken.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_receiver_releases_waiters() {
        let (sink, rx) = ChannelSink::with_limit(1);
        assert!(!sink.write(&Bytes::from_static(b"ab")));
        let (woken, callback) = counter();
        sink.on_drain(callback);

        drop(rx);
        assert_eq!(woken.load(Ordering::SeqCst), 1);
        assert!(sink.write(&Bytes::from_static(b"cd")));
    }
}
