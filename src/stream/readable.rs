//! Concrete readable body.
//!
//! # Responsibilities
//! - Pair a producer handle (`BodySender`) with a consumer view (`ReadableBody`)
//! - Track `readable` / `aborted` / `complete` as live flags
//! - Start flowing when the first data listener attaches
//! - Pump an async byte stream into a body on a Tokio task
//! - Apply backpressure: the pump waits while undelivered data exceeds the
//!   high-water mark, and `pipe` pauses while its destination is full
//!
//! # Design Decisions
//! - Flags change when the producer acts, not when events are delivered,
//!   except `readable`, which also turns false once `end` has been delivered
//! - `error`, `aborted` and `close` reach listeners even while paused;
//!   undelivered data is dropped when the body fails or aborts
//! - Aborting cancels the pump task, dropping the source stream
//! - Dropping an unfinished sender aborts the body
//! - Every body carries a UUID used as the `body_id` tracing field

use std::fmt;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use uuid::Uuid;

use super::emitter::EventEmitter;
use super::{BodyEvent, BodySink, BodyStream, EventKind, Listener, ListenerId, StreamError};
use crate::config::BodyConfig;
use crate::observability::metrics;

struct Shared {
    id: Uuid,
    emitter: EventEmitter,
    high_water_mark: usize,
    readable: AtomicBool,
    aborted: AtomicBool,
    complete: AtomicBool,
    /// Set once the producer reached a terminal state.
    closed: AtomicBool,
    /// Signalled when undelivered data drops below the high-water mark.
    space: Notify,
    pump: Mutex<Option<AbortHandle>>,
}

impl Shared {
    fn emit(&self, events: impl IntoIterator<Item = BodyEvent>) {
        for event in events {
            self.emitter.enqueue(event);
        }
        self.drain();
    }

    fn drain(&self) {
        self.emitter.drain(|event| {
            metrics::record_body_event(event.kind());
            if event.kind() == EventKind::End {
                self.readable.store(false, Ordering::Release);
            }
        });
        if self.has_space() {
            self.space.notify_one();
        }
    }

    fn resume(&self) {
        if self.emitter.resume() {
            tracing::trace!(body_id = %self.id, "Body flowing");
        }
        self.drain();
    }

    fn has_space(&self) -> bool {
        self.emitter.buffered_bytes() < self.high_water_mark
    }

    /// Claim the terminal transition. Only the first caller wins.
    fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    fn abort(&self) -> bool {
        if !self.close() {
            return false;
        }
        self.aborted.store(true, Ordering::Release);
        self.readable.store(false, Ordering::Release);
        let dropped = self.emitter.discard_data();
        tracing::debug!(body_id = %self.id, dropped_bytes = dropped, "Body aborted");
        if let Some(pump) = self
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            pump.abort();
        }
        self.space.notify_one();
        self.emit([BodyEvent::Aborted, BodyEvent::Close]);
        true
    }
}

/// Consumer view of a body. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ReadableBody {
    shared: Arc<Shared>,
}

/// Producer handle for a [`ReadableBody`].
pub struct BodySender {
    shared: Arc<Shared>,
}

impl ReadableBody {
    /// Create a producer/consumer pair with default settings.
    pub fn channel() -> (BodySender, ReadableBody) {
        Self::channel_with(&BodyConfig::default())
    }

    /// Create a producer/consumer pair.
    pub fn channel_with(config: &BodyConfig) -> (BodySender, ReadableBody) {
        let shared = Arc::new(Shared {
            id: Uuid::new_v4(),
            emitter: EventEmitter::new(config.max_listeners),
            high_water_mark: config.high_water_mark.max(1),
            readable: AtomicBool::new(true),
            aborted: AtomicBool::new(false),
            complete: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            space: Notify::new(),
            pump: Mutex::new(None),
        });
        tracing::trace!(body_id = %shared.id, "Body created");
        (
            BodySender {
                shared: shared.clone(),
            },
            ReadableBody { shared },
        )
    }

    /// Pump `stream` into a new body on a Tokio task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_stream<S, E>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        Self::from_stream_with(stream, &BodyConfig::default())
    }

    /// Like [`ReadableBody::from_stream`], with explicit settings.
    pub fn from_stream_with<S, E>(stream: S, config: &BodyConfig) -> Self
    where
        S: Stream<Item = Result<Bytes, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let (sender, body) = Self::channel_with(config);
        let task = tokio::spawn(pump(stream, sender));
        *body
            .shared
            .pump
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(task.abort_handle());
        body
    }

    /// Unique identifier of this body.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Start delivering events even without a data listener.
    pub fn resume(&self) {
        self.shared.resume();
    }

    /// Hold `data` and `end` until [`ReadableBody::resume`]. Adding a data
    /// listener does not restart a paused body.
    pub fn pause(&self) {
        self.shared.emitter.pause();
    }

    /// Whether events are being delivered.
    pub fn is_flowing(&self) -> bool {
        self.shared.emitter.is_flowing()
    }

    /// Bytes produced but not yet delivered.
    pub fn buffered_bytes(&self) -> usize {
        self.shared.emitter.buffered_bytes()
    }

    /// Number of listeners registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.shared.emitter.listener_count(kind)
    }

    /// Abort the body from the consumer side. A pumped source is dropped;
    /// a manual producer's next send fails.
    pub fn destroy(&self) {
        self.shared.abort();
    }

    fn register(&self, kind: EventKind, listener: Listener, once: bool) -> ListenerId {
        let id = self.shared.emitter.register(kind, listener, once);
        if kind == EventKind::Data && self.shared.emitter.start() {
            tracing::trace!(body_id = %self.shared.id, "Body flowing");
            self.shared.drain();
        }
        id
    }
}

impl fmt::Debug for ReadableBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadableBody")
            .field("id", &self.shared.id)
            .field("readable", &self.readable())
            .field("aborted", &self.aborted())
            .field("complete", &self.complete())
            .finish()
    }
}

impl BodyStream for ReadableBody {
    fn readable(&self) -> bool {
        self.shared.readable.load(Ordering::Acquire)
    }

    fn aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::Acquire)
    }

    fn complete(&self) -> bool {
        self.shared.complete.load(Ordering::Acquire)
    }

    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.register(kind, listener, false)
    }

    fn once(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.register(kind, listener, true)
    }

    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.shared.emitter.remove(kind, id)
    }

    /// Pauses the body whenever `sink` reports it is full and resumes it
    /// when the sink drains.
    fn pipe(&self, sink: Arc<dyn BodySink>) {
        let on_end = sink.clone();
        self.once(EventKind::End, Arc::new(move |_: &BodyEvent| on_end.finish()));

        let shared = Arc::downgrade(&self.shared);
        self.on(
            EventKind::Data,
            Arc::new(move |event: &BodyEvent| {
                let BodyEvent::Data(chunk) = event else {
                    return;
                };
                if sink.write(chunk) {
                    return;
                }
                let Some(body) = shared.upgrade() else {
                    return;
                };
                body.emitter.pause();
                tracing::trace!(body_id = %body.id, "Pipe destination full, pausing body");
                let weak: Weak<Shared> = Arc::downgrade(&body);
                sink.on_drain(Box::new(move || {
                    if let Some(body) = weak.upgrade() {
                        body.resume();
                    }
                }));
            }),
        );
    }
}

impl BodySender {
    /// Identifier of the body this sender feeds.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Whether the body reached a terminal state.
    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    /// Wait until undelivered data is below the high-water mark or the body
    /// is closed.
    pub async fn ready(&self) {
        while !self.is_closed() && !self.shared.has_space() {
            self.shared.space.notified().await;
        }
    }

    /// Emit a data chunk.
    pub fn send(&self, chunk: impl Into<Bytes>) -> Result<(), StreamError> {
        if self.is_closed() {
            return Err(StreamError::Closed);
        }
        self.shared.emit([BodyEvent::Data(chunk.into())]);
        Ok(())
    }

    /// Mark the body complete and emit `end`.
    pub fn finish(self) {
        if !self.shared.close() {
            return;
        }
        self.shared.complete.store(true, Ordering::Release);
        tracing::trace!(body_id = %self.shared.id, "Body finished");
        self.shared.emit([BodyEvent::End, BodyEvent::Close]);
    }

    /// Emit `error` and close the body. Undelivered data is dropped.
    pub fn fail(self, error: StreamError) {
        if !self.shared.close() {
            return;
        }
        self.shared.readable.store(false, Ordering::Release);
        let dropped = self.shared.emitter.discard_data();
        tracing::debug!(body_id = %self.shared.id, error = %error, dropped_bytes = dropped, "Body failed");
        self.shared.emit([BodyEvent::Error(error), BodyEvent::Close]);
    }

    /// Emit `aborted` and close the body.
    pub fn abort(self) {
        self.shared.abort();
    }
}

impl Drop for BodySender {
    fn drop(&mut self) {
        if self.shared.abort() {
            tracing::debug!(body_id = %self.shared.id, "Body sender dropped before finishing");
        }
    }
}

impl fmt::Debug for BodySender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodySender")
            .field("id", &self.shared.id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

async fn pump<S, E>(stream: S, sender: BodySender)
where
    S: Stream<Item = Result<Bytes, E>>,
    E: fmt::Display,
{
    let mut stream = pin!(stream);
    loop {
        sender.ready().await;
        let Some(item) = stream.next().await else {
            break;
        };
        match item {
            Ok(chunk) => {
                if sender.send(chunk).is_err() {
                    tracing::debug!(body_id = %sender.id(), "Body closed by consumer, stopping pump");
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(body_id = %sender.id(), error = %e, "Body source failed");
                sender.fail(StreamError::Source(e.to_string()));
                return;
            }
        }
    }
    sender.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::DrainCallback;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn collect(body: &ReadableBody) -> Arc<Mutex<Vec<BodyEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        for kind in [
            EventKind::End,
            EventKind::Error,
            EventKind::Aborted,
            EventKind::Close,
            EventKind::Data,
        ] {
            let events = events.clone();
            body.on(
                kind,
                Arc::new(move |event: &BodyEvent| events.lock().unwrap().push(event.clone())),
            );
        }
        events
    }

    #[test]
    fn test_chunks_before_listener_are_held() {
        let (sender, body) = ReadableBody::channel();
        sender.send("a").unwrap();
        sender.send("b").unwrap();
        assert!(!body.is_flowing());

        let events = collect(&body);
        assert!(body.is_flowing());
        sender.finish();

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                BodyEvent::Data(Bytes::from_static(b"a")),
                BodyEvent::Data(Bytes::from_static(b"b")),
                BodyEvent::End,
                BodyEvent::Close,
            ]
        );
        assert!(body.complete());
        assert!(!body.readable());
    }

    #[test]
    fn test_readable_until_end_delivered() {
        let (sender, body) = ReadableBody::channel();
        sender.finish();
        // Paused: end is queued but not delivered.
        assert!(body.complete());
        assert!(body.readable());

        body.resume();
        assert!(!body.readable());
    }

    #[test]
    fn test_abort_flags_are_immediate() {
        let (sender, body) = ReadableBody::channel();
        assert!(!body.aborted());
        sender.abort();
        assert!(body.aborted());
        assert!(!body.readable());
        assert!(!body.complete());
    }

    #[test]
    fn test_drop_unfinished_sender_aborts() {
        let (sender, body) = ReadableBody::channel();
        let events = collect(&body);
        drop(sender);

        assert!(body.aborted());
        assert_eq!(*events.lock().unwrap(), vec![BodyEvent::Aborted, BodyEvent::Close]);
    }

    #[test]
    fn test_send_after_destroy_fails() {
        let (sender, body) = ReadableBody::channel();
        body.destroy();
        assert!(sender.is_closed());
        assert_eq!(sender.send("late"), Err(StreamError::Closed));
    }

    #[test]
    fn test_fail_emits_error_then_close() {
        let (sender, body) = ReadableBody::channel();
        let events = collect(&body);
        sender.fail(StreamError::Source("reset".into()));

        assert_eq!(
            *events.lock().unwrap(),
            vec![
                BodyEvent::Error(StreamError::Source("reset".into())),
                BodyEvent::Close,
            ]
        );
        assert!(!body.readable());
        assert!(!body.aborted());
    }

    #[test]
    fn test_listener_count() {
        let (_sender, body) = ReadableBody::channel();
        let id = body.once(EventKind::End, Arc::new(|_: &BodyEvent| {}));
        assert_eq!(body.listener_count(EventKind::End), 1);
        assert!(body.remove_listener(EventKind::End, id));
        assert_eq!(body.listener_count(EventKind::End), 0);
    }

    #[tokio::test]
    async fn test_from_stream_pumps_chunks() {
        let source = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]);
        let body = ReadableBody::from_stream(source);

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let data_tx = tx.clone();
        body.on(
            EventKind::Data,
            Arc::new(move |event: &BodyEvent| {
                if let BodyEvent::Data(chunk) = event {
                    let _ = data_tx.send(Some(chunk.clone()));
                }
            }),
        );
        body.once(EventKind::End, Arc::new(move |_: &BodyEvent| {
            let _ = tx.send(None);
        }));

        let mut received = Vec::new();
        while let Some(Some(chunk)) = rx.recv().await {
            received.extend_from_slice(&chunk);
        }
        assert_eq!(received, b"hello world");
        assert!(body.complete());
    }

    #[tokio::test]
    async fn test_from_stream_error_fails_body() {
        let source = futures_util::stream::iter(vec![
            Ok(Bytes::from_static(b"partial")),
            Err("upstream reset"),
        ]);
        let body = ReadableBody::from_stream(source);

        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        body.once(EventKind::Error, Arc::new(move |event: &BodyEvent| {
            if let (BodyEvent::Error(err), Some(tx)) = (event, tx.lock().unwrap().take()) {
                let _ = tx.send(err.clone());
            }
        }));
        body.resume();

        let err = rx.await.unwrap();
        assert_eq!(err, StreamError::Source("upstream reset".into()));
        assert!(!body.complete());
    }

    #[test]
    fn test_abort_reaches_listener_on_paused_body() {
        let (sender, body) = ReadableBody::channel();
        sender.send("held").unwrap();

        let events = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::Aborted, EventKind::Close] {
            let events = events.clone();
            body.on(kind, Arc::new(move |event: &BodyEvent| events.lock().unwrap().push(event.clone())));
        }
        sender.abort();

        assert!(!body.is_flowing());
        assert_eq!(*events.lock().unwrap(), vec![BodyEvent::Aborted, BodyEvent::Close]);
        assert_eq!(body.buffered_bytes(), 0);
    }

    #[test]
    fn test_error_reaches_listener_on_paused_body() {
        let (sender, body) = ReadableBody::channel();
        sender.send("held").unwrap();

        let seen = Arc::new(Mutex::new(None));
        let slot = seen.clone();
        body.once(
            EventKind::Error,
            Arc::new(move |event: &BodyEvent| *slot.lock().unwrap() = Some(event.clone())),
        );
        sender.fail(StreamError::Source("reset".into()));

        assert_eq!(
            *seen.lock().unwrap(),
            Some(BodyEvent::Error(StreamError::Source("reset".into())))
        );
        assert_eq!(body.buffered_bytes(), 0);
    }

    #[test]
    fn test_pipe_pauses_while_sink_is_full() {
        #[derive(Default)]
        struct GatedSink {
            written: Mutex<Vec<Bytes>>,
            full: AtomicBool,
            waiting: Mutex<Option<DrainCallback>>,
        }

        impl BodySink for GatedSink {
            fn write(&self, chunk: &Bytes) -> bool {
                self.written.lock().unwrap().push(chunk.clone());
                !self.full.load(Ordering::SeqCst)
            }

            fn finish(&self) {}

            fn on_drain(&self, callback: DrainCallback) {
                *self.waiting.lock().unwrap() = Some(callback);
            }
        }

        let (sender, body) = ReadableBody::channel();
        let sink = Arc::new(GatedSink::default());
        sink.full.store(true, Ordering::SeqCst);
        body.pipe(sink.clone());

        sender.send("a").unwrap();
        sender.send("b").unwrap();
        assert_eq!(sink.written.lock().unwrap().len(), 1);
        assert!(!body.is_flowing());
        assert_eq!(body.buffered_bytes(), 1);

        // A new data listener does not restart a paused body.
        body.on(EventKind::Data, Arc::new(|_: &BodyEvent| {}));
        assert!(!body.is_flowing());

        sink.full.store(false, Ordering::SeqCst);
        let resume = sink.waiting.lock().unwrap().take().unwrap();
        resume();
        assert!(body.is_flowing());
        assert_eq!(
            *sink.written.lock().unwrap(),
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]
        );
    }

    #[tokio::test]
    async fn test_pump_stops_pulling_while_body_is_full() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let source = futures_util::stream::iter(
            (0..10).map(|_| Ok::<_, std::io::Error>(Bytes::from_static(b"xy"))),
        )
        .inspect(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let config = BodyConfig {
            high_water_mark: 4,
            ..BodyConfig::default()
        };
        let body = ReadableBody::from_stream_with(source, &config);

        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
        assert_eq!(body.buffered_bytes(), 4);

        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = Mutex::new(Some(tx));
        body.once(EventKind::End, Arc::new(move |_: &BodyEvent| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        }));
        let received = Arc::new(AtomicUsize::new(0));
        let total = received.clone();
        body.on(
            EventKind::Data,
            Arc::new(move |event: &BodyEvent| {
                if let BodyEvent::Data(chunk) = event {
                    total.fetch_add(chunk.len(), Ordering::SeqCst);
                }
            }),
        );

        rx.await.unwrap();
        assert_eq!(received.load(Ordering::SeqCst), 20);
        assert_eq!(pulled.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_destroy_drops_stalled_source() {
        let (alive_tx, alive_rx) = tokio::sync::oneshot::channel::<()>();
        let source = futures_util::stream::iter(vec![Ok::<_, std::io::Error>(Bytes::from_static(
            b"head",
        ))])
        .chain(futures_util::stream::pending())
        .map(move |item| {
            let _alive = &alive_tx;
            item
        });
        let body = ReadableBody::from_stream(source);
        body.resume();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(!body.complete());

        body.destroy();
        let dropped = tokio::time::timeout(Duration::from_secs(1), alive_rx).await;
        assert!(matches!(dropped, Ok(Err(_))));
        assert!(body.aborted());
    }
}
