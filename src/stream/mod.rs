//! Body stream subsystem.
//!
//! # Data Flow
//! ```text
//! Producer (origin pump, cache reader, file reader)
//!     → readable.rs (BodySender: send / finish / fail / abort)
//!     → emitter.rs (FIFO queue, held until the body flows)
//!     → listeners registered through BodyStream::on / once
//!     → sink.rs (pipe target: channel towards the client)
//! ```
//!
//! # Design Decisions
//! - `BodyStream` is object safe; documents hand it out as `&dyn BodyStream`
//! - Events are delivered in production order, one drain loop at a time
//! - Listeners run without any internal lock held
//! - Producers and pipes apply backpressure against a byte high-water mark

pub mod emitter;
pub mod readable;
pub mod sink;

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

pub use emitter::EventEmitter;
pub use readable::{BodySender, ReadableBody};
pub use sink::{BodySink, ChannelSink, DrainCallback, SinkReceiver};

/// Callback invoked for every event of the kind it was registered for.
pub type Listener = Arc<dyn Fn(&BodyEvent) + Send + Sync>;

/// Handle returned by listener registration, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Event kinds a body can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Data,
    End,
    Error,
    Aborted,
    Close,
}

impl EventKind {
    /// Event name as used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Data => "data",
            EventKind::End => "end",
            EventKind::Error => "error",
            EventKind::Aborted => "aborted",
            EventKind::Close => "close",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event emitted by a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyEvent {
    /// A chunk of body content.
    Data(Bytes),
    /// The body was read to completion.
    End,
    /// The producer failed.
    Error(StreamError),
    /// The producer went away before completion.
    Aborted,
    /// Terminal state reached. Always the last event.
    Close,
}

impl BodyEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            BodyEvent::Data(_) => EventKind::Data,
            BodyEvent::End => EventKind::End,
            BodyEvent::Error(_) => EventKind::Error,
            BodyEvent::Aborted => EventKind::Aborted,
            BodyEvent::Close => EventKind::Close,
        }
    }
}

/// Errors raised while producing a body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// The body already reached a terminal state.
    #[error("Body is closed")]
    Closed,

    /// The underlying source reported an error.
    #[error("Body source error: {0}")]
    Source(String),

    /// The producer went away before the body completed.
    #[error("Body aborted before completion")]
    Aborted,
}

/// The readable-stream contract shared by every document.
///
/// Exactly five operations (`pipe`, `on`, `add_listener`, `remove_listener`,
/// `once`) plus live state readouts. Implementations that wrap another
/// stream forward each call unchanged.
pub trait BodyStream: fmt::Debug + Send + Sync {
    /// Whether the stream can still be read from.
    fn readable(&self) -> bool;

    /// Whether the producer went away before completion.
    fn aborted(&self) -> bool;

    /// Whether the full body has been received.
    fn complete(&self) -> bool;

    /// Register `listener` for every event of `kind`.
    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId;

    /// Register `listener` for the next event of `kind` only.
    fn once(&self, kind: EventKind, listener: Listener) -> ListenerId;

    /// Remove a registration. Returns false if it was not registered.
    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool;

    /// Alias for [`BodyStream::on`].
    fn add_listener(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.on(kind, listener)
    }

    /// Write every data chunk into `sink`, finishing it on end.
    ///
    /// Errors and aborts are not forwarded; the sink's owner listens for them.
    /// Streams that can pause override this to stop while the sink is full.
    fn pipe(&self, sink: Arc<dyn BodySink>) {
        let on_end = sink.clone();
        self.once(EventKind::End, Arc::new(move |_: &BodyEvent| on_end.finish()));
        self.on(
            EventKind::Data,
            Arc::new(move |event: &BodyEvent| {
                if let BodyEvent::Data(chunk) = event {
                    let _ = sink.write(chunk);
                }
            }),
        );
    }
}
