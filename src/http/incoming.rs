//! Live origin responses.
//!
//! # Responsibilities
//! - Capture status, version and headers from a response head
//! - Pump the response body frame by frame into a `ReadableBody`
//! - Expose both document capabilities so the value is adopted unwrapped
//!
//! # Design Decisions
//! - Header names come from `http::HeaderMap` and are already lowercase
//! - Trailers are skipped; only data frames reach listeners
//! - Body errors surface as `error` events, never as construction failures
//! - Frames are only read while the body has room below its high-water mark

use std::fmt;

use bytes::Bytes;
use futures_util::Stream;
use http_body_util::BodyExt;
use hyper::body::Body;
use hyper::{Response, StatusCode, Version};

use crate::config::BodyConfig;
use crate::document::{Headers, Shape};
use crate::stream::{BodySink, BodyStream, EventKind, Listener, ListenerId, ReadableBody};

/// An origin response as received from the HTTP transport.
#[derive(Debug)]
pub struct IncomingMessage {
    status: StatusCode,
    version: Version,
    headers: Headers,
    body: ReadableBody,
}

impl IncomingMessage {
    /// Adapt `response`, pumping its body on a Tokio task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_response<B>(response: Response<B>) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: fmt::Display + Send + 'static,
    {
        Self::from_response_with(response, &BodyConfig::default())
    }

    /// Like [`IncomingMessage::from_response`], with explicit body settings.
    pub fn from_response_with<B>(response: Response<B>, config: &BodyConfig) -> Self
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: fmt::Display + Send + 'static,
    {
        let (parts, body) = response.into_parts();
        let headers = Headers::from(&parts.headers);
        let body = ReadableBody::from_stream_with(data_frames(body), config);

        tracing::debug!(
            body_id = %body.id(),
            status = %parts.status,
            headers = headers.len(),
            "Origin response received"
        );

        Self {
            status: parts.status,
            version: parts.version,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn body(&self) -> &ReadableBody {
        &self.body
    }

    /// Abort the origin body. The pump task is cancelled and the hyper body
    /// dropped, even while waiting on a stalled origin.
    pub fn destroy(&self) {
        self.body.destroy();
    }
}

/// Data frames of `body` as a stream, skipping trailers.
fn data_frames<B>(body: B) -> impl Stream<Item = Result<Bytes, B::Error>> + Send
where
    B: Body<Data = Bytes> + Send + 'static,
    B::Error: Send + 'static,
{
    futures_util::stream::unfold(Box::pin(body), |mut body| async move {
        loop {
            match body.frame().await? {
                Ok(frame) => match frame.into_data() {
                    Ok(data) => return Some((Ok(data), body)),
                    Err(_trailers) => continue,
                },
                Err(e) => return Some((Err(e), body)),
            }
        }
    })
}

impl BodyStream for IncomingMessage {
    fn readable(&self) -> bool {
        self.body.readable()
    }

    fn aborted(&self) -> bool {
        self.body.aborted()
    }

    fn complete(&self) -> bool {
        self.body.complete()
    }

    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.body.on(kind, listener)
    }

    fn once(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.body.once(kind, listener)
    }

    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.body.remove_listener(kind, id)
    }

    fn pipe(&self, sink: std::sync::Arc<dyn BodySink>) {
        self.body.pipe(sink)
    }
}

impl Shape for IncomingMessage {
    fn headers(&self) -> Option<&Headers> {
        Some(&self.headers)
    }

    fn events(&self) -> Option<&dyn BodyStream> {
        Some(self)
    }

    fn status_code(&self) -> Option<StatusCode> {
        Some(self.status)
    }
}
