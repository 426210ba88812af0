//! The uniform document type.
//!
//! # Responsibilities
//! - Adopt values that already satisfy the document contract (`coerce`)
//! - Synthesize documents from a status, headers and a readable body
//! - Case-insensitive header lookup
//! - Forward the stream contract to the underlying body
//!
//! # Design Decisions
//! - `Document<S>` is a transparent proof wrapper: adoption moves the
//!   candidate in without copying or allocating
//! - `aborted` / `complete` / `readable` read the body on every call
//! - No listeners are attached during construction

use std::sync::Arc;

use hyper::StatusCode;

use super::error::{DocumentError, DocumentResult};
use super::headers::Headers;
use super::shape::{is_document, Shape};
use crate::observability::metrics;
use crate::stream::{BodySink, BodyStream, EventKind, Listener, ListenerId};

/// A response-like value that passed the capability test.
#[repr(transparent)]
#[derive(Debug)]
pub struct Document<S = Box<dyn Shape>> {
    inner: S,
}

/// Document built from its parts rather than adopted.
pub type SyntheticDocument<B> = Document<Synthetic<B>>;

impl<S: Shape> Document<S> {
    /// Adopt `candidate` as-is if it has the document capabilities.
    pub fn coerce(candidate: S) -> DocumentResult<Self> {
        if is_document(&candidate) {
            metrics::record_adopted();
            Ok(Self { inner: candidate })
        } else {
            let value = format!("{candidate:?}");
            tracing::warn!(candidate = %value, "Rejected value without document capabilities");
            metrics::record_rejected("coercion");
            Err(DocumentError::Coercion { value })
        }
    }

    /// Status code; adopted values may not carry one.
    pub fn status_code(&self) -> Option<StatusCode> {
        self.inner.status_code()
    }

    /// Lowercase-keyed headers.
    pub fn headers(&self) -> &Headers {
        self.inner.headers().unwrap_or(Headers::empty())
    }

    /// Headers as the source supplied them, when retained.
    pub fn original_headers(&self) -> Option<&Headers> {
        self.inner.original_headers()
    }

    /// Case-insensitive header lookup.
    ///
    /// Adopted values whose header names are not lowercase are found by a
    /// slower case-insensitive scan.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        let headers = self.headers();
        headers
            .get(&name.to_lowercase())
            .or_else(|| headers.get_ignore_case(name))
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Erase the concrete candidate type.
    pub fn boxed(self) -> Document
    where
        S: 'static,
    {
        Document {
            inner: Box::new(self.inner),
        }
    }

    fn stream(&self) -> &dyn BodyStream {
        self.inner.events().unwrap_or(&Detached)
    }
}

impl<B: BodyStream> Document<Synthetic<B>> {
    /// Build a document from a status, the source's headers and a body.
    ///
    /// `headers` is retained verbatim as the original headers; the exposed
    /// mapping folds every name to lowercase, later names winning on collision.
    pub fn synthesize(status_code: StatusCode, headers: Headers, body: B) -> DocumentResult<Self> {
        if !body.readable() {
            tracing::debug!(status = %status_code, body = ?body, "Refusing to wrap a non-readable body");
            metrics::record_rejected("invalid_body");
            return Err(DocumentError::InvalidBody);
        }

        let normalized = headers.normalized();
        metrics::record_synthesized(status_code);
        Ok(Self {
            inner: Synthetic {
                status_code,
                headers: normalized,
                original_headers: headers,
                body,
            },
        })
    }

    /// The wrapped body.
    pub fn body(&self) -> &B {
        &self.inner.body
    }
}

impl<S: Shape> BodyStream for Document<S> {
    fn readable(&self) -> bool {
        self.stream().readable()
    }

    fn aborted(&self) -> bool {
        self.stream().aborted()
    }

    fn complete(&self) -> bool {
        self.stream().complete()
    }

    fn on(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.stream().on(kind, listener)
    }

    fn once(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.stream().once(kind, listener)
    }

    fn remove_listener(&self, kind: EventKind, id: ListenerId) -> bool {
        self.stream().remove_listener(kind, id)
    }

    fn add_listener(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.stream().add_listener(kind, listener)
    }

    fn pipe(&self, sink: Arc<dyn BodySink>) {
        self.stream().pipe(sink)
    }
}

impl<S: Shape> Shape for Document<S> {
    fn headers(&self) -> Option<&Headers> {
        self.inner.headers()
    }

    fn events(&self) -> Option<&dyn BodyStream> {
        self.inner.events()
    }

    fn status_code(&self) -> Option<StatusCode> {
        self.inner.status_code()
    }

    fn original_headers(&self) -> Option<&Headers> {
        self.inner.original_headers()
    }
}

/// Parts of a synthesized document.
#[derive(Debug)]
pub struct Synthetic<B> {
    status_code: StatusCode,
    headers: Headers,
    original_headers: Headers,
    body: B,
}

impl<B: BodyStream> Shape for Synthetic<B> {
    fn headers(&self) -> Option<&Headers> {
        Some(&self.headers)
    }

    fn events(&self) -> Option<&dyn BodyStream> {
        Some(&self.body)
    }

    fn status_code(&self) -> Option<StatusCode> {
        Some(self.status_code)
    }

    fn original_headers(&self) -> Option<&Headers> {
        Some(&self.original_headers)
    }
}

/// Stand-in for a candidate whose event capability disappeared after adoption.
#[derive(Debug)]
struct Detached;

impl BodyStream for Detached {
    fn readable(&self) -> bool {
        false
    }

    fn aborted(&self) -> bool {
        false
    }

    fn complete(&self) -> bool {
        false
    }

    fn on(&self, kind: EventKind, _listener: Listener) -> ListenerId {
        tracing::warn!(event = %kind, "Listener registered on a document without events");
        ListenerId(0)
    }

    fn once(&self, kind: EventKind, listener: Listener) -> ListenerId {
        self.on(kind, listener)
    }

    fn remove_listener(&self, _kind: EventKind, _id: ListenerId) -> bool {
        false
    }
}
