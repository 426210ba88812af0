//! Uniform documents for a caching proxy.
//!
//! A document is one HTTP-style response, whether it came from the origin
//! server, a filesystem read, or a cache lookup. Downstream code sees the
//! same status/header access and the same streaming contract for all three.
//!
//! # Architecture Overview
//!
//! ```text
//!   Origin response ──▶ http::IncomingMessage ──▶ Document::coerce ───┐
//!                       (already document-shaped, adopted as-is)      │
//!                                                                     ▼
//!   Cache / file read ─▶ (status, Headers, ReadableBody) ─▶ Document::synthesize
//!                                                                     │
//!                                                                     ▼
//!                          Document<S>: status_code, headers, get_header,
//!                          on / once / add_listener / remove_listener / pipe,
//!                          readable / aborted / complete
//!                                                                     │
//!                                                                     ▼
//!                                               http::into_response ──▶ client
//! ```
//!
//! # Example
//!
//! ```
//! use hyper::StatusCode;
//! use proxy_document::{Document, Headers, ReadableBody};
//!
//! let (_sender, body) = ReadableBody::channel();
//! let headers = Headers::from([("Content-Type", "text/html"), ("X-Foo", "1")]);
//! let doc = Document::synthesize(StatusCode::OK, headers, body).unwrap();
//!
//! assert_eq!(doc.get_header("content-type"), Some("text/html"));
//! assert_eq!(doc.original_headers().unwrap().get("X-Foo"), Some("1"));
//! ```

pub mod config;
pub mod document;
pub mod http;
pub mod observability;
pub mod stream;

pub use config::DocumentConfig;
pub use document::{
    is_document, Document, DocumentError, FieldValue, Headers, Shape, SyntheticDocument,
};
pub use stream::{BodyEvent, BodyStream, EventKind, ReadableBody, StreamError};
