//! Capability probe for document-like values.
//!
//! A value counts as a document when it exposes a header mapping and an
//! event-registration capability, whatever its concrete type. Types opt in
//! to being probed by implementing [`Shape`]; each capability is answered
//! with an `Option`.

use std::fmt;
use std::sync::Arc;

use hyper::StatusCode;

use super::headers::Headers;
use crate::stream::{BodyStream, ReadableBody};

/// Structural view of a candidate document.
///
/// Answers must not change over the lifetime of a value: a candidate that
/// passed [`is_document`] keeps both capabilities.
pub trait Shape: fmt::Debug + Send + Sync {
    /// The `headers` capability.
    ///
    /// Names should be lowercase. Lookups through [`Document::get_header`]
    /// still find other spellings, at the cost of a linear scan.
    ///
    /// [`Document::get_header`]: super::Document::get_header
    fn headers(&self) -> Option<&Headers>;

    /// The `on` capability: event registration and the rest of the stream contract.
    fn events(&self) -> Option<&dyn BodyStream>;

    fn status_code(&self) -> Option<StatusCode> {
        None
    }

    /// Headers exactly as the source supplied them, if retained.
    fn original_headers(&self) -> Option<&Headers> {
        None
    }
}

/// True iff `candidate` has both the headers and the event capability.
pub fn is_document<S: Shape + ?Sized>(candidate: &S) -> bool {
    candidate.headers().is_some() && candidate.events().is_some()
}

impl<S: Shape + ?Sized> Shape for Box<S> {
    fn headers(&self) -> Option<&Headers> {
        (**self).headers()
    }

    fn events(&self) -> Option<&dyn BodyStream> {
        (**self).events()
    }

    fn status_code(&self) -> Option<StatusCode> {
        (**self).status_code()
    }

    fn original_headers(&self) -> Option<&Headers> {
        (**self).original_headers()
    }
}

impl<S: Shape + ?Sized> Shape for Arc<S> {
    fn headers(&self) -> Option<&Headers> {
        (**self).headers()
    }

    fn events(&self) -> Option<&dyn BodyStream> {
        (**self).events()
    }

    fn status_code(&self) -> Option<StatusCode> {
        (**self).status_code()
    }

    fn original_headers(&self) -> Option<&Headers> {
        (**self).original_headers()
    }
}

/// A bare header map has headers but cannot emit events.
impl Shape for Headers {
    fn headers(&self) -> Option<&Headers> {
        Some(self)
    }

    fn events(&self) -> Option<&dyn BodyStream> {
        None
    }
}

/// A bare body can emit events but carries no headers.
impl Shape for ReadableBody {
    fn headers(&self) -> Option<&Headers> {
        None
    }

    fn events(&self) -> Option<&dyn BodyStream> {
        Some(self)
    }
}
