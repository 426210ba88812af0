//! Document construction errors.

use thiserror::Error;

/// Errors raised while constructing or coercing a document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    /// The body handed to synthesis is not readable.
    #[error("cannot wrap a non-readable stream")]
    InvalidBody,

    /// The candidate lacks the document capabilities.
    #[error("cannot cast {value} into a Document")]
    Coercion { value: String },
}

/// Result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;
