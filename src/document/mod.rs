//! Document subsystem.
//!
//! # Data Flow
//! ```text
//! Origin response (already document-shaped)
//!     → shape.rs (capability test: headers + events)
//!     → Document::coerce (adopted unchanged)
//!
//! Cache / filesystem read (status, headers, body)
//!     → headers.rs (lowercase view, original kept)
//!     → Document::synthesize (same contract)
//!
//! Both paths
//!     → Document<S>: status_code, headers, get_header, stream contract
//! ```
//!
//! # Design Decisions
//! - Membership is decided by capabilities, never by concrete type
//! - Header maps are fixed at construction
//! - Stream operations are forwarded, never buffered

#[allow(clippy::module_inception)]
pub mod document;
pub mod error;
pub mod headers;
pub mod shape;

pub use document::{Document, Synthetic, SyntheticDocument};
pub use error::{DocumentError, DocumentResult};
pub use headers::{FieldValue, Headers};
pub use shape::{is_document, Shape};
