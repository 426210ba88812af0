//! HTTP boundary adapters.
//!
//! # Data Flow
//! ```text
//! Origin (hyper client response)
//!     → incoming.rs (IncomingMessage: head captured, body pumped)
//!     → Document::coerce (adopted as-is)
//!     → [cache layer may store or synthesize] (external)
//!     → response.rs (hop-by-hop stripped, body streamed with backpressure)
//!     → Send to client
//! ```

pub mod incoming;
pub mod response;

pub use incoming::IncomingMessage;
pub use response::{into_response, into_response_with, is_hop_by_hop, HOP_BY_HOP_HEADERS};
