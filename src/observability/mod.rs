//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (document and body counters)
//! ```
//!
//! # Design Decisions
//! - Body ID flows through every body-level log event
//! - Metrics are cheap (no-ops without a recorder)

pub mod logging;
pub mod metrics;
