//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters via the `metrics` facade)
//!
//! Consumers:
//!     → stderr, pretty or JSON
//!     → whatever recorder the embedding application installs
//! ```
//!
//! # Design Decisions
//! - Key material never appears in a log field
//! - Metrics are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;
