//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! signer / tracker / dev chain produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters through the `metrics` facade)
//! ```
//!
//! # Design Decisions
//! - Structured fields (nonce, tx_hash, block_hash) on every event
//! - Key material is never part of an event
//! - Metrics are no-ops until the embedding binary installs a recorder

pub mod logging;
pub mod metrics;
