//! # Relay Test Suite
//!
//! Cross-crate scenarios. Downstream services are stood in for by small
//! axum and TCP servers on ephemeral ports; the broker is the in-memory one.
//!
//! ```text
//! tests/src/
//! ├── fixtures.rs        # mock downstreams and request helpers
//! └── integration/
//!     ├── gateway_flows.rs     # /handle through every transport
//!     ├── event_flows.rs       # gateway → exchange → listener → logger
//!     └── resilience_flows.rs  # late brokers, lost brokers
//! ```
//!
//! ```bash
//! cargo test -p relay-tests
//! ```

#[cfg(test)]
pub mod fixtures;
pub mod integration;
