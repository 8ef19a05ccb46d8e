//! Integration tests for the stream RPC relay.
//!
//! Each test runs a real [`Relay`](crate::Relay) against an in-memory
//! consumer group:
//!
//! - `harness.rs`           - Mock Redis, recording handler, log capture
//! - `ack.rs`               - I. Acknowledgment (Rules 1-5)
//! - `deadline.rs`          - II. Deadlines (Rules 6-8, 25)
//! - `dispatch.rs`          - III. Dispatch & Backpressure (Rules 9-11, 29)
//! - `parse_failure.rs`     - IV. Unparseable Entries (Rules 12-15)
//! - `transport_failure.rs` - V. Transport Failure Handling (Rules 16-19)
//! - `shutdown.rs`          - VI. Shutdown (Rules 20-21)
//! - `scenarios.rs`         - VII. End-to-End Scenarios (Rules 22-24)
//! - `redelivery.rs`        - VIII. Redelivery (Rules 26-28)

mod ack;
mod transport_failure;

#[allow(unused_imports)]
pub use harness::{MockRedis, RecordingHandler, RelayRun};
