//! Stream RPC relay: serves RPC commands from a Redis Stream consumer group.
//!
//! An upstream gateway appends commands to a stream. The relay reads them
//! through a consumer group, drops requests whose deadline has passed,
//! dispatches the rest to an [`RpcHandler`] on a fixed pool of workers, and
//! publishes each result on the caller's reply channel.
//!
//! # Core Invariants
//!
//! 1. **Ack Once**: every parsed entry is acknowledged exactly once, either
//!    as expired (no reply) or after its reply attempt
//! 2. **Ack Last**: acknowledgment never precedes the reply attempt
//! 3. **Bounded**: a full work queue blocks the reader, nothing else does
//! 4. **At-Least-Once**: an entry not acked (crash, failed ack, shutdown
//!    mid-read) stays pending and is reclaimed once idle for
//!    `claim_idle_ms`
//!
//! Entries that fail to parse are left pending unless
//! [`ParseFailurePolicy::Ack`] is configured, so they come back on every
//! reclaim pass.

pub mod codec;
pub mod config;
pub mod error;
pub mod handler;
pub mod pool;
pub mod reader;
pub mod relay;
pub mod reply;
pub mod transport;

#[cfg(test)]
mod tests;

pub use codec::{build_reply, decode_escaped_json, parse_request, Request};
pub use config::{ParseFailurePolicy, RelayConfig};
pub use error::{CodecError, HandlerError, ParseError, RelayError, RelayResult};
pub use handler::RpcHandler;
pub use pool::{Clock, DispatchPool, Outcome, SystemClock};
pub use reader::{ReaderStats, StreamReader};
pub use relay::Relay;
pub use reply::{Delivery, ReplyPublisher};
pub use transport::{ClaimedBatch, RedisTransport, StreamEntry, StreamTransport};
