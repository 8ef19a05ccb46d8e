//! Redis Streams transport.
//!
//! Handles XGROUP, XREADGROUP, XAUTOCLAIM, XACK and PUBLISH against the RPC
//! stream.
//! The relay only talks to the stream server through [`StreamTransport`],
//! which keeps the reader, pool and reply publisher testable without Redis.

use crate::error::{RelayError, RelayResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::StreamReadReply;
use redis::{AsyncCommands, Client, RedisResult};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// One entry read from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// The stream's own entry id (e.g., "1715602477318-0").
    pub id: String,
    /// Raw field values keyed by field name.
    pub fields: HashMap<String, Vec<u8>>,
}

/// Cursor value that starts and ends an XAUTOCLAIM scan.
pub const CLAIM_CURSOR_START: &str = "0-0";

/// One page of pending entries taken over from idle consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClaimedBatch {
    /// Cursor for the next page; [`CLAIM_CURSOR_START`] once the scan is done.
    pub next_cursor: String,
    pub entries: Vec<StreamEntry>,
}

/// Operations the relay needs from the stream server.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Create `group` on `stream` starting from the beginning of the stream.
    /// An already existing group is not an error.
    async fn ensure_group(&self, stream: &str, group: &str) -> RelayResult<()>;

    /// Read up to `count` entries never delivered to any consumer of `group`.
    /// Returns an empty batch when `block_ms` elapses with nothing to read.
    async fn read_batch(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> RelayResult<Vec<StreamEntry>>;

    /// Take over up to `count` entries of `group` that have been pending for
    /// at least `min_idle_ms`, scanning the pending list from `cursor`.
    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
        cursor: &str,
    ) -> RelayResult<ClaimedBatch>;

    /// Acknowledge `entry_id`, removing it from the group's pending list.
    /// Returns whether the server actually acknowledged an entry.
    async fn ack(&self, stream: &str, group: &str, entry_id: &str) -> RelayResult<bool>;

    /// Publish `payload` on `channel`. Returns the number of receivers.
    async fn publish(&self, channel: &str, payload: &[u8]) -> RelayResult<i64>;

    /// Re-establish connections after a transport failure.
    async fn reconnect(&self) -> RelayResult<()> {
        Ok(())
    }
}

/// [`StreamTransport`] backed by a Redis server.
///
/// Blocking reads run on their own connection: a multiplexed connection
/// serialises commands, so sharing it would hold acks and publishes behind
/// an `XREADGROUP ... BLOCK`.
pub struct RedisTransport {
    client: Client,
    read_conn: RwLock<MultiplexedConnection>,
    command_conn: RwLock<MultiplexedConnection>,
}

impl RedisTransport {
    /// Connect to the Redis server at `redis_url`.
    pub async fn connect(redis_url: &str) -> RelayResult<Self> {
        let client = Client::open(redis_url)?;
        let read_conn = client.get_multiplexed_async_connection().await?;
        let command_conn = client.get_multiplexed_async_connection().await?;

        Ok(Self {
            client,
            read_conn: RwLock::new(read_conn),
            command_conn: RwLock::new(command_conn),
        })
    }

    async fn command_conn(&self) -> MultiplexedConnection {
        self.command_conn.read().await.clone()
    }
}

#[async_trait]
impl StreamTransport for RedisTransport {
    async fn ensure_group(&self, stream: &str, group: &str) -> RelayResult<()> {
        // XGROUP CREATE key groupname 0 MKSTREAM
        // 0 so entries appended before the group existed are still served
        let result: RedisResult<()> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(stream)
            .arg(group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut self.command_conn().await)
            .await;

        match result {
            Ok(()) => {
                info!(stream = %stream, group = %group, "Created consumer group");
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") || e.to_string().contains("BUSYGROUP") => {
                debug!(stream = %stream, group = %group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_batch(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: u64,
    ) -> RelayResult<Vec<StreamEntry>> {
        let mut conn = self.read_conn.read().await.clone();

        // XREADGROUP GROUP groupname consumername COUNT n BLOCK ms STREAMS key >
        let value: redis::Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS")
            .arg(stream)
            .arg(">")
            .query_async(&mut conn)
            .await?;

        if matches!(value, redis::Value::Nil) {
            return Ok(Vec::new());
        }

        let reply: StreamReadReply = redis::from_redis_value(&value).map_err(|e| {
            RelayError::Protocol(format!("Unexpected XREADGROUP response: {}", e))
        })?;

        Ok(entries_from_reply(reply))
    }

    async fn claim_idle(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
        cursor: &str,
    ) -> RelayResult<ClaimedBatch> {
        // XAUTOCLAIM key group consumer min-idle-time start COUNT n
        let value: redis::Value = redis::cmd("XAUTOCLAIM")
            .arg(stream)
            .arg(group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg(cursor)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut self.command_conn().await)
            .await?;

        claimed_from_reply(value)
    }

    async fn ack(&self, stream: &str, group: &str, entry_id: &str) -> RelayResult<bool> {
        let acked: i64 = self
            .command_conn()
            .await
            .xack(stream, group, &[entry_id])
            .await?;

        if acked != 1 {
            warn!(
                entry_id = %entry_id,
                stream = %stream,
                "XACK returned {}, entry may not be pending",
                acked
            );
        }

        Ok(acked == 1)
    }

    async fn publish(&self, channel: &str, payload: &[u8]) -> RelayResult<i64> {
        let receivers: i64 = self.command_conn().await.publish(channel, payload).await?;
        Ok(receivers)
    }

    async fn reconnect(&self) -> RelayResult<()> {
        info!("Reconnecting to Redis...");
        let read_conn = self.client.get_multiplexed_async_connection().await?;
        let command_conn = self.client.get_multiplexed_async_connection().await?;
        *self.read_conn.write().await = read_conn;
        *self.command_conn.write().await = command_conn;
        Ok(())
    }
}

/// Flatten an XREADGROUP reply into entries, keeping raw field bytes.
fn entries_from_reply(reply: StreamReadReply) -> Vec<StreamEntry> {
    let mut entries = Vec::new();

    for key in reply.keys {
        for stream_id in key.ids {
            let mut fields = HashMap::with_capacity(stream_id.map.len());
            for (name, value) in stream_id.map {
                match value {
                    redis::Value::BulkString(bytes) => {
                        fields.insert(name, bytes);
                    }
                    redis::Value::SimpleString(text) => {
                        fields.insert(name, text.into_bytes());
                    }
                    _ => {
                        debug!(entry_id = %stream_id.id, field = %name, "Skipping non-string field");
                    }
                }
            }
            entries.push(StreamEntry {
                id: stream_id.id,
                fields,
            });
        }
    }

    entries
}

/// Decode an XAUTOCLAIM reply: `[next_cursor, [[id, [field, value, ..]], ..], ..]`.
///
/// Entries deleted from the stream while pending come back as nil and are
/// skipped.
fn claimed_from_reply(value: redis::Value) -> RelayResult<ClaimedBatch> {
    let redis::Value::Array(parts) = value else {
        return Err(RelayError::Protocol(
            "Unexpected XAUTOCLAIM response: not an array".to_string(),
        ));
    };
    let mut parts = parts.into_iter();

    let next_cursor = parts.next().and_then(value_text).ok_or_else(|| {
        RelayError::Protocol("Unexpected XAUTOCLAIM response: missing cursor".to_string())
    })?;
    let Some(redis::Value::Array(items)) = parts.next() else {
        return Err(RelayError::Protocol(
            "Unexpected XAUTOCLAIM response: missing entries".to_string(),
        ));
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let redis::Value::Array(pair) = item else {
            continue;
        };
        let mut pair = pair.into_iter();
        let (Some(id), Some(body)) = (pair.next().and_then(value_text), pair.next()) else {
            continue;
        };

        let raw_pairs: Vec<(redis::Value, redis::Value)> = match body {
            redis::Value::Array(flat) => {
                let mut flat = flat.into_iter();
                let mut pairs = Vec::new();
                while let (Some(name), Some(value)) = (flat.next(), flat.next()) {
                    pairs.push((name, value));
                }
                pairs
            }
            redis::Value::Map(pairs) => pairs,
            _ => {
                debug!(entry_id = %id, "Skipping claimed entry without fields");
                continue;
            }
        };

        let mut fields = HashMap::with_capacity(raw_pairs.len());
        for (name, value) in raw_pairs {
            if let (Some(name), Some(bytes)) = (value_text(name), value_bytes(value)) {
                fields.insert(name, bytes);
            }
        }
        entries.push(StreamEntry { id, fields });
    }

    Ok(ClaimedBatch {
        next_cursor,
        entries,
    })
}

fn value_bytes(value: redis::Value) -> Option<Vec<u8>> {
    match value {
        redis::Value::BulkString(bytes) => Some(bytes),
        redis::Value::SimpleString(text) => Some(text.into_bytes()),
        _ => None,
    }
}

fn value_text(value: redis::Value) -> Option<String> {
    value_bytes(value).and_then(|bytes| String::from_utf8(bytes).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use redis::Value;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    fn xreadgroup_reply(stream: &str, entries: Vec<(&str, Vec<Value>)>) -> Value {
        let entries = entries
            .into_iter()
            .map(|(id, fields)| Value::Array(vec![bulk(id), Value::Array(fields)]))
            .collect();
        Value::Array(vec![Value::Array(vec![bulk(stream), Value::Array(entries)])])
    }

    #[test]
    fn test_entries_from_reply_keeps_field_bytes() {
        let value = xreadgroup_reply(
            "notifications",
            vec![(
                "1-0",
                vec![bulk("rpc"), bulk("get_notifications"), bulk("who"), bulk("R1")],
            )],
        );
        let reply: StreamReadReply = redis::from_redis_value(&value).unwrap();

        let entries = entries_from_reply(reply);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, "1-0");
        assert_eq!(entries[0].fields["rpc"], b"get_notifications".to_vec());
        assert_eq!(entries[0].fields["who"], b"R1".to_vec());
    }

    #[test]
    fn test_entries_from_reply_preserves_stream_order() {
        let value = xreadgroup_reply(
            "notifications",
            vec![
                ("1-0", vec![bulk("rpc"), bulk("a")]),
                ("1-1", vec![bulk("rpc"), bulk("b")]),
                ("2-0", vec![bulk("rpc"), bulk("c")]),
            ],
        );
        let reply: StreamReadReply = redis::from_redis_value(&value).unwrap();

        let order: Vec<String> = entries_from_reply(reply).into_iter().map(|e| e.id).collect();
        assert_eq!(order, vec!["1-0", "1-1", "2-0"]);
    }

    #[test]
    fn test_claimed_from_reply() {
        let value = Value::Array(vec![
            bulk("5-0"),
            Value::Array(vec![
                Value::Array(vec![
                    bulk("1-0"),
                    Value::Array(vec![bulk("rpc"), bulk("get_notifications")]),
                ]),
                Value::Nil,
                Value::Array(vec![bulk("3-0"), Value::Array(vec![bulk("who"), bulk("R1")])]),
            ]),
            Value::Array(vec![bulk("2-0")]),
        ]);

        let batch = claimed_from_reply(value).unwrap();

        assert_eq!(batch.next_cursor, "5-0");
        let ids: Vec<&str> = batch.entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["1-0", "3-0"]);
        assert_eq!(batch.entries[0].fields["rpc"], b"get_notifications".to_vec());
        assert_eq!(batch.entries[1].fields["who"], b"R1".to_vec());
    }

    #[test]
    fn test_claimed_from_reply_end_of_scan() {
        let value = Value::Array(vec![bulk(CLAIM_CURSOR_START), Value::Array(vec![])]);

        let batch = claimed_from_reply(value).unwrap();

        assert_eq!(batch.next_cursor, CLAIM_CURSOR_START);
        assert!(batch.entries.is_empty());
    }

    #[test]
    fn test_claimed_from_reply_rejects_bad_shape() {
        assert!(matches!(
            claimed_from_reply(Value::Nil),
            Err(RelayError::Protocol(_))
        ));
        assert!(matches!(
            claimed_from_reply(Value::Array(vec![bulk("0-0")])),
            Err(RelayError::Protocol(_))
        ));
    }
}
