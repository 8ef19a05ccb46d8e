//! Stream entry parsing and reply envelope encoding.
//!
//! The gateway writes every field as a string. Structured fields (`args`,
//! `stash`) are JSON whose inner double quotes were backslash-escaped by the
//! producer, so they are unescaped before decoding.

use crate::error::{CodecError, ParseError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const FIELD_RPC: &str = "rpc";
pub const FIELD_ARGS: &str = "args";
pub const FIELD_STASH: &str = "stash";
pub const FIELD_DEADLINE: &str = "deadline";
pub const FIELD_WHO: &str = "who";
pub const FIELD_MESSAGE_ID: &str = "message_id";

/// A typed RPC request built from one stream entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Operation name.
    pub rpc: String,
    /// Caller arguments, opaque to the relay.
    pub args: Map<String, Value>,
    /// Opaque context forwarded to the handler.
    pub stash: Vec<String>,
    /// Epoch seconds after which the request must not be processed.
    pub deadline: i64,
    /// `deadline` exactly as it arrived, echoed in the reply.
    pub deadline_raw: String,
    /// Channel the caller listens on for the reply.
    pub who: String,
    /// Caller-assigned correlation id.
    pub message_id: String,
    /// Stream position, used only for acknowledgment.
    pub entry_id: String,
}

impl Request {
    /// Whether the deadline has passed at `now` (epoch seconds).
    pub fn is_expired_at(&self, now: i64) -> bool {
        now > self.deadline
    }
}

/// Parse the field set of one stream entry into a [`Request`].
pub fn parse_request(
    entry_id: &str,
    fields: &HashMap<String, Vec<u8>>,
) -> Result<Request, ParseError> {
    let rpc = text_field(fields, FIELD_RPC)?;
    let args: Map<String, Value> = decode_escaped_json(FIELD_ARGS, text_field(fields, FIELD_ARGS)?)?;
    let stash: Vec<String> = decode_escaped_json(FIELD_STASH, text_field(fields, FIELD_STASH)?)?;

    let deadline_raw = text_field(fields, FIELD_DEADLINE)?;
    let deadline = deadline_raw
        .parse::<i64>()
        .map_err(|source| ParseError::InvalidDeadline {
            raw: deadline_raw.to_string(),
            source,
        })?;

    let who = text_field(fields, FIELD_WHO)?;
    let message_id = text_field(fields, FIELD_MESSAGE_ID)?;

    Ok(Request {
        rpc: rpc.to_string(),
        args,
        stash,
        deadline,
        deadline_raw: deadline_raw.to_string(),
        who: who.to_string(),
        message_id: message_id.to_string(),
        entry_id: entry_id.to_string(),
    })
}

fn text_field<'a>(
    fields: &'a HashMap<String, Vec<u8>>,
    name: &'static str,
) -> Result<&'a str, ParseError> {
    let bytes = fields.get(name).ok_or(ParseError::Missing(name))?;
    std::str::from_utf8(bytes).map_err(|_| ParseError::NotText(name))
}

/// Undo the producer's `\"` escaping and decode the result as `T`.
///
/// Input that was never escaped passes through unchanged, so decoding is
/// idempotent with respect to the unescape step.
pub fn decode_escaped_json<T: DeserializeOwned>(
    field: &'static str,
    raw: &str,
) -> Result<T, ParseError> {
    let unescaped = raw.replace("\\\"", "\"");
    serde_json::from_str(&unescaped).map_err(|source| ParseError::InvalidJson {
        field,
        raw: raw.to_string(),
        source,
    })
}

#[derive(Serialize)]
struct ReplyEnvelope<'a> {
    rpc: &'a str,
    message_id: &'a str,
    response: ReplyBody<'a>,
    deadline: &'a str,
    args: &'a Map<String, Value>,
    who: &'a str,
}

#[derive(Serialize)]
struct ReplyBody<'a> {
    result: &'a Value,
    timestamp: i64,
}

/// Build the JSON reply envelope for `request`, stamped with the current time.
pub fn build_reply(request: &Request, result: &Value) -> Result<Vec<u8>, CodecError> {
    build_reply_at(request, result, chrono::Utc::now().timestamp())
}

/// Build the JSON reply envelope with an explicit `timestamp` (epoch seconds).
pub fn build_reply_at(
    request: &Request,
    result: &Value,
    timestamp: i64,
) -> Result<Vec<u8>, CodecError> {
    let envelope = ReplyEnvelope {
        rpc: &request.rpc,
        message_id: &request.message_id,
        response: ReplyBody { result, timestamp },
        deadline: &request.deadline_raw,
        args: &request.args,
        who: &request.who,
    };

    serde_json::to_vec(&envelope).map_err(|source| CodecError {
        rpc: request.rpc.clone(),
        source,
    })
}
