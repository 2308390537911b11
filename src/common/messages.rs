//! # Query Messages
//!
//! Data model for one round trip against the query endpoint.
//!
//! ## Wire Protocol
//!
//! A request is a `multipart/form-data` POST:
//! ```text
//! query = [ {command}, {command}, ... ]     (JSON text, one part)
//! blobs = <raw bytes>                       (one part per attachment, in order)
//! ```
//!
//! A successful response is a JSON object:
//! ```text
//! { "json": [ {result}, ... ], "blobs": [ "<base64>", ... ] }
//! ```
//! `json` is sometimes transmitted as a string holding JSON text; both forms
//! are accepted. A missing or `null` `blobs` field means no payloads.

use base64::{engine::general_purpose, Engine as _};
use serde_json::Value;

use super::error::{ClientError, Result};

/// Multipart field carrying the JSON-encoded command sequence.
pub const QUERY_FIELD: &str = "query";

/// Repeated multipart field carrying one attachment per part.
pub const BLOBS_FIELD: &str = "blobs";

/// An ordered command sequence plus the binary attachments it references.
///
/// Commands are opaque to the client; attachment order is preserved end to
/// end and is the only link between an attachment and the command using it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryRequest {
    pub commands: Vec<Value>,
    pub attachments: Vec<Vec<u8>>,
}

impl QueryRequest {
    pub fn new(commands: Vec<Value>) -> Self {
        Self {
            commands,
            attachments: Vec::new(),
        }
    }

    /// Build a request from a JSON array of commands, e.g. `json!([{"FindImage": {}}])`.
    pub fn from_json(query: Value) -> Result<Self> {
        match query {
            Value::Array(commands) => Ok(Self::new(commands)),
            other => Err(ClientError::InvalidRequest(format!(
                "query must be a JSON array of commands, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Append an attachment after any already present.
    pub fn with_attachment(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.attachments.push(bytes.into());
        self
    }

    /// Serialize the command sequence into the text sent as the `query` part.
    pub(crate) fn encode_commands(&self) -> Result<String> {
        if self.commands.is_empty() {
            return Err(ClientError::InvalidRequest(
                "at least one command is required".to_string(),
            ));
        }
        serde_json::to_string(&self.commands)
            .map_err(|e| ClientError::InvalidRequest(format!("failed to encode commands: {}", e)))
    }
}

/// Parsed result of a successful round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    /// One result object per submitted command, as returned by the server.
    pub json: Value,
    /// Decoded binary payloads, in the server's return order.
    pub blobs: Vec<Vec<u8>>,
}

impl QueryResponse {
    /// Demultiplex a response body into its `json` value and decoded blobs.
    ///
    /// Either the whole body parses or the call fails; no partial response
    /// is ever produced.
    pub fn from_body(body: &[u8]) -> Result<Self> {
        let envelope: Value = serde_json::from_slice(body)
            .map_err(|e| ClientError::MalformedResponse(format!("body is not valid JSON: {}", e)))?;

        let mut fields = match envelope {
            Value::Object(fields) => fields,
            other => {
                return Err(ClientError::MalformedResponse(format!(
                    "expected a JSON object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let json = match fields.remove("json") {
            None => {
                return Err(ClientError::MalformedResponse(
                    "missing 'json' field".to_string(),
                ))
            }
            Some(Value::String(text)) => serde_json::from_str(&text).map_err(|e| {
                ClientError::MalformedResponse(format!("'json' field is not valid JSON: {}", e))
            })?,
            Some(value) => value,
        };

        let blobs = match fields.remove("blobs") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries
                .iter()
                .enumerate()
                .map(|(index, entry)| decode_blob(index, entry))
                .collect::<Result<Vec<_>>>()?,
            Some(other) => {
                return Err(ClientError::MalformedResponse(format!(
                    "'blobs' must be an array, got {}",
                    json_kind(&other)
                )))
            }
        };

        Ok(Self { json, blobs })
    }

    /// Status of the first command result; `0` when none is reported.
    ///
    /// Descends through the single-key command wrapper, so
    /// `[{"FindImage": {"status": -1}}]` yields `-1`.
    pub fn status(&self) -> i64 {
        command_status(&self.json)
    }

    /// True when the first command did not report a negative status.
    pub fn is_ok(&self) -> bool {
        self.status() >= 0
    }

    /// Name and body of the command result at `index`.
    pub fn command(&self, index: usize) -> Option<(&str, &Value)> {
        let Value::Object(wrapper) = self.json.as_array()?.get(index)? else {
            return None;
        };
        wrapper.iter().next().map(|(name, body)| (name.as_str(), body))
    }

    /// Body of the result at `index` if it belongs to `command`.
    pub fn result(&self, index: usize, command: &str) -> Option<&Value> {
        match self.command(index) {
            Some((name, body)) if name == command => Some(body),
            _ => None,
        }
    }

    /// Pretty-printed `json` value, for display.
    pub fn pretty(&self) -> String {
        serde_json::to_string_pretty(&self.json).unwrap_or_else(|_| self.json.to_string())
    }
}

fn decode_blob(index: usize, entry: &Value) -> Result<Vec<u8>> {
    let Value::String(encoded) = entry else {
        return Err(ClientError::MalformedResponse(format!(
            "blob #{} is {}, expected a base64 string",
            index,
            json_kind(entry)
        )));
    };
    general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ClientError::MalformedResponse(format!("blob #{} is not base64: {}", index, e)))
}

fn command_status(value: &Value) -> i64 {
    match value {
        Value::Object(map) => match map.get("status") {
            Some(status) => status.as_i64().unwrap_or(0),
            None => map.values().next().map(command_status).unwrap_or(0),
        },
        Value::Array(items) => items.first().map(command_status).unwrap_or(0),
        _ => 0,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
