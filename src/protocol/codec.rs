//! Protocol codec
//!
//! Encoding and decoding functions for the wire protocol, independent of the
//! transport. Stream helpers at the bottom work on any `BufRead`/`Write`.

use std::io::{BufRead, Read, Write};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ArborError, Result};
use crate::store::Snapshot;
use super::{Command, Entry, ErrorResponse, Method, Request};

/// Separator between method and body
pub const SEPARATOR: &str = "||";

/// Maximum line size including terminator (16 MB)
pub const MAX_LINE_SIZE: usize = 16 * 1024 * 1024;

// =============================================================================
// Request Parsing
// =============================================================================

/// Split a raw line into method and body
///
/// Trailing `\r`/`\n` are stripped. Only the first separator counts.
pub fn parse_request(line: &str) -> Result<Request> {
    let line = line.trim_end_matches(['\r', '\n']);

    let (method, body) = match line.split_once(SEPARATOR) {
        Some((method, body)) => (method, Some(body.to_string())),
        None => (line, None),
    };

    let method: Method = method.trim().parse()?;
    Ok(Request::new(method, body))
}

/// Decode the body of a request into a typed command
pub fn decode_command(request: &Request) -> Result<Command> {
    match (request.method, request.body.as_deref()) {
        (Method::Get, Some(body)) => {
            let entry = decode_entry(body)?;
            Ok(Command::Get { key: entry.key })
        }
        (Method::Set, Some(body)) => {
            let entry = decode_entry(body)?;
            Ok(Command::Set {
                key: entry.key,
                value: entry.value,
            })
        }
        (Method::Recover, Some(body)) => Ok(Command::Recover {
            entries: decode_entries(body)?,
        }),
        (Method::GetAll, _) => Ok(Command::GetAll),
        (Method::Join, _) => Ok(Command::Join),
        (method, None) => Err(ArborError::ProtocolFormat(format!(
            "{} requires a body",
            method
        ))),
    }
}

/// Encode a command as a line (without terminator)
pub fn encode_command(command: &Command) -> Result<String> {
    let body = match command {
        Command::Get { key } => Some(to_json(&serde_json::json!({ "key": key }))?),
        Command::Set { key, value } => Some(to_json(&Entry::new(key.clone(), value.clone()))?),
        Command::Recover { entries } => Some(to_json(entries)?),
        Command::GetAll | Command::Join => None,
    };
    Ok(Request::new(command.method(), body).to_line())
}

// =============================================================================
// Body Encoding/Decoding
// =============================================================================

/// Decode a `{"key", "value"}` body
pub fn decode_entry(body: &str) -> Result<Entry> {
    from_json(body)
}

/// Decode a `[{"key", "value"}, ...]` body
pub fn decode_entries(body: &str) -> Result<Vec<Entry>> {
    from_json(body)
}

/// Encode a single entry reply
pub fn encode_entry(entry: &Entry) -> Result<String> {
    to_json(entry)
}

/// Encode a snapshot as an entry array, in key order
pub fn encode_entries(snapshot: &Snapshot) -> Result<String> {
    let entries: Vec<Entry> = snapshot
        .iter()
        .map(|(k, v)| Entry::new(k.as_str(), v.as_str()))
        .collect();
    to_json(&entries)
}

/// Build the bootstrap line sent in answer to JOIN
pub fn encode_recover(snapshot: &Snapshot) -> Result<String> {
    let body = encode_entries(snapshot)?;
    Ok(Request::new(Method::Recover, Some(body)).to_line())
}

/// Encode an error reply
///
/// Never fails: a message that cannot be serialized is replaced.
pub fn encode_error(message: &str) -> String {
    let response = ErrorResponse {
        error: message.to_string(),
    };
    serde_json::to_string(&response).unwrap_or_else(|e| {
        tracing::error!("Failed to encode error response: {}", e);
        r#"{"error":"internal error"}"#.to_string()
    })
}

/// Decode a reply line, turning `{"error": ...}` into `ArborError::Remote`
pub fn decode_reply<T: DeserializeOwned>(line: &str) -> Result<T> {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Ok(err) = serde_json::from_str::<ErrorResponse>(line) {
        return Err(ArborError::Remote(err.error));
    }
    from_json(line)
}

fn from_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| ArborError::ProtocolFormat(e.to_string()))
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| ArborError::Serialization(e.to_string()))
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one `\n`-terminated line
///
/// Returns `Ok(None)` on a clean EOF. An oversized line is a `Framing` error
/// (the rest of it is still unread). A complete line that is not UTF-8 is a
/// `ProtocolFormat` error and the reader stays on the next line.
pub fn read_line<R: BufRead>(reader: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let n = reader
        .by_ref()
        .take(MAX_LINE_SIZE as u64)
        .read_until(b'\n', &mut buf)?;

    if n == 0 {
        return Ok(None);
    }

    if n == MAX_LINE_SIZE && buf.last() != Some(&b'\n') {
        return Err(ArborError::Framing(format!(
            "line exceeds {} bytes",
            MAX_LINE_SIZE
        )));
    }

    let line = String::from_utf8(buf)
        .map_err(|e| ArborError::ProtocolFormat(format!("line is not UTF-8: {}", e)))?;
    Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
}

/// Write a line followed by `\n` and flush
pub fn write_line<W: Write>(writer: &mut W, line: &str) -> Result<()> {
    let mut bytes = Vec::with_capacity(line.len() + 1);
    bytes.extend_from_slice(line.as_bytes());
    bytes.push(b'\n');
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}
