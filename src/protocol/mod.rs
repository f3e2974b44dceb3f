//! Protocol Module
//!
//! Defines the line-oriented wire protocol shared by clients and peer nodes.
//!
//! ## Line Format
//! ```text
//! line := method ["||" body] "\n"
//! ```
//!
//! ### Methods
//! - GET:     body `{"key": k}`            -> `{"key": k, "value": v}` (v may be "")
//! - SET:     body `{"key": k, "value": v}` -> `{"key": k, "value": v}`
//! - GETALL:  no body                       -> `[{"key": k, "value": v}, ...]`
//! - JOIN:    no body                       -> `RECOVER||[{"key": k, "value": v}, ...]`
//! - RECOVER: body `[{"key": k, "value": v}, ...]`, no reply
//!
//! ### Errors
//! ```text
//! {"error": "..."}
//! ```
//!
//! The body starts after the first `||`; later occurrences belong to the body.

mod command;
mod response;
mod codec;

pub use command::{Command, Method, Request};
pub use response::{Entry, ErrorResponse};
pub use codec::{
    decode_command, decode_entries, decode_entry, decode_reply, encode_command, encode_entries,
    encode_entry, encode_error, encode_recover, parse_request, read_line, write_line,
    MAX_LINE_SIZE, SEPARATOR,
};
