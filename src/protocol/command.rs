//! Command definitions
//!
//! Represents commands exchanged between clients and nodes.

use std::fmt;
use std::str::FromStr;

use crate::error::ArborError;
use super::Entry;

/// Method tag at the start of every line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Set,
    GetAll,
    Join,
    Recover,
}

impl Method {
    pub const ALL: [Method; 5] = [
        Method::Get,
        Method::Set,
        Method::GetAll,
        Method::Join,
        Method::Recover,
    ];

    /// Wire spelling of the method
    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Set => "SET",
            Method::GetAll => "GETALL",
            Method::Join => "JOIN",
            Method::Recover => "RECOVER",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ArborError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ArborError::ProtocolFormat(format!("unknown method {:?}", s)))
    }
}

/// A received line split into method and raw body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,

    /// Raw body text; `None` when absent or empty
    pub body: Option<String>,
}

impl Request {
    pub fn new(method: Method, body: Option<String>) -> Self {
        let body = body.filter(|b| !b.is_empty());
        Self { method, body }
    }

    /// Rebuild the line (without terminator) for forwarding
    pub fn to_line(&self) -> String {
        match &self.body {
            Some(body) => format!("{}{}{}", self.method, super::SEPARATOR, body),
            None => self.method.to_string(),
        }
    }
}

/// A fully decoded command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read a key (soft miss on absent keys)
    Get { key: String },

    /// Write a key-value pair
    Set { key: String, value: String },

    /// Dump every entry
    GetAll,

    /// Register the sender as a child and bootstrap it
    Join,

    /// Bulk-apply a snapshot
    Recover { entries: Vec<Entry> },
}

impl Command {
    pub fn method(&self) -> Method {
        match self {
            Command::Get { .. } => Method::Get,
            Command::Set { .. } => Method::Set,
            Command::GetAll => Method::GetAll,
            Command::Join => Method::Join,
            Command::Recover { .. } => Method::Recover,
        }
    }
}
