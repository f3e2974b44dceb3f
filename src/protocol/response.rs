//! Response definitions
//!
//! JSON shapes carried in bodies and replies.

use serde::{Deserialize, Serialize};

/// One key/value pair, used for request bodies, replies and snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub key: String,

    /// Absent in GET bodies
    #[serde(default)]
    pub value: String,
}

impl Entry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Error reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
