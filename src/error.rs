//! Error types for ArborKV
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using ArborError
pub type Result<T> = std::result::Result<T, ArborError>;

/// Unified error type for ArborKV operations
#[derive(Debug, Error)]
pub enum ArborError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Protocol Errors (answered on the connection, which stays open)
    // -------------------------------------------------------------------------
    #[error("wrong message format: {0}")]
    ProtocolFormat(String),

    /// The line boundary was lost; the connection cannot continue
    #[error("Framing error: {0}")]
    Framing(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    StorageIo(String),

    // -------------------------------------------------------------------------
    // Replication Errors
    // -------------------------------------------------------------------------
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Bootstrap from parent failed: {0}")]
    Bootstrap(String),

    #[error("Remote error: {0}")]
    Remote(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ArborError {
    /// Errors that are answered with an error line instead of closing the link
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ArborError::ProtocolFormat(_) | ArborError::StorageIo(_) | ArborError::Serialization(_)
        )
    }
}
