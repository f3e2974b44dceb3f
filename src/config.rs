//! Configuration for ArborKV
//!
//! Centralized configuration with sensible defaults.

use std::time::Duration;

use crate::error::{ArborError, Result};

/// Main configuration for an ArborKV node
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address
    pub listen_addr: String,

    /// Max concurrent client connections
    pub max_connections: usize,

    /// Connection write timeout (milliseconds, 0 = none)
    pub write_timeout_ms: u64,

    // -------------------------------------------------------------------------
    // Replication Configuration
    // -------------------------------------------------------------------------
    /// Upstream node to join. `None` makes this node the root of the tree.
    pub parent_addr: Option<String>,

    /// What the relay does once an established parent link breaks
    pub on_parent_loss: ParentLossPolicy,
}

/// Behaviour of the parent relay after the link to the parent is lost
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentLossPolicy {
    /// Clear the parent link and keep serving as a root
    Detach,

    /// Report the loss as fatal (the server binary exits)
    Exit,

    /// Redial and redo the join handshake, then behave like `Exit`
    Reconnect { attempts: u32, backoff: Duration },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:7070".to_string(),
            max_connections: 1024,
            write_timeout_ms: 5000,
            parent_addr: None,
            on_parent_loss: ParentLossPolicy::Detach,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// True when no parent is configured
    pub fn is_root(&self) -> bool {
        self.parent_addr.is_none()
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        (self.write_timeout_ms > 0).then(|| Duration::from_millis(self.write_timeout_ms))
    }

    /// Reject configurations the node cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.trim().is_empty() {
            return Err(ArborError::Config("listen address is empty".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ArborError::Config("max_connections must be positive".to_string()));
        }
        if let Some(parent) = &self.parent_addr {
            if parent == &self.listen_addr {
                return Err(ArborError::Config(format!(
                    "parent address {} is this node's own listen address",
                    parent
                )));
            }
        }
        Ok(())
    }
}

/// Join a host and port into a dialable address.
///
/// Returns `None` unless both parts are non-empty, so a half-configured
/// parent is treated as "no parent".
pub fn join_host_port(host: &str, port: &str) -> Option<String> {
    let host = host.trim();
    let port = port.trim();
    if host.is_empty() || port.is_empty() {
        return None;
    }
    if host.contains(':') && !host.starts_with('[') {
        // bare IPv6 literal
        Some(format!("[{}]:{}", host, port))
    } else {
        Some(format!("{}:{}", host, port))
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the write timeout (in milliseconds)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    /// Set the parent node to join
    pub fn parent_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.parent_addr = Some(addr.into());
        self
    }

    /// Set or clear the parent node
    pub fn parent(mut self, addr: Option<String>) -> Self {
        self.config.parent_addr = addr;
        self
    }

    /// Set the parent-loss policy
    pub fn on_parent_loss(mut self, policy: ParentLossPolicy) -> Self {
        self.config.on_parent_loss = policy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
