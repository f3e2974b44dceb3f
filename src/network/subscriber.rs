//! Parent-link subscriber
//!
//! Dials the configured parent, performs the JOIN/RECOVER handshake and then
//! relays every line the parent sends through the normal dispatch loop.

use std::io::BufReader;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::{Config, ParentLossPolicy};
use crate::error::{ArborError, Result};
use crate::node::Node;
use crate::protocol::{decode_command, parse_request, read_line, Command, Entry, Method};

use super::connection::Connection;
use super::peer::{Peer, Role};

/// Keeps this node attached to its parent
pub struct Subscriber {
    node: Arc<Node>,
    parent_addr: String,
    policy: ParentLossPolicy,
    write_timeout: Option<Duration>,
}

impl Subscriber {
    /// Subscriber for a non-root node; `None` when no parent is configured
    pub fn new(config: &Config, node: Arc<Node>) -> Option<Self> {
        let parent_addr = config.parent_addr.clone()?;
        Some(Self {
            node,
            parent_addr,
            policy: config.on_parent_loss,
            write_timeout: config.write_timeout(),
        })
    }

    pub fn parent_addr(&self) -> &str {
        &self.parent_addr
    }

    /// Dial the parent, join it and apply its snapshot
    ///
    /// Returns the parent link ready for relaying. Any failure here leaves
    /// the parent slot empty.
    pub fn bootstrap(&self) -> Result<Connection> {
        let stream = TcpStream::connect(&self.parent_addr).map_err(|e| {
            ArborError::Connection(format!("dialing parent {}: {}", self.parent_addr, e))
        })?;
        stream.set_nodelay(true)?;
        stream.set_write_timeout(self.write_timeout)?;

        let peer = Peer::from_stream(&stream)?;
        let mut reader = BufReader::new(stream);

        let count = self
            .node
            .attach_parent(&peer, || Self::handshake(&mut reader, &peer))?;
        tracing::info!("Bootstrapped {} entries from parent {}", count, peer.addr());

        Ok(Connection::from_parts(reader, peer, Arc::clone(&self.node), Role::Parent))
    }

    /// Send JOIN and read the RECOVER reply
    fn handshake(reader: &mut BufReader<TcpStream>, peer: &Peer) -> Result<Vec<Entry>> {
        peer.send_line(Method::Join.as_str()).map_err(|e| {
            ArborError::Connection(format!("sending JOIN to {}: {}", peer.addr(), e))
        })?;

        let line = read_line(reader)
            .map_err(|e| ArborError::Bootstrap(format!("reading snapshot: {}", e)))?
            .ok_or_else(|| {
                ArborError::Bootstrap("parent closed the link before sending a snapshot".to_string())
            })?;

        match parse_request(&line).and_then(|r| decode_command(&r)) {
            Ok(Command::Recover { entries }) => Ok(entries),
            Ok(other) => Err(ArborError::Bootstrap(format!(
                "expected RECOVER, got {}",
                other.method()
            ))),
            Err(e) => Err(ArborError::Bootstrap(e.to_string())),
        }
    }

    /// Relay the parent link until it is lost, then apply the loss policy
    ///
    /// `Ok` means the node detached and keeps running as a root; `Err` means
    /// the loss is fatal.
    pub fn run(self, link: Connection) -> Result<()> {
        let mut link = link;
        loop {
            match link.handle() {
                Ok(()) => tracing::warn!("Parent {} closed the link", self.parent_addr),
                Err(e) => tracing::warn!("Parent link {} failed: {}", self.parent_addr, e),
            }

            match self.policy {
                ParentLossPolicy::Detach => {
                    tracing::info!("Detached from parent, continuing as root");
                    return Ok(());
                }
                ParentLossPolicy::Exit => {
                    return Err(ArborError::Connection(format!(
                        "lost parent link {}",
                        self.parent_addr
                    )));
                }
                ParentLossPolicy::Reconnect { attempts, backoff } => {
                    link = self.reconnect(attempts, backoff)?;
                }
            }
        }
    }

    fn reconnect(&self, attempts: u32, backoff: Duration) -> Result<Connection> {
        for attempt in 1..=attempts {
            thread::sleep(backoff);
            match self.bootstrap() {
                Ok(link) => {
                    tracing::info!("Rejoined parent {} (attempt {})", self.parent_addr, attempt);
                    return Ok(link);
                }
                Err(e) => tracing::warn!(
                    "Reconnect to {} failed (attempt {}/{}): {}",
                    self.parent_addr,
                    attempt,
                    attempts,
                    e
                ),
            }
        }
        Err(ArborError::Connection(format!(
            "could not rejoin parent {} after {} attempts",
            self.parent_addr, attempts
        )))
    }

    /// Bootstrap synchronously, then relay on a background thread
    pub fn spawn(self) -> Result<JoinHandle<Result<()>>> {
        let link = self.bootstrap()?;
        let handle = thread::Builder::new()
            .name("arborkv-parent".to_string())
            .spawn(move || self.run(link))?;
        Ok(handle)
    }
}
