//! Connection Handler
//!
//! Runs the read-dispatch-reply loop for one connection. Accepted client
//! connections and the dialed parent link share this loop; only the role
//! differs.

use std::io::{BufReader, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ArborError, Result};
use crate::node::{Node, Outcome};
use crate::protocol::{encode_error, read_line};

use super::peer::{Peer, Role};

/// Handles a single connection
pub struct Connection {
    /// TCP stream reader (buffered for line reads)
    reader: BufReader<TcpStream>,

    /// Shared write handle (also held by the registry once joined)
    peer: Peer,

    /// Node the commands are dispatched to
    node: Arc<Node>,

    role: Role,
}

impl Connection {
    /// Wrap a freshly accepted stream as a client connection
    pub fn new(stream: TcpStream, node: Arc<Node>) -> Result<Self> {
        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let peer = Peer::from_stream(&stream)?;
        Ok(Self {
            reader: BufReader::new(stream),
            peer,
            node,
            role: Role::Client,
        })
    }

    /// Assemble a connection from parts that were already used (parent link)
    pub fn from_parts(reader: BufReader<TcpStream>, peer: Peer, node: Arc<Node>, role: Role) -> Self {
        Self {
            reader,
            peer,
            node,
            role,
        }
    }

    /// Configure the write timeout on the underlying socket
    pub fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.reader.get_ref().set_write_timeout(timeout)?;
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads lines in a loop and dispatches them. Returns when the peer
    /// disconnects or the link fails. Child and parent registrations held by
    /// this connection are dropped on the way out.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established with {} ({:?})", self.peer.addr(), self.role);

        let result = self.run_loop();
        self.deregister();
        result
    }

    fn run_loop(&mut self) -> Result<()> {
        loop {
            let line = match read_line(&mut self.reader) {
                Ok(Some(line)) => line,
                Ok(None) => {
                    tracing::debug!("{} disconnected", self.peer.addr());
                    return Ok(());
                }
                Err(ArborError::Io(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Connection to {} dropped: {}", self.peer.addr(), e);
                    return Ok(());
                }
                Err(e @ ArborError::ProtocolFormat(_)) => {
                    // The whole line was consumed; answer it and keep reading
                    if let Err(send_err) = self.answer_error(&e) {
                        return self.finish_on_send_error(send_err);
                    }
                    continue;
                }
                Err(e @ ArborError::Framing(_)) => {
                    tracing::warn!("Unreadable line from {}: {}", self.peer.addr(), e);
                    if self.role.wants_replies() {
                        let _ = self.peer.send_line(&encode_error(&e.to_string()));
                    }
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer.addr(), e);
                    return Err(e);
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            if let Err(e) = self.dispatch(&line) {
                return self.finish_on_send_error(e);
            }
        }
    }

    fn finish_on_send_error(&self, e: ArborError) -> Result<()> {
        if let ArborError::Io(ref io_err) = e {
            if is_disconnect(io_err.kind()) {
                tracing::debug!(
                    "{} disconnected before the reply could be sent: {}",
                    self.peer.addr(),
                    e
                );
                return Ok(());
            }
        }
        tracing::warn!("Closing connection to {}: {}", self.peer.addr(), e);
        Err(e)
    }

    /// Reply with an error line on client connections, log it on links
    fn answer_error(&self, e: &ArborError) -> Result<()> {
        if self.role.wants_replies() {
            self.peer.send_line(&encode_error(&e.to_string()))?;
        } else {
            tracing::warn!(
                "Dropping bad line on {:?} link {}: {}",
                self.role,
                self.peer.addr(),
                e
            );
        }
        Ok(())
    }

    /// Execute one line and answer it if this is a client connection
    fn dispatch(&mut self, line: &str) -> Result<()> {
        match self.node.process(line, &self.peer, self.role) {
            Ok(Outcome::Reply(reply)) => {
                if self.role.wants_replies() {
                    self.peer.send_line(&reply)?;
                }
            }
            Ok(Outcome::Joined) => {
                self.role = Role::Child;
            }
            Ok(Outcome::Applied) => {}
            Err(e) if e.is_recoverable() => self.answer_error(&e)?,
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn deregister(&self) {
        match self.role {
            Role::Child => {
                self.node.registry().remove_child_link(&self.peer);
            }
            Role::Parent => {
                self.node.registry().remove_parent_link(&self.peer);
            }
            Role::Client => {}
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        self.peer.addr()
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}
