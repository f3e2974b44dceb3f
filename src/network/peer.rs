//! Peer handles
//!
//! A cloneable write handle to one connection, shared between the task that
//! owns the connection and the registry that broadcasts to it.

use std::fmt;
use std::io::{BufWriter, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::protocol::write_line;

/// Process-unique connection identifier
pub type PeerId = u64;

static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(1);

/// Role a connection plays in the replication tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Ordinary request/response client
    Client,

    /// A node below us that joined over this connection
    Child,

    /// Our link to the node above us
    Parent,
}

impl Role {
    /// Replication links never get replies; the peer would parse them as commands
    pub fn wants_replies(&self) -> bool {
        matches!(self, Role::Client)
    }
}

/// Write side of a connection
///
/// Lines are written whole under the handle's mutex, so a reply and a
/// broadcast never interleave on the wire.
#[derive(Clone)]
pub struct Peer {
    id: PeerId,
    addr: String,
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    socket: Option<Arc<TcpStream>>,
}

impl Peer {
    /// Wrap any writer (tests use in-memory or failing writers)
    pub fn new(addr: impl Into<String>, writer: impl Write + Send + 'static) -> Self {
        let writer: Box<dyn Write + Send> = Box::new(writer);
        Self {
            id: NEXT_PEER_ID.fetch_add(1, Ordering::Relaxed),
            addr: addr.into(),
            writer: Arc::new(Mutex::new(writer)),
            socket: None,
        }
    }

    /// Attach the socket that `shutdown` closes
    pub fn with_socket(mut self, socket: TcpStream) -> Self {
        self.socket = Some(Arc::new(socket));
        self
    }

    /// Create a handle writing to a clone of `stream`
    pub fn from_stream(stream: &TcpStream) -> Result<Self> {
        let addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let write_stream = stream.try_clone()?;
        let socket = stream.try_clone()?;
        Ok(Self::new(addr, BufWriter::new(write_stream)).with_socket(socket))
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// Remote address, used as the registry key for children
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Write one line (a `\n` is appended) and flush
    pub fn send_line(&self, line: &str) -> Result<()> {
        let mut writer = self.writer.lock();
        write_line(&mut *writer, line)
    }

    /// Close both directions of the underlying socket
    ///
    /// The reader thread of this connection sees EOF and exits. A no-op for
    /// handles without a socket.
    pub fn shutdown(&self) {
        if let Some(socket) = &self.socket {
            if let Err(e) = socket.shutdown(Shutdown::Both) {
                tracing::debug!("Shutdown of {} failed: {}", self.addr, e);
            }
        }
    }
}

impl fmt::Debug for Peer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .finish()
    }
}
