//! TCP Server
//!
//! Accepts connections and runs each on its own thread.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::Config;
use crate::error::{ArborError, Result};
use crate::node::Node;
use crate::protocol::{encode_error, write_line};

use super::connection::Connection;

/// TCP server for one ArborKV node
pub struct Server {
    config: Config,
    node: Arc<Node>,
    listener: TcpListener,

    /// Connections currently being served
    active: Arc<AtomicUsize>,
}

/// Decrements the active connection count when a connection thread ends
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Server {
    /// Bind the listening socket
    pub fn bind(config: Config, node: Arc<Node>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            ArborError::Connection(format!("binding {}: {}", config.listen_addr, e))
        })?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            config,
            node,
            listener,
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept loop (blocking, never returns under normal operation)
    ///
    /// Accept errors are logged and the loop keeps going.
    pub fn run(&self) -> Result<()> {
        for stream in self.listener.incoming() {
            match stream {
                Ok(stream) => self.spawn_connection(stream),
                Err(e) => tracing::warn!("Error accepting connection: {}", e),
            }
        }
        Ok(())
    }

    /// Run the accept loop on a background thread
    pub fn spawn(self) -> Result<JoinHandle<Result<()>>> {
        let handle = thread::Builder::new()
            .name("arborkv-accept".to_string())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    fn spawn_connection(&self, stream: TcpStream) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let guard = ActiveGuard(Arc::clone(&self.active));

        if active > self.config.max_connections {
            tracing::warn!("Connection limit {} reached, rejecting", self.config.max_connections);
            let mut stream = stream;
            let _ = write_line(&mut stream, &encode_error("too many connections"));
            drop(guard);
            return;
        }

        let node = Arc::clone(&self.node);
        let write_timeout = self.config.write_timeout();

        let spawned = thread::Builder::new()
            .name("arborkv-conn".to_string())
            .spawn(move || {
                let _guard = guard;
                let mut connection = match Connection::new(stream, node) {
                    Ok(c) => c,
                    Err(e) => {
                        tracing::warn!("Failed to set up connection: {}", e);
                        return;
                    }
                };
                if let Err(e) = connection.set_write_timeout(write_timeout) {
                    tracing::warn!("Failed to set write timeout for {}: {}", connection.peer_addr(), e);
                }
                if let Err(e) = connection.handle() {
                    tracing::debug!("Connection {} closed with error: {}", connection.peer_addr(), e);
                }
            });

        if let Err(e) = spawned {
            tracing::error!("Failed to spawn connection thread: {}", e);
        }
    }
}
