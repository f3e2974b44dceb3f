//! Network Module
//!
//! TCP server, per-connection dispatch loop and parent link.
//!
//! ## Architecture
//! - Single acceptor thread, one thread per accepted connection
//! - One relay thread for the parent link (non-root nodes only)
//! - Every line is routed through `Node::process`
//! - `Registry` holds the child/parent write handles used for fan-out

mod peer;
mod registry;
mod connection;
mod server;
mod subscriber;

pub use peer::{Peer, PeerId, Role};
pub use registry::Registry;
pub use connection::Connection;
pub use server::Server;
pub use subscriber::Subscriber;
