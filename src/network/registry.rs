//! Connection registry / broadcaster
//!
//! Tracks the optional parent link and the children of this node, and fans
//! raw command lines out to them.

use std::collections::HashMap;

use parking_lot::Mutex;

use super::peer::{Peer, PeerId};

/// Registered replication links
#[derive(Debug, Default)]
struct Links {
    parent: Option<Peer>,
    children: HashMap<String, Peer>,
}

/// Registry of replication targets
///
/// ## Concurrency:
/// - One mutex guards both the parent slot and the child map
/// - `broadcast` holds it for the whole fan-out, so concurrent
///   `add_child`/`remove_child` can never race an in-flight iteration
#[derive(Debug, Default)]
pub struct Registry {
    links: Mutex<Links>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a child, replacing any previous link from the same address
    pub fn add_child(&self, peer: Peer) {
        let addr = peer.addr().to_string();
        let previous = self.links.lock().children.insert(addr.clone(), peer);
        if previous.is_some() {
            tracing::debug!("Child {} re-registered", addr);
        }
        tracing::info!("Child node connected: {}", addr);
    }

    /// Remove the child registered under `addr`
    pub fn remove_child(&self, addr: &str) -> bool {
        let removed = self.links.lock().children.remove(addr).is_some();
        if removed {
            tracing::info!("Child node disconnected: {}", addr);
        }
        removed
    }

    /// Remove `peer` only if it is still the link registered for its address
    pub fn remove_child_link(&self, peer: &Peer) -> bool {
        let mut links = self.links.lock();
        match links.children.get(peer.addr()) {
            Some(current) if current.id() == peer.id() => {
                links.children.remove(peer.addr());
                tracing::info!("Child node disconnected: {}", peer.addr());
                true
            }
            _ => false,
        }
    }

    pub fn add_parent(&self, peer: Peer) {
        tracing::info!("Parent node connected: {}", peer.addr());
        self.links.lock().parent = Some(peer);
    }

    pub fn remove_parent(&self) -> bool {
        let removed = self.links.lock().parent.take();
        if let Some(peer) = &removed {
            tracing::info!("Parent node disconnected: {}", peer.addr());
        }
        removed.is_some()
    }

    /// Clear the parent slot only if it still holds `peer`
    pub fn remove_parent_link(&self, peer: &Peer) -> bool {
        let mut links = self.links.lock();
        match &links.parent {
            Some(current) if current.id() == peer.id() => {
                links.parent = None;
                tracing::info!("Parent node disconnected: {}", peer.addr());
                true
            }
            _ => false,
        }
    }

    pub fn has_parent(&self) -> bool {
        self.links.lock().parent.is_some()
    }

    pub fn child_count(&self) -> usize {
        self.links.lock().children.len()
    }

    /// Addresses of all registered children, sorted
    pub fn child_addrs(&self) -> Vec<String> {
        let mut addrs: Vec<String> = self.links.lock().children.keys().cloned().collect();
        addrs.sort();
        addrs
    }

    /// Forward `line` to every child and then to the parent
    ///
    /// The link identified by `exclude` (the one the command arrived on) is
    /// skipped. A failed write evicts only the failing link and shuts its
    /// socket down. Returns the number of links the line was written to.
    pub fn broadcast(&self, line: &str, exclude: Option<PeerId>) -> usize {
        self.fan_out(line, exclude, true)
    }

    /// Forward `line` to the children only
    pub fn broadcast_to_children(&self, line: &str, exclude: Option<PeerId>) -> usize {
        self.fan_out(line, exclude, false)
    }

    fn fan_out(&self, line: &str, exclude: Option<PeerId>, include_parent: bool) -> usize {
        let mut links = self.links.lock();
        let mut delivered = 0;
        let mut failed = Vec::new();

        for (addr, child) in links.children.iter() {
            if Some(child.id()) == exclude {
                continue;
            }
            match child.send_line(line) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!("Broadcast to child {} failed, evicting: {}", addr, e);
                    failed.push(addr.clone());
                }
            }
        }

        for addr in failed {
            if let Some(child) = links.children.remove(&addr) {
                child.shutdown();
            }
        }

        let parent_failed = match &links.parent {
            Some(parent) if include_parent && Some(parent.id()) != exclude => {
                match parent.send_line(line) {
                    Ok(()) => {
                        delivered += 1;
                        false
                    }
                    Err(e) => {
                        tracing::warn!(
                            "Broadcast to parent {} failed, clearing link: {}",
                            parent.addr(),
                            e
                        );
                        true
                    }
                }
            }
            _ => false,
        };

        if parent_failed {
            if let Some(parent) = links.parent.take() {
                parent.shutdown();
            }
        }

        tracing::trace!("Broadcast delivered to {} links", delivered);
        delivered
    }
}
