//! Node Module
//!
//! Command dispatch for one node of the replication tree.
//!
//! ## Responsibilities
//! - Route decoded commands to the store and the registry
//! - Keep local apply and fan-out in the same order on every node
//! - Bootstrap joining children with a consistent snapshot

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{ArborError, Result};
use crate::network::{Peer, PeerId, Registry, Role};
use crate::protocol::{
    decode_command, encode_command, encode_entries, encode_entry, encode_recover, parse_request,
    Command, Entry, Request,
};
use crate::store::{MemoryStore, Snapshot, Storage};

/// What the connection should do after a command was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Send this line back (clients only)
    Reply(String),

    /// The connection is now a registered child; its snapshot was already sent
    Joined,

    /// Applied, nothing to answer
    Applied,
}

/// A node: storage core plus replication registry
///
/// ## Concurrency Model
///
/// - **Writes** (set/recover/join): Serialized by `write_lock`
///   - Store mutation and broadcast happen under the same guard, so every
///     node forwards writes in the order it applied them
///   - JOIN takes the guard while it snapshots and registers the child, so a
///     write is either in the snapshot or broadcast after it
///   - Attaching to a parent holds the guard across JOIN/RECOVER, so local
///     writes wait until the parent's snapshot is applied
///
/// - **Reads** (get/get_all): Store read lock only
pub struct Node {
    store: Arc<dyn Storage>,
    registry: Registry,
    write_lock: Mutex<()>,
}

impl Node {
    pub fn new(store: Arc<dyn Storage>) -> Self {
        Self {
            store,
            registry: Registry::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Node backed by an empty in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn store(&self) -> &dyn Storage {
        self.store.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Parse, decode and execute one received line
    pub fn process(&self, line: &str, peer: &Peer, role: Role) -> Result<Outcome> {
        let request = parse_request(line)?;
        let command = decode_command(&request)?;
        tracing::trace!("{} from {} ({:?})", request.method, peer.addr(), role);
        self.execute(command, &request, peer, role)
    }

    fn execute(&self, command: Command, request: &Request, peer: &Peer, role: Role) -> Result<Outcome> {
        match command {
            Command::Get { key } => {
                let entry = self.get(&key)?;
                Ok(Outcome::Reply(encode_entry(&entry)?))
            }
            Command::Set { key, value } => {
                let entry = self.apply_set(key, value, &request.to_line(), Some(peer.id()))?;
                Ok(Outcome::Reply(encode_entry(&entry)?))
            }
            Command::GetAll => Ok(Outcome::Reply(encode_entries(&self.snapshot()?)?)),
            Command::Join => {
                if role == Role::Parent {
                    return Err(ArborError::ProtocolFormat(
                        "JOIN is not accepted from the parent link".to_string(),
                    ));
                }
                self.join(peer)?;
                Ok(Outcome::Joined)
            }
            Command::Recover { entries } => {
                self.recover(entries, Some(peer.id()))?;
                Ok(Outcome::Applied)
            }
        }
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Read a key; absent keys come back with an empty value
    pub fn get(&self, key: &str) -> Result<Entry> {
        let value = self.store.get(key)?;
        Ok(Entry::new(key, value))
    }

    /// Write a key locally and fan it out to every link
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> Result<Entry> {
        let (key, value) = (key.into(), value.into());
        let line = encode_command(&Command::Set {
            key: key.clone(),
            value: value.clone(),
        })?;
        self.apply_set(key, value, &line, None)
    }

    /// Point-in-time copy of the store
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.store.get_all()
    }

    /// Send `peer` the bootstrap snapshot and register it as a child
    pub fn join(&self, peer: &Peer) -> Result<()> {
        let _write_guard = self.write_lock.lock();

        let snapshot = self.store.get_all()?;
        let payload = encode_recover(&snapshot)?;
        peer.send_line(&payload).map_err(|e| {
            ArborError::Connection(format!("sending snapshot to {}: {}", peer.addr(), e))
        })?;

        tracing::debug!("Sent {} entries to joining child {}", snapshot.len(), peer.addr());
        self.registry.add_child(peer.clone());
        Ok(())
    }

    /// Register `peer` as the parent and apply the snapshot `handshake` fetches
    ///
    /// The write lock is held from registration until the snapshot is
    /// applied, so a local write either lands before the parent is attached
    /// or after its snapshot, never in between. On failure the parent slot
    /// is cleared again. Returns the number of snapshot entries.
    pub fn attach_parent<F>(&self, peer: &Peer, handshake: F) -> Result<usize>
    where
        F: FnOnce() -> Result<Vec<Entry>>,
    {
        let _write_guard = self.write_lock.lock();

        self.registry.add_parent(peer.clone());
        let result = handshake().and_then(|entries| {
            let count = entries.len();
            self.recover_locked(entries, Some(peer.id()))
                .map_err(|e| ArborError::Bootstrap(e.to_string()))?;
            Ok(count)
        });

        if result.is_err() {
            self.registry.remove_parent_link(peer);
        }
        result
    }

    /// Apply a bulk snapshot in order
    ///
    /// Every entry is written. Entries that change the local value are
    /// forwarded as SET lines to the children (never upward), so nodes
    /// already attached below stay in sync.
    /// Returns the number of changed entries.
    pub fn recover(&self, entries: Vec<Entry>, origin: Option<PeerId>) -> Result<usize> {
        let _write_guard = self.write_lock.lock();
        self.recover_locked(entries, origin)
    }

    /// Caller holds `write_lock`
    fn recover_locked(&self, entries: Vec<Entry>, origin: Option<PeerId>) -> Result<usize> {
        let total = entries.len();
        let mut changed = 0;
        for Entry { key, value } in entries {
            let previous = self.store.set(&key, &value)?;
            if previous.as_deref() == Some(value.as_str()) {
                continue;
            }
            changed += 1;

            let line = encode_command(&Command::Set { key, value })?;
            self.registry.broadcast_to_children(&line, origin);
        }

        tracing::debug!("Recovered {} entries ({} changed)", total, changed);
        Ok(changed)
    }

    /// Store first, then broadcast, both under the write lock
    fn apply_set(&self, key: String, value: String, line: &str, origin: Option<PeerId>) -> Result<Entry> {
        let _write_guard = self.write_lock.lock();

        self.store.set(&key, &value)?;
        self.registry.broadcast(line, origin);

        Ok(Entry { key, value })
    }
}
