//! Store Module
//!
//! The storage core: the only place a node holds data.
//!
//! ## Responsibilities
//! - Point reads and writes (last-writer-wins, no versions)
//! - Point-in-time snapshots for the join handshake
//! - Never expose a partially applied write to readers
//!
//! ## Data Structure Choice
//! BTreeMap behind a parking_lot RwLock:
//! - Writers serialize on the exclusive lock
//! - Readers share the lock; snapshots are copied out while holding it
//! - Ordered keys give snapshots a deterministic entry order

mod memory;

pub use memory::MemoryStore;

use std::collections::BTreeMap;

use crate::error::Result;

/// Point-in-time copy of every entry in a store
pub type Snapshot = BTreeMap<String, String>;

/// Backend contract for the storage core.
///
/// Every operation returns a `Result` even though the in-memory backend
/// cannot fail, so a durable backend can report `StorageIo` errors.
pub trait Storage: Send + Sync {
    /// Value for `key`, or an empty string if the key was never set
    fn get(&self, key: &str) -> Result<String>;

    /// Insert or overwrite `key`, returning the previous value if any
    fn set(&self, key: &str, value: &str) -> Result<Option<String>>;

    /// Copy of all entries
    fn get_all(&self) -> Result<Snapshot>;

    /// Number of distinct keys
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
