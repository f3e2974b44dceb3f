//! In-memory store
//!
//! BTreeMap-based store with RwLock for concurrency.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::error::Result;
use super::{Snapshot, Storage};

/// In-memory storage core
///
/// ## Concurrency:
/// - `data`: RwLock (many concurrent readers, exclusive writer)
/// - All methods use `&self`; share it behind an `Arc`
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated from a startup source
    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let data = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        Self {
            data: RwLock::new(data),
        }
    }
}

impl Storage for MemoryStore {
    fn get(&self, key: &str) -> Result<String> {
        Ok(self.data.read().get(key).cloned().unwrap_or_default())
    }

    fn set(&self, key: &str, value: &str) -> Result<Option<String>> {
        Ok(self.data.write().insert(key.to_string(), value.to_string()))
    }

    fn get_all(&self) -> Result<Snapshot> {
        // Clone under the read lock so no writer can tear the copy
        let data = self.data.read();
        Ok(data.clone())
    }

    fn len(&self) -> usize {
        self.data.read().len()
    }
}
