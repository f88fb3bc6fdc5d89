use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use arc_swap::ArcSwap;

use crate::error::StoreError;
use crate::store::Store;

use super::Keyspace;
use super::transaction::MemoryTransaction;

/// Snapshot-isolated in-memory store.
///
/// Each keyspace is a persistent ordered map behind an `ArcSwap`. Read
/// transactions capture a snapshot per keyspace on first access; a single
/// write transaction at a time mutates working copies and publishes them
/// atomically on commit.
pub struct MemoryStore {
    keyspaces: RwLock<HashMap<String, Arc<ArcSwap<Keyspace>>>>,
    write_lock: Mutex<()>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            keyspaces: RwLock::new(HashMap::new()),
            write_lock: Mutex::new(()),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the write lock. Only one write transaction can exist at a time.
    pub(crate) fn acquire_write_lock(&self) -> Result<MutexGuard<'_, ()>, StoreError> {
        self.write_lock
            .lock()
            .map_err(|e| StoreError::Storage(format!("write lock poisoned: {e}")))
    }

    /// Snapshot a single keyspace (lazy, called on first access).
    pub(crate) fn snapshot(&self, name: &str) -> Option<Arc<Keyspace>> {
        let keyspaces = self.keyspaces.read().unwrap();
        let swap = keyspaces.get(name)?;
        Some(swap.load_full())
    }

    /// Publish dirty keyspaces. The caller must already hold the write lock,
    /// so no conflict detection is needed.
    pub(crate) fn publish(&self, dirty: HashMap<String, Keyspace>) {
        let keyspaces = self.keyspaces.read().unwrap();
        for (name, data) in dirty {
            if let Some(swap) = keyspaces.get(&name) {
                swap.store(Arc::new(data));
            }
        }
    }
}

impl Store for MemoryStore {
    type Txn<'a> = MemoryTransaction<'a>;

    fn begin(&self, read_only: bool) -> Result<Self::Txn<'_>, StoreError> {
        if read_only {
            Ok(MemoryTransaction::new_read_only(self))
        } else {
            let guard = self.acquire_write_lock()?;
            Ok(MemoryTransaction::new_writable(self, guard))
        }
    }

    fn create_keyspace(&self, name: &str) -> Result<(), StoreError> {
        let mut keyspaces = self.keyspaces.write().unwrap();
        keyspaces
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ArcSwap::new(Arc::new(Keyspace::new()))));
        Ok(())
    }
}
