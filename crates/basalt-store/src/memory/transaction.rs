use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::store::{ScanIter, Transaction};

use super::Keyspace;
use super::store::MemoryStore;

pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    /// Working copies of every keyspace touched so far. Captured lazily so a
    /// transaction sees one consistent snapshot per keyspace.
    working: Mutex<HashMap<String, Keyspace>>,
    /// Keyspaces with writes pending publication.
    dirty: Mutex<HashSet<String>>,
    read_only: bool,
    _write_guard: Option<MutexGuard<'a, ()>>,
}

impl<'a> MemoryTransaction<'a> {
    pub(crate) fn new_read_only(store: &'a MemoryStore) -> Self {
        Self {
            store,
            working: Mutex::new(HashMap::new()),
            dirty: Mutex::new(HashSet::new()),
            read_only: true,
            _write_guard: None,
        }
    }

    pub(crate) fn new_writable(store: &'a MemoryStore, guard: MutexGuard<'a, ()>) -> Self {
        Self {
            store,
            working: Mutex::new(HashMap::new()),
            dirty: Mutex::new(HashSet::new()),
            read_only: false,
            _write_guard: Some(guard),
        }
    }

    /// Get the working copy of a keyspace, snapshotting it on first access.
    /// The persistent map clones in O(1).
    fn keyspace(&self, name: &str) -> Result<Keyspace, StoreError> {
        let mut working = self.working.lock().unwrap();
        if let Some(ks) = working.get(name) {
            return Ok(ks.clone());
        }
        let snapshot = self
            .store
            .snapshot(name)
            .ok_or_else(|| StoreError::KeyspaceNotFound(name.to_string()))?;
        let ks = (*snapshot).clone();
        working.insert(name.to_string(), ks.clone());
        Ok(ks)
    }

    fn store_back(&self, name: &str, ks: Keyspace) {
        self.working.lock().unwrap().insert(name.to_string(), ks);
        self.dirty.lock().unwrap().insert(name.to_string());
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }
}

impl Transaction for MemoryTransaction<'_> {
    fn get(&self, ks: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let map = self.keyspace(ks)?;
        Ok(map.get(key).cloned())
    }

    fn scan_prefix(&self, ks: &str, prefix: &[u8]) -> Result<ScanIter<'_>, StoreError> {
        let map = self.keyspace(ks)?;
        let entries: Vec<(Vec<u8>, Vec<u8>)> = map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn scan_prefix_rev(&self, ks: &str, prefix: &[u8]) -> Result<ScanIter<'_>, StoreError> {
        let map = self.keyspace(ks)?;
        let mut entries: Vec<(Vec<u8>, Vec<u8>)> = map
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.reverse();
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn scan_from(&self, ks: &str, start: &[u8], reverse: bool) -> Result<ScanIter<'_>, StoreError> {
        let map = self.keyspace(ks)?;
        let entries: Vec<(Vec<u8>, Vec<u8>)> = if reverse {
            let mut below: Vec<(Vec<u8>, Vec<u8>)> = map
                .range(..=start.to_vec())
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            below.reverse();
            below
        } else {
            map.range(start.to_vec()..)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        };
        Ok(Box::new(entries.into_iter().map(Ok)))
    }

    fn put(&self, ks: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut map = self.keyspace(ks)?;
        map.insert(key.to_vec(), value.to_vec());
        self.store_back(ks, map);
        Ok(())
    }

    fn delete(&self, ks: &str, key: &[u8]) -> Result<(), StoreError> {
        self.check_writable()?;
        let mut map = self.keyspace(ks)?;
        map.remove(key);
        self.store_back(ks, map);
        Ok(())
    }

    fn commit(self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        let working = self.working.into_inner().unwrap();
        let dirty = self.dirty.into_inner().unwrap();
        let pending: HashMap<String, Keyspace> = working
            .into_iter()
            .filter(|(name, _)| dirty.contains(name))
            .collect();
        self.store.publish(pending);
        Ok(())
    }

    fn rollback(self) -> Result<(), StoreError> {
        Ok(())
    }
}
