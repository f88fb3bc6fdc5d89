use basalt_document::{Document, EncodedDocument, FieldBuffer, Value, encode, key};
use basalt_store::{Store, Transaction as KvTransaction};

use crate::catalog::{IndexInfo, TableHandle, TableInfo};
use crate::error::EngineError;
use crate::keys::{self, DATA_KS, SYS_KS};
use crate::validate;

/// Storage engine facade: owns the store and hands out transactions.
pub struct Engine<S: Store> {
    store: S,
}

impl<S: Store> Engine<S> {
    pub fn new(store: S) -> Result<Self, EngineError> {
        store.create_keyspace(SYS_KS)?;
        store.create_keyspace(DATA_KS)?;
        Ok(Self { store })
    }

    pub fn begin(&self, writable: bool) -> Result<Transaction<'_, S>, EngineError> {
        Ok(Transaction {
            txn: self.store.begin(!writable)?,
        })
    }
}

pub type RecordIter<'a> =
    Box<dyn Iterator<Item = Result<(Vec<u8>, EncodedDocument), EngineError>> + 'a>;

/// One index scan hit. `is_equal` flags entries whose value equals the scan
/// pivot, letting strict range operators drop them.
pub struct IndexEntry {
    pub value_key: Vec<u8>,
    pub pk: Vec<u8>,
    pub is_equal: bool,
}

pub type IndexIter<'a> = Box<dyn Iterator<Item = Result<IndexEntry, EngineError>> + 'a>;

pub struct Transaction<'a, S: Store + 'a> {
    txn: S::Txn<'a>,
}

impl<'a, S: Store + 'a> Transaction<'a, S> {
    pub fn commit(self) -> Result<(), EngineError> {
        self.txn.commit()?;
        Ok(())
    }

    pub fn rollback(self) -> Result<(), EngineError> {
        self.txn.rollback()?;
        Ok(())
    }

    // ── Catalog ─────────────────────────────────────────────────

    fn load_table_info(&self, name: &str) -> Result<TableInfo, EngineError> {
        let bytes = self
            .txn
            .get(SYS_KS, &keys::table_meta_key(name))?
            .ok_or_else(|| EngineError::TableNotFound(name.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::Corrupted(format!("table {name}: {e}")))
    }

    fn store_table_info(&self, name: &str, info: &TableInfo) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(info)
            .map_err(|e| EngineError::Corrupted(format!("table {name}: {e}")))?;
        self.txn.put(SYS_KS, &keys::table_meta_key(name), &bytes)?;
        Ok(())
    }

    pub fn create_table(&self, name: &str, info: TableInfo) -> Result<(), EngineError> {
        if !keys::valid_name(name) {
            return Err(EngineError::InvalidName(name.to_string()));
        }
        if self.txn.get(SYS_KS, &keys::table_meta_key(name))?.is_some() {
            return Err(EngineError::TableAlreadyExists(name.to_string()));
        }
        self.store_table_info(name, &info)?;
        tracing::debug!(table = name, "created table");
        Ok(())
    }

    pub fn table(&self, name: &str) -> Result<TableHandle, EngineError> {
        let info = self.load_table_info(name)?;
        let indexes = self.indexes_of(name)?;
        Ok(TableHandle {
            name: name.to_string(),
            info,
            indexes,
        })
    }

    pub fn list_tables(&self) -> Result<Vec<String>, EngineError> {
        let prefix = keys::table_meta_prefix();
        let mut names = Vec::new();
        for entry in self.txn.scan_prefix(SYS_KS, &prefix)? {
            let (k, _) = entry?;
            let name = std::str::from_utf8(&k[prefix.len()..])
                .map_err(|_| EngineError::Corrupted("table name is not utf-8".into()))?;
            names.push(name.to_string());
        }
        Ok(names)
    }

    pub fn drop_table(&self, name: &str) -> Result<TableInfo, EngineError> {
        let info = self.load_table_info(name)?;
        for index in self.indexes_of(name)? {
            self.delete_prefix(DATA_KS, &keys::index_prefix(&index.name))?;
            self.txn.delete(SYS_KS, &keys::index_meta_key(&index.name))?;
        }
        self.delete_prefix(DATA_KS, &keys::record_prefix(name))?;
        self.txn.delete(SYS_KS, &keys::table_meta_key(name))?;
        tracing::debug!(table = name, "dropped table");
        Ok(info)
    }

    pub fn rename_table(&self, old: &str, new: &str) -> Result<(), EngineError> {
        if !keys::valid_name(new) {
            return Err(EngineError::InvalidName(new.to_string()));
        }
        let info = self.load_table_info(old)?;
        if self.txn.get(SYS_KS, &keys::table_meta_key(new))?.is_some() {
            return Err(EngineError::TableAlreadyExists(new.to_string()));
        }

        let old_prefix = keys::record_prefix(old);
        let records: Vec<(Vec<u8>, Vec<u8>)> = self
            .txn
            .scan_prefix(DATA_KS, &old_prefix)?
            .collect::<Result<_, _>>()?;
        for (k, v) in records {
            let pk = &k[old_prefix.len()..];
            self.txn.put(DATA_KS, &keys::record_key(new, pk), &v)?;
            self.txn.delete(DATA_KS, &k)?;
        }

        for mut index in self.indexes_of(old)? {
            index.table = new.to_string();
            self.store_index_info(&index)?;
        }

        self.store_table_info(new, &info)?;
        self.txn.delete(SYS_KS, &keys::table_meta_key(old))?;
        tracing::debug!(from = old, to = new, "renamed table");
        Ok(())
    }

    fn store_index_info(&self, info: &IndexInfo) -> Result<(), EngineError> {
        let bytes = serde_json::to_vec(info)
            .map_err(|e| EngineError::Corrupted(format!("index {}: {e}", info.name)))?;
        self.txn
            .put(SYS_KS, &keys::index_meta_key(&info.name), &bytes)?;
        Ok(())
    }

    pub fn index(&self, name: &str) -> Result<IndexInfo, EngineError> {
        let bytes = self
            .txn
            .get(SYS_KS, &keys::index_meta_key(name))?
            .ok_or_else(|| EngineError::IndexNotFound(name.to_string()))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::Corrupted(format!("index {name}: {e}")))
    }

    pub fn indexes_of(&self, table: &str) -> Result<Vec<IndexInfo>, EngineError> {
        let mut out = Vec::new();
        for entry in self.txn.scan_prefix(SYS_KS, &keys::index_meta_prefix())? {
            let (_, v) = entry?;
            let info: IndexInfo = serde_json::from_slice(&v)
                .map_err(|e| EngineError::Corrupted(format!("index meta: {e}")))?;
            if info.table == table {
                out.push(info);
            }
        }
        Ok(out)
    }

    pub fn create_index(&self, info: IndexInfo) -> Result<(), EngineError> {
        if !keys::valid_name(&info.name) {
            return Err(EngineError::InvalidName(info.name.clone()));
        }
        self.load_table_info(&info.table)?;
        if self
            .txn
            .get(SYS_KS, &keys::index_meta_key(&info.name))?
            .is_some()
        {
            return Err(EngineError::IndexAlreadyExists(info.name.clone()));
        }
        self.store_index_info(&info)?;
        self.backfill_index(&info)?;
        tracing::debug!(index = info.name.as_str(), table = info.table.as_str(), "created index");
        Ok(())
    }

    pub fn drop_index(&self, name: &str) -> Result<(), EngineError> {
        self.index(name)?;
        self.delete_prefix(DATA_KS, &keys::index_prefix(name))?;
        self.txn.delete(SYS_KS, &keys::index_meta_key(name))?;
        tracing::debug!(index = name, "dropped index");
        Ok(())
    }

    /// Rebuild one index, one table's indexes, or everything.
    pub fn reindex(&self, target: Option<&str>) -> Result<(), EngineError> {
        match target {
            None => {
                for table in self.list_tables()? {
                    self.reindex_table(&table)?;
                }
                Ok(())
            }
            Some(name) => {
                if self.txn.get(SYS_KS, &keys::table_meta_key(name))?.is_some() {
                    return self.reindex_table(name);
                }
                let info = self.index(name)?;
                self.rebuild_index(&info)
            }
        }
    }

    fn reindex_table(&self, table: &str) -> Result<(), EngineError> {
        for index in self.indexes_of(table)? {
            self.rebuild_index(&index)?;
        }
        Ok(())
    }

    fn rebuild_index(&self, info: &IndexInfo) -> Result<(), EngineError> {
        self.delete_prefix(DATA_KS, &keys::index_prefix(&info.name))?;
        self.backfill_index(info)
    }

    fn backfill_index(&self, info: &IndexInfo) -> Result<(), EngineError> {
        let prefix = keys::record_prefix(&info.table);
        let records: Vec<(Vec<u8>, Vec<u8>)> = self
            .txn
            .scan_prefix(DATA_KS, &prefix)?
            .collect::<Result<_, _>>()?;
        for (k, v) in records {
            let pk = &k[prefix.len()..];
            let root = Value::Document(Document::Encoded(EncodedDocument::new(v)));
            self.add_index_entries(info, &root, pk)?;
        }
        Ok(())
    }

    fn delete_prefix(&self, ks: &str, prefix: &[u8]) -> Result<(), EngineError> {
        let keys: Vec<Vec<u8>> = self
            .txn
            .scan_prefix(ks, prefix)?
            .map(|r| r.map(|(k, _)| k))
            .collect::<Result<_, _>>()?;
        for k in keys {
            self.txn.delete(ks, &k)?;
        }
        Ok(())
    }

    // ── Records ─────────────────────────────────────────────────

    /// Walk all records of a table in primary-key order.
    pub fn scan(&self, handle: &TableHandle) -> Result<RecordIter<'_>, EngineError> {
        let prefix = keys::record_prefix(&handle.name);
        let plen = prefix.len();
        let iter = self.txn.scan_prefix(DATA_KS, &prefix)?;
        Ok(Box::new(iter.map(move |r| {
            let (k, v) = r?;
            Ok((k[plen..].to_vec(), EncodedDocument::new(v)))
        })))
    }

    pub fn get_record(
        &self,
        handle: &TableHandle,
        pk: &[u8],
    ) -> Result<Option<EncodedDocument>, EngineError> {
        let bytes = self.txn.get(DATA_KS, &keys::record_key(&handle.name, pk))?;
        Ok(bytes.map(EncodedDocument::new))
    }

    /// Insert a document, applying sequences, defaults and constraints.
    /// Returns the primary key bytes and the document as stored.
    pub fn insert(
        &self,
        handle: &TableHandle,
        mut fb: FieldBuffer,
    ) -> Result<(Vec<u8>, FieldBuffer), EngineError> {
        let mut info = self.load_table_info(&handle.name)?;
        let mut dirty_meta = false;

        // Fill AUTOINCREMENT paths, and observe explicit values so the next
        // issued integer stays strictly greater than anything seen.
        for i in 0..info.sequences.len() {
            let path = info.sequences[i].path.clone();
            match validate::path_value(&fb, &path)? {
                Some(v) if !v.is_null() => {
                    if let Ok(Value::Integer(n)) =
                        v.cast_as(basalt_document::ValueType::Integer)
                    {
                        let seq = &mut info.sequences[i];
                        if seq.last.is_none_or(|last| n > last) {
                            seq.last = Some(n);
                            dirty_meta = true;
                        }
                    }
                }
                _ => {
                    let next = info.sequences[i].next_value();
                    fb.set_path(path.fragments(), Value::Integer(next))?;
                    info.sequences[i].last = Some(next);
                    dirty_meta = true;
                }
            }
        }

        validate::apply_constraints(&info, &mut fb)?;

        let pk_values = match info.primary_key() {
            Some(fc) => {
                let v = validate::path_value(&fb, &fc.path)?
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| EngineError::NotNullViolation(fc.path.to_string()))?;
                vec![v]
            }
            None => {
                let rowid = info.next_rowid.max(1);
                info.next_rowid = rowid + 1;
                dirty_meta = true;
                vec![Value::Integer(rowid)]
            }
        };
        let pk_bytes = key::encode_key_values(&pk_values)?;

        let rkey = keys::record_key(&handle.name, &pk_bytes);
        if self.txn.get(DATA_KS, &rkey)?.is_some() {
            return Err(EngineError::DuplicateKey(display_values(&pk_values)));
        }

        let root = Value::Document(Document::Buf(fb.clone()));
        self.check_unique_indexes(handle, &root, &pk_bytes)?;

        let encoded = encode(&Document::Buf(fb.clone()))?;
        self.txn.put(DATA_KS, &rkey, &encoded)?;
        for index in &handle.indexes {
            self.add_index_entries(index, &root, &pk_bytes)?;
        }

        if dirty_meta {
            self.store_table_info(&handle.name, &info)?;
        }
        Ok((pk_bytes, fb))
    }

    /// Replace the record stored at `old_pk`. The new document may move to a
    /// different primary key.
    pub fn replace(
        &self,
        handle: &TableHandle,
        old_pk: &[u8],
        mut fb: FieldBuffer,
    ) -> Result<FieldBuffer, EngineError> {
        let info = self.load_table_info(&handle.name)?;
        let old_rkey = keys::record_key(&handle.name, old_pk);
        let old_bytes = self
            .txn
            .get(DATA_KS, &old_rkey)?
            .ok_or(EngineError::KeyNotFound)?;

        validate::apply_constraints(&info, &mut fb)?;

        let new_pk = match info.primary_key() {
            Some(fc) => {
                let v = validate::path_value(&fb, &fc.path)?
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| EngineError::NotNullViolation(fc.path.to_string()))?;
                key::encode_key_values(std::slice::from_ref(&v))?
            }
            None => old_pk.to_vec(),
        };

        let old_root = Value::Document(Document::Encoded(EncodedDocument::new(old_bytes)));
        for index in &handle.indexes {
            self.remove_index_entries(index, &old_root, old_pk)?;
        }

        if new_pk != old_pk {
            let new_rkey = keys::record_key(&handle.name, &new_pk);
            if self.txn.get(DATA_KS, &new_rkey)?.is_some() {
                return Err(EngineError::DuplicateKey(format!("{new_pk:02x?}")));
            }
            self.txn.delete(DATA_KS, &old_rkey)?;
        }

        let root = Value::Document(Document::Buf(fb.clone()));
        self.check_unique_indexes(handle, &root, &new_pk)?;

        let encoded = encode(&Document::Buf(fb.clone()))?;
        self.txn
            .put(DATA_KS, &keys::record_key(&handle.name, &new_pk), &encoded)?;
        for index in &handle.indexes {
            self.add_index_entries(index, &root, &new_pk)?;
        }
        Ok(fb)
    }

    pub fn delete(&self, handle: &TableHandle, pk: &[u8]) -> Result<(), EngineError> {
        let rkey = keys::record_key(&handle.name, pk);
        let old_bytes = self
            .txn
            .get(DATA_KS, &rkey)?
            .ok_or(EngineError::KeyNotFound)?;
        let root = Value::Document(Document::Encoded(EncodedDocument::new(old_bytes)));
        for index in &handle.indexes {
            self.remove_index_entries(index, &root, pk)?;
        }
        self.txn.delete(DATA_KS, &rkey)?;
        Ok(())
    }

    // ── Index maintenance ───────────────────────────────────────

    /// The composite value key for a document, or None when any indexed path
    /// is missing or null (such rows are not indexed).
    fn index_value_key(
        &self,
        index: &IndexInfo,
        root: &Value,
    ) -> Result<Option<Vec<u8>>, EngineError> {
        let mut values = Vec::with_capacity(index.paths.len());
        for path in &index.paths {
            match path.get_value(root)? {
                Some(v) if !v.is_null() => values.push(v),
                _ => return Ok(None),
            }
        }
        Ok(Some(key::encode_key_values(&values)?))
    }

    fn check_unique_indexes(
        &self,
        handle: &TableHandle,
        root: &Value,
        pk: &[u8],
    ) -> Result<(), EngineError> {
        for index in handle.indexes.iter().filter(|i| i.unique) {
            if let Some(value_key) = self.index_value_key(index, root)? {
                let entry = keys::index_entry_key(&index.name, &value_key, None);
                if let Some(existing) = self.txn.get(DATA_KS, &entry)?
                    && existing != pk
                {
                    return Err(EngineError::UniqueViolation(index.name.clone()));
                }
            }
        }
        Ok(())
    }

    fn add_index_entries(
        &self,
        index: &IndexInfo,
        root: &Value,
        pk: &[u8],
    ) -> Result<(), EngineError> {
        let Some(value_key) = self.index_value_key(index, root)? else {
            return Ok(());
        };
        if index.unique {
            let entry = keys::index_entry_key(&index.name, &value_key, None);
            if let Some(existing) = self.txn.get(DATA_KS, &entry)?
                && existing != pk
            {
                return Err(EngineError::UniqueViolation(index.name.clone()));
            }
            self.txn.put(DATA_KS, &entry, pk)?;
        } else {
            let entry = keys::index_entry_key(&index.name, &value_key, Some(pk));
            self.txn.put(DATA_KS, &entry, pk)?;
        }
        Ok(())
    }

    fn remove_index_entries(
        &self,
        index: &IndexInfo,
        root: &Value,
        pk: &[u8],
    ) -> Result<(), EngineError> {
        let Some(value_key) = self.index_value_key(index, root)? else {
            return Ok(());
        };
        let entry = if index.unique {
            keys::index_entry_key(&index.name, &value_key, None)
        } else {
            keys::index_entry_key(&index.name, &value_key, Some(pk))
        };
        self.txn.delete(DATA_KS, &entry)?;
        Ok(())
    }

    // ── Index scans ─────────────────────────────────────────────

    /// Ascending (or descending) walk over an index, optionally starting at
    /// a pivot value. Ascending includes entries `>=` pivot; descending
    /// includes entries `<=` pivot. Strict operators drop `is_equal` hits.
    pub fn scan_index(
        &self,
        index: &IndexInfo,
        pivot: Option<&[Value]>,
        reverse: bool,
    ) -> Result<IndexIter<'_>, EngineError> {
        let prefix = keys::index_prefix(&index.name);
        let pivot_key = match pivot {
            Some(values) => Some(key::encode_key_values(values)?),
            None => None,
        };
        let iter = match (&pivot_key, reverse) {
            (Some(pk), false) => {
                let mut start = prefix.clone();
                start.extend_from_slice(pk);
                self.txn.scan_from(DATA_KS, &start, false)?
            }
            (Some(pk), true) => {
                // Equal-value entries carry a pk suffix that sorts above the
                // bare pivot key; a 0xFF sentinel keeps them inside the
                // bound (no key-encoding tag reaches 0xFF).
                let mut start = prefix.clone();
                start.extend_from_slice(pk);
                start.push(0xFF);
                self.txn.scan_from(DATA_KS, &start, true)?
            }
            (None, false) => self.txn.scan_prefix(DATA_KS, &prefix)?,
            (None, true) => self.txn.scan_prefix_rev(DATA_KS, &prefix)?,
        };
        Ok(self.index_entries(index, prefix, pivot_key, iter))
    }

    /// All entries whose value equals `values` exactly.
    pub fn scan_index_eq(
        &self,
        index: &IndexInfo,
        values: &[Value],
    ) -> Result<IndexIter<'_>, EngineError> {
        let prefix = keys::index_prefix(&index.name);
        let pivot_key = key::encode_key_values(values)?;
        let mut full = prefix.clone();
        full.extend_from_slice(&pivot_key);
        let iter = self.txn.scan_prefix(DATA_KS, &full)?;
        Ok(self.index_entries(index, prefix, Some(pivot_key), iter))
    }

    fn index_entries<'t>(
        &self,
        index: &IndexInfo,
        prefix: Vec<u8>,
        pivot_key: Option<Vec<u8>>,
        iter: basalt_store::ScanIter<'t>,
    ) -> IndexIter<'t> {
        let unique = index.unique;
        let plen = prefix.len();
        Box::new(
            iter.take_while(move |r| match r {
                Ok((k, _)) => k.starts_with(&prefix),
                Err(_) => true,
            })
            .map(move |r| {
                let (k, pk) = r?;
                let value_end = if unique { k.len() } else { k.len() - pk.len() };
                let value_key = k[plen..value_end].to_vec();
                let is_equal = pivot_key
                    .as_deref()
                    .is_some_and(|p| p == value_key.as_slice());
                Ok(IndexEntry {
                    value_key,
                    pk,
                    is_equal,
                })
            }),
        )
    }
}

fn display_values(values: &[Value]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
