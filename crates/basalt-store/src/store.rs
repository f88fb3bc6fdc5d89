use crate::error::StoreError;

pub type ScanIter<'a> = Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>), StoreError>> + 'a>;

pub trait Store {
    type Txn<'a>: Transaction
    where
        Self: 'a;

    fn begin(&self, read_only: bool) -> Result<Self::Txn<'_>, StoreError>;

    /// Create a named keyspace if it does not exist yet.
    fn create_keyspace(&self, name: &str) -> Result<(), StoreError>;
}

/// A transaction over a set of named keyspaces.
///
/// Writes go through `&self`: implementations keep their working state
/// behind interior mutability so one transaction can be shared across all
/// the nodes of a query pipeline.
pub trait Transaction {
    // Reads
    fn get(&self, ks: &str, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;

    /// All entries whose key starts with `prefix`, in ascending key order.
    fn scan_prefix(&self, ks: &str, prefix: &[u8]) -> Result<ScanIter<'_>, StoreError>;

    /// All entries whose key starts with `prefix`, in descending key order.
    fn scan_prefix_rev(&self, ks: &str, prefix: &[u8]) -> Result<ScanIter<'_>, StoreError>;

    /// Entries with key `>= start` ascending, or `<= start` descending.
    /// The caller bounds the walk (e.g. with a prefix check).
    fn scan_from(&self, ks: &str, start: &[u8], reverse: bool) -> Result<ScanIter<'_>, StoreError>;

    // Writes
    fn put(&self, ks: &str, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    fn delete(&self, ks: &str, key: &[u8]) -> Result<(), StoreError>;

    // Lifecycle
    fn commit(self) -> Result<(), StoreError>;
    fn rollback(self) -> Result<(), StoreError>;
}
