mod error;
mod memory;
mod store;

pub use error::StoreError;
pub use memory::{MemoryStore, MemoryTransaction};
pub use store::{ScanIter, Store, Transaction};
