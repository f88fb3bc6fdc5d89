//! Storage key layouts.
//!
//! The system keyspace holds catalog metadata, the data keyspace holds
//! records and index entries. Names are embedded in the keys:
//!
//! - table meta:  `t\x00{table}`            (sys)
//! - index meta:  `x\x00{index}`            (sys)
//! - record:      `r\x00{table}\x00{pk}`    (data)
//! - index entry: `i\x00{index}\x00{value_key}{pk}` (data)
//!
//! `pk` and `value_key` use the sortable key encoding, so scans walk records
//! in primary-key order and index entries in value order. Index entries
//! store the bare `pk` bytes as the KV value; unique indexes omit the `pk`
//! suffix from the key so a value can appear at most once.

pub const SYS_KS: &str = "_sys_";
pub const DATA_KS: &str = "data";

const TABLE_TAG: u8 = b't';
const INDEX_CONFIG_TAG: u8 = b'x';
const RECORD_TAG: u8 = b'r';
const INDEX_TAG: u8 = b'i';
const SEP: u8 = 0x00;

fn tagged(tag: u8, name: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(2 + name.len());
    buf.push(tag);
    buf.push(SEP);
    buf.extend_from_slice(name.as_bytes());
    buf
}

pub(crate) fn table_meta_key(table: &str) -> Vec<u8> {
    tagged(TABLE_TAG, table)
}

pub(crate) fn table_meta_prefix() -> Vec<u8> {
    vec![TABLE_TAG, SEP]
}

pub(crate) fn index_meta_key(index: &str) -> Vec<u8> {
    tagged(INDEX_CONFIG_TAG, index)
}

pub(crate) fn index_meta_prefix() -> Vec<u8> {
    vec![INDEX_CONFIG_TAG, SEP]
}

pub(crate) fn record_prefix(table: &str) -> Vec<u8> {
    let mut buf = tagged(RECORD_TAG, table);
    buf.push(SEP);
    buf
}

pub(crate) fn record_key(table: &str, pk: &[u8]) -> Vec<u8> {
    let mut buf = record_prefix(table);
    buf.extend_from_slice(pk);
    buf
}

pub(crate) fn index_prefix(index: &str) -> Vec<u8> {
    let mut buf = tagged(INDEX_TAG, index);
    buf.push(SEP);
    buf
}

pub(crate) fn index_entry_key(index: &str, value_key: &[u8], pk: Option<&[u8]>) -> Vec<u8> {
    let mut buf = index_prefix(index);
    buf.extend_from_slice(value_key);
    if let Some(pk) = pk {
        buf.extend_from_slice(pk);
    }
    buf
}

/// Names are embedded in keys with a NUL separator, so they must not
/// contain one.
pub(crate) fn valid_name(name: &str) -> bool {
    !name.is_empty() && !name.bytes().any(|b| b == SEP)
}
