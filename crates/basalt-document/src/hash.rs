//! Content-addressed collections keyed by encoded value bytes.
//!
//! Keys are the full sortable encoding of the value, not a digest, so two
//! values collide only when they are equal under [`Value::cmp_values`].
//! DISTINCT and hash aggregation rely on that: a false negative is not
//! acceptable there.

use std::collections::{HashMap, HashSet};

use crate::error::DocumentError;
use crate::key::encode_key_values;
use crate::value::Value;

/// Dedup set over value tuples.
#[derive(Debug, Default)]
pub struct ValueSet {
    seen: HashSet<Vec<u8>>,
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true when the tuple was not seen before.
    pub fn insert(&mut self, values: &[Value]) -> Result<bool, DocumentError> {
        Ok(self.seen.insert(encode_key_values(values)?))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Map from a value key to grouped state, preserving first-seen order.
#[derive(Debug)]
pub struct ValueMap<T> {
    index: HashMap<Vec<u8>, usize>,
    entries: Vec<(Value, T)>,
}

impl<T> Default for ValueMap<T> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            entries: Vec::new(),
        }
    }
}

impl<T> ValueMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_insert_with(
        &mut self,
        key: &Value,
        init: impl FnOnce() -> T,
    ) -> Result<&mut T, DocumentError> {
        let encoded = encode_key_values(std::slice::from_ref(key))?;
        let i = match self.index.get(&encoded) {
            Some(&i) => i,
            None => {
                self.entries.push((key.clone(), init()));
                let i = self.entries.len() - 1;
                self.index.insert(encoded, i);
                i
            }
        };
        Ok(&mut self.entries[i].1)
    }

    pub fn get_mut(&mut self, key: &Value) -> Result<Option<&mut T>, DocumentError> {
        let encoded = encode_key_values(std::slice::from_ref(key))?;
        Ok(self
            .index
            .get(&encoded)
            .map(|&i| &mut self.entries[i].1))
    }

    /// Insert or overwrite, keeping the key's first-seen position.
    pub fn insert(&mut self, key: &Value, value: T) -> Result<(), DocumentError> {
        let encoded = encode_key_values(std::slice::from_ref(key))?;
        match self.index.get(&encoded) {
            Some(&i) => self.entries[i].1 = value,
            None => {
                self.entries.push((key.clone(), value));
                self.index.insert(encoded, self.entries.len() - 1);
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Consume in first-seen order.
    pub fn into_entries(self) -> impl Iterator<Item = (Value, T)> {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_dedups_by_value_equality() {
        let mut set = ValueSet::new();
        assert!(set.insert(&[Value::Integer(1)]).unwrap());
        assert!(!set.insert(&[Value::Double(1.0)]).unwrap());
        assert!(set.insert(&[Value::Text("1".into())]).unwrap());
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn map_preserves_first_seen_order() {
        let mut map: ValueMap<i64> = ValueMap::new();
        *map.get_or_insert_with(&Value::Text("b".into()), || 0).unwrap() += 1;
        *map.get_or_insert_with(&Value::Text("a".into()), || 0).unwrap() += 1;
        *map.get_or_insert_with(&Value::Text("b".into()), || 0).unwrap() += 1;

        let entries: Vec<(Value, i64)> = map.into_entries().collect();
        assert_eq!(
            entries,
            vec![
                (Value::Text("b".into()), 2),
                (Value::Text("a".into()), 1),
            ]
        );
    }
}
