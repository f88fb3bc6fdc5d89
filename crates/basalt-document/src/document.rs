use crate::encoding::EncodedDocument;
use crate::error::DocumentError;
use crate::path::Fragment;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

/// Mutable owned document: an ordered list of named fields.
///
/// `get` returns the first field with a given name; `delete` removes the
/// first match and preserves the relative order of the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldBuffer {
    fields: Vec<Field>,
}

impl FieldBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field, keeping any existing field with the same name.
    pub fn add(&mut self, name: impl Into<String>, value: Value) {
        self.fields.push(Field {
            name: name.into(),
            value,
        });
    }

    /// Replace the first field named `name`, or append it.
    pub fn set(&mut self, name: &str, value: Value) {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => field.value = value,
            None => self.add(name, value),
        }
    }

    /// Replace the first field named `name` in place. Returns false when the
    /// field does not exist.
    pub fn replace(&mut self, name: &str, value: Value) -> bool {
        match self.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => {
                field.value = value;
                true
            }
            None => false,
        }
    }

    /// Remove the first field named `name`.
    pub fn delete(&mut self, name: &str) -> bool {
        match self.fields.iter().position(|f| f.name == name) {
            Some(i) => {
                self.fields.remove(i);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Append every field of `doc`.
    pub fn copy_from(&mut self, doc: &Document) -> Result<(), DocumentError> {
        doc.iterate(|name, value| {
            self.add(name, value);
            Ok(())
        })
    }

    /// Set the value at a (possibly nested) path, creating intermediate
    /// documents along field fragments.
    pub fn set_path(&mut self, fragments: &[Fragment], value: Value) -> Result<(), DocumentError> {
        let Some((head, rest)) = fragments.split_first() else {
            return Err(DocumentError::InvalidPath("empty path".into()));
        };
        let Fragment::Field(name) = head else {
            return Err(DocumentError::InvalidPath(
                "path must start with a field name".into(),
            ));
        };
        if rest.is_empty() {
            self.set(name, value);
            return Ok(());
        }
        let mut current = match self.get(name) {
            Some(v) => v.clone(),
            None => Value::Document(Document::Buf(FieldBuffer::new())),
        };
        set_in_value(&mut current, rest, value)?;
        self.set(name, current);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Rename the field at position `i`, if it exists.
    pub fn rename_at(&mut self, i: usize, name: impl Into<String>) -> bool {
        match self.fields.get_mut(i) {
            Some(field) => {
                field.name = name.into();
                true
            }
            None => false,
        }
    }
}

impl FromIterator<(String, Value)> for FieldBuffer {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut fb = FieldBuffer::new();
        for (name, value) in iter {
            fb.add(name, value);
        }
        fb
    }
}

fn set_in_value(
    target: &mut Value,
    fragments: &[Fragment],
    value: Value,
) -> Result<(), DocumentError> {
    let Some((head, rest)) = fragments.split_first() else {
        *target = value;
        return Ok(());
    };
    match head {
        Fragment::Field(name) => {
            let mut buf = match target {
                Value::Document(d) => d.to_field_buffer()?,
                _ => FieldBuffer::new(),
            };
            let mut inner = match buf.get(name) {
                Some(v) => v.clone(),
                None => Value::Document(Document::Buf(FieldBuffer::new())),
            };
            if rest.is_empty() {
                buf.set(name, value);
            } else {
                set_in_value(&mut inner, rest, value)?;
                buf.set(name, inner);
            }
            *target = Value::Document(Document::Buf(buf));
            Ok(())
        }
        Fragment::Index(i) => {
            let Value::Array(items) = target else {
                return Err(DocumentError::InvalidPath(format!(
                    "cannot index into a {}",
                    target.type_of()
                )));
            };
            let Some(slot) = items.get_mut(*i) else {
                return Err(DocumentError::InvalidPath(format!(
                    "array index {i} out of range"
                )));
            };
            set_in_value(slot, rest, value)
        }
    }
}

/// A document view: either an owned field buffer or a lazily decoded
/// encoded record.
#[derive(Debug, Clone)]
pub enum Document {
    Buf(FieldBuffer),
    Encoded(EncodedDocument),
}

impl Document {
    pub fn get(&self, name: &str) -> Result<Option<Value>, DocumentError> {
        match self {
            Document::Buf(fb) => Ok(fb.get(name).cloned()),
            Document::Encoded(enc) => enc.get(name),
        }
    }

    /// Visit every field in order: insertion order for buffers, header order
    /// for encoded records.
    pub fn iterate(
        &self,
        mut f: impl FnMut(&str, Value) -> Result<(), DocumentError>,
    ) -> Result<(), DocumentError> {
        match self {
            Document::Buf(fb) => {
                for field in fb.iter() {
                    f(&field.name, field.value.clone())?;
                }
                Ok(())
            }
            Document::Encoded(enc) => enc.iterate(&mut f),
        }
    }

    pub fn to_field_buffer(&self) -> Result<FieldBuffer, DocumentError> {
        match self {
            Document::Buf(fb) => Ok(fb.clone()),
            Document::Encoded(enc) => {
                let mut fb = FieldBuffer::new();
                enc.iterate(&mut |name, value| {
                    fb.add(name, value);
                    Ok(())
                })?;
                Ok(fb)
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Document::Buf(fb) => fb.is_empty(),
            Document::Encoded(enc) => enc.field_count().map(|n| n == 0).unwrap_or(true),
        }
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        match (self.to_field_buffer(), other.to_field_buffer()) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }
}

impl From<FieldBuffer> for Document {
    fn from(fb: FieldBuffer) -> Self {
        Document::Buf(fb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::Path;

    #[test]
    fn get_returns_first_match() {
        let mut fb = FieldBuffer::new();
        fb.add("a", Value::Integer(1));
        fb.add("a", Value::Integer(2));
        assert_eq!(fb.get("a"), Some(&Value::Integer(1)));
    }

    #[test]
    fn set_replaces_or_appends() {
        let mut fb = FieldBuffer::new();
        fb.set("a", Value::Integer(1));
        fb.set("b", Value::Integer(2));
        fb.set("a", Value::Integer(3));
        assert_eq!(fb.len(), 2);
        assert_eq!(fb.get("a"), Some(&Value::Integer(3)));
    }

    #[test]
    fn delete_preserves_order() {
        let mut fb = FieldBuffer::new();
        fb.add("a", Value::Integer(1));
        fb.add("b", Value::Integer(2));
        fb.add("c", Value::Integer(3));
        assert!(fb.delete("b"));
        let names: Vec<&str> = fb.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
        assert!(!fb.delete("b"));
    }

    #[test]
    fn set_path_creates_nested_documents() {
        let mut fb = FieldBuffer::new();
        let path: Path = "address.city".parse().unwrap();
        fb.set_path(path.fragments(), Value::Text("Lyon".into())).unwrap();

        let Some(Value::Document(addr)) = fb.get("address").cloned() else {
            panic!("expected nested document");
        };
        assert_eq!(addr.get("city").unwrap(), Some(Value::Text("Lyon".into())));
    }

    #[test]
    fn set_path_array_index_out_of_range() {
        let mut fb = FieldBuffer::new();
        fb.add("tags", Value::Array(vec![Value::Integer(1)]));
        let path: Path = "tags[4]".parse().unwrap();
        assert!(fb.set_path(path.fragments(), Value::Integer(9)).is_err());
    }
}
