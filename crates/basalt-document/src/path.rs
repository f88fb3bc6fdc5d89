use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DocumentError;
use crate::value::Value;

/// One step of a path: a document field or an array index.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Fragment {
    Field(String),
    Index(usize),
}

/// Address of a sub-value within a document. The first fragment of a
/// user-visible path is always a field name. Ordering is lexicographic over
/// fragments.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Path(Vec<Fragment>);

impl Path {
    pub fn new(fragments: Vec<Fragment>) -> Self {
        Path(fragments)
    }

    /// A single-fragment path addressing a top-level field.
    pub fn field(name: impl Into<String>) -> Self {
        Path(vec![Fragment::Field(name.into())])
    }

    pub fn push(&mut self, fragment: Fragment) {
        self.0.push(fragment);
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The field name when this path is a plain top-level field reference.
    pub fn as_field(&self) -> Option<&str> {
        match self.0.as_slice() {
            [Fragment::Field(name)] => Some(name),
            _ => None,
        }
    }

    /// Resolve the path against a value. Missing fields and out-of-range
    /// indexes resolve to `None`; indexing into the wrong shape does too.
    pub fn get_value(&self, root: &Value) -> Result<Option<Value>, DocumentError> {
        let mut current = root.clone();
        for fragment in &self.0 {
            current = match (fragment, current) {
                (Fragment::Field(name), Value::Document(doc)) => match doc.get(name)? {
                    Some(v) => v,
                    None => return Ok(None),
                },
                (Fragment::Index(i), Value::Array(items)) => match items.get(*i) {
                    Some(v) => v.clone(),
                    None => return Ok(None),
                },
                _ => return Ok(None),
            };
        }
        Ok(Some(current))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, fragment) in self.0.iter().enumerate() {
            match fragment {
                Fragment::Field(name) => {
                    if i > 0 {
                        write!(f, ".")?;
                    }
                    write!(f, "{name}")?;
                }
                Fragment::Index(n) => write!(f, "[{n}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = DocumentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fragments = Vec::new();
        let mut chars = s.chars().peekable();
        let mut buf = String::new();
        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if !buf.is_empty() {
                        fragments.push(Fragment::Field(std::mem::take(&mut buf)));
                    }
                }
                '[' => {
                    if !buf.is_empty() {
                        fragments.push(Fragment::Field(std::mem::take(&mut buf)));
                    }
                    let mut digits = String::new();
                    for d in chars.by_ref() {
                        if d == ']' {
                            break;
                        }
                        digits.push(d);
                    }
                    let index = digits
                        .parse::<usize>()
                        .map_err(|_| DocumentError::InvalidPath(s.to_string()))?;
                    fragments.push(Fragment::Index(index));
                }
                _ => buf.push(c),
            }
        }
        if !buf.is_empty() {
            fragments.push(Fragment::Field(buf));
        }
        if fragments.is_empty() {
            return Err(DocumentError::InvalidPath(s.to_string()));
        }
        if !matches!(fragments[0], Fragment::Field(_)) {
            return Err(DocumentError::InvalidPath(s.to_string()));
        }
        Ok(Path(fragments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Document, FieldBuffer};

    #[test]
    fn display_roundtrip() {
        let path: Path = "a.b[2].c".parse().unwrap();
        assert_eq!(path.to_string(), "a.b[2].c");
        assert_eq!(
            path.fragments(),
            &[
                Fragment::Field("a".into()),
                Fragment::Field("b".into()),
                Fragment::Index(2),
                Fragment::Field("c".into()),
            ]
        );
    }

    #[test]
    fn leading_index_rejected() {
        assert!("[0].a".parse::<Path>().is_err());
    }

    #[test]
    fn ordering_is_lexicographic() {
        let a: Path = "a.b".parse().unwrap();
        let b: Path = "a.c".parse().unwrap();
        let c: Path = "a.b.c".parse().unwrap();
        assert!(a < b);
        assert!(a < c);
        assert!(c < b);
    }

    #[test]
    fn get_value_walks_nested_shapes() {
        let mut inner = FieldBuffer::new();
        inner.add("city", Value::Text("Lyon".into()));
        let mut fb = FieldBuffer::new();
        fb.add("address", Value::Document(Document::Buf(inner)));
        fb.add("tags", Value::Array(vec![Value::Integer(7), Value::Integer(8)]));
        let root = Value::Document(Document::Buf(fb));

        let path: Path = "address.city".parse().unwrap();
        assert_eq!(
            path.get_value(&root).unwrap(),
            Some(Value::Text("Lyon".into()))
        );

        let path: Path = "tags[1]".parse().unwrap();
        assert_eq!(path.get_value(&root).unwrap(), Some(Value::Integer(8)));

        let path: Path = "tags[9]".parse().unwrap();
        assert_eq!(path.get_value(&root).unwrap(), None);

        let path: Path = "missing".parse().unwrap();
        assert_eq!(path.get_value(&root).unwrap(), None);
    }
}
