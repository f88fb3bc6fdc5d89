//! On-disk record codec.
//!
//! Layout, with `uvarint` the LEB128 unsigned varint:
//!
//! ```text
//! header_size:uvarint
//! header:
//!   fields_count:uvarint
//!   repeat fields_count times:
//!     name_size:uvarint name:bytes type:uvarint size:uvarint offset:uvarint
//! body: field payloads concatenated in header order
//! ```
//!
//! Encoding never re-orders fields; decoding is lazy and looks fields up in
//! O(n) over the header without touching the body until a payload is needed.

use std::sync::Arc;

use crate::document::{Document, FieldBuffer};
use crate::error::DocumentError;
use crate::value::{Value, ValueType};

pub(crate) fn write_uvarint(buf: &mut Vec<u8>, mut v: u64) {
    loop {
        let b = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            buf.push(b);
            return;
        }
        buf.push(b | 0x80);
    }
}

pub(crate) fn read_uvarint(bytes: &[u8], pos: &mut usize) -> Result<u64, DocumentError> {
    let mut out = 0u64;
    let mut shift = 0u32;
    loop {
        let b = *bytes
            .get(*pos)
            .ok_or_else(|| DocumentError::Encoding("truncated varint".into()))?;
        *pos += 1;
        if shift > 63 {
            return Err(DocumentError::Encoding("varint overflows u64".into()));
        }
        out |= u64::from(b & 0x7f) << shift;
        if b & 0x80 == 0 {
            return Ok(out);
        }
        shift += 7;
    }
}

/// Encode a document into the record format.
pub fn encode(doc: &Document) -> Result<Vec<u8>, DocumentError> {
    // Already-encoded records are bit-exact as they stand.
    if let Document::Encoded(enc) = doc {
        return Ok(enc.as_bytes().to_vec());
    }
    encode_buffer(&doc.to_field_buffer()?)
}

fn encode_buffer(fb: &FieldBuffer) -> Result<Vec<u8>, DocumentError> {
    struct Descriptor<'a> {
        name: &'a str,
        ty: ValueType,
        size: usize,
        offset: usize,
    }

    let mut body = Vec::new();
    let mut descriptors = Vec::with_capacity(fb.len());
    for field in fb.iter() {
        if field.name.is_empty() {
            return Err(DocumentError::EmptyFieldName);
        }
        let offset = body.len();
        encode_payload(&field.value, &mut body)?;
        let size = body.len() - offset;
        if size as u64 > i64::MAX as u64 {
            return Err(DocumentError::PayloadTooLarge);
        }
        descriptors.push(Descriptor {
            name: &field.name,
            ty: field.value.type_of(),
            size,
            offset,
        });
    }

    let mut header = Vec::new();
    write_uvarint(&mut header, descriptors.len() as u64);
    for d in &descriptors {
        write_uvarint(&mut header, d.name.len() as u64);
        header.extend_from_slice(d.name.as_bytes());
        write_uvarint(&mut header, u64::from(d.ty.to_u8()));
        write_uvarint(&mut header, d.size as u64);
        write_uvarint(&mut header, d.offset as u64);
    }

    let mut out = Vec::with_capacity(header.len() + body.len() + 4);
    write_uvarint(&mut out, header.len() as u64);
    out.extend_from_slice(&header);
    out.extend_from_slice(&body);
    Ok(out)
}

fn encode_payload(value: &Value, body: &mut Vec<u8>) -> Result<(), DocumentError> {
    match value {
        Value::Null => {}
        Value::Bool(b) => body.push(*b as u8),
        Value::Integer(n) | Value::Duration(n) => body.extend_from_slice(&n.to_be_bytes()),
        Value::Double(d) => body.extend_from_slice(&d.to_bits().to_be_bytes()),
        Value::Text(s) => body.extend_from_slice(s.as_bytes()),
        Value::Blob(b) => body.extend_from_slice(b),
        Value::Array(items) => {
            write_uvarint(body, items.len() as u64);
            let mut payload = Vec::new();
            for item in items {
                payload.clear();
                encode_payload(item, &mut payload)?;
                write_uvarint(body, u64::from(item.type_of().to_u8()));
                write_uvarint(body, payload.len() as u64);
                body.extend_from_slice(&payload);
            }
        }
        Value::Document(doc) => {
            let bytes = encode(doc)?;
            body.extend_from_slice(&bytes);
        }
    }
    Ok(())
}

/// Find one field in an encoded record without materializing the rest.
pub fn decode_field(bytes: &[u8], name: &str) -> Result<Option<Value>, DocumentError> {
    EncodedDocument::new(bytes.to_vec()).get(name)
}

/// A lazily decoded record view over shared bytes.
///
/// Construction is O(1); nested documents borrow sub-ranges of the same
/// allocation, so walking into them never copies the body.
#[derive(Debug, Clone)]
pub struct EncodedDocument {
    bytes: Arc<[u8]>,
    start: usize,
    end: usize,
}

impl EncodedDocument {
    pub fn new(bytes: Vec<u8>) -> Self {
        let end = bytes.len();
        Self {
            bytes: Arc::from(bytes),
            start: 0,
            end,
        }
    }

    fn from_range(bytes: Arc<[u8]>, start: usize, end: usize) -> Self {
        Self { bytes, start, end }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[self.start..self.end]
    }

    pub fn get(&self, name: &str) -> Result<Option<Value>, DocumentError> {
        let mut found = None;
        self.walk_headers(|field_name, ty, payload_start, payload_end| {
            if field_name == name {
                found = Some((ty, payload_start, payload_end));
                return Ok(false);
            }
            Ok(true)
        })?;
        match found {
            Some((ty, start, end)) => Ok(Some(decode_value(&self.bytes, ty, start, end)?)),
            None => Ok(None),
        }
    }

    pub fn iterate(
        &self,
        f: &mut dyn FnMut(&str, Value) -> Result<(), DocumentError>,
    ) -> Result<(), DocumentError> {
        let mut pending = Ok(());
        self.walk_headers(|name, ty, payload_start, payload_end| {
            let value = decode_value(&self.bytes, ty, payload_start, payload_end)?;
            match f(name, value) {
                Ok(()) => Ok(true),
                Err(e) => {
                    pending = Err(e);
                    Ok(false)
                }
            }
        })?;
        pending
    }

    pub fn field_count(&self) -> Result<u64, DocumentError> {
        let b = self.as_bytes();
        let mut pos = 0;
        let _header_size = read_uvarint(b, &mut pos)?;
        read_uvarint(b, &mut pos)
    }

    /// Walk the header, handing each descriptor to `f` with absolute payload
    /// positions into the shared buffer. `f` returns false to stop early.
    fn walk_headers(
        &self,
        mut f: impl FnMut(&str, ValueType, usize, usize) -> Result<bool, DocumentError>,
    ) -> Result<(), DocumentError> {
        let b = self.as_bytes();
        let mut pos = 0;
        let header_size = read_uvarint(b, &mut pos)? as usize;
        let body_start = pos
            .checked_add(header_size)
            .filter(|&n| n <= b.len())
            .ok_or_else(|| DocumentError::Encoding("truncated header".into()))?;

        let count = read_uvarint(b, &mut pos)?;
        for _ in 0..count {
            let name_size = read_uvarint(b, &mut pos)? as usize;
            let name_end = pos
                .checked_add(name_size)
                .filter(|&n| n <= body_start)
                .ok_or_else(|| DocumentError::Encoding("truncated field name".into()))?;
            let name = std::str::from_utf8(&b[pos..name_end])
                .map_err(|_| DocumentError::Encoding("field name is not utf-8".into()))?;
            pos = name_end;
            let tag = read_uvarint(b, &mut pos)?;
            let ty = u8::try_from(tag)
                .ok()
                .and_then(ValueType::from_u8)
                .ok_or_else(|| DocumentError::Encoding(format!("unknown type tag {tag}")))?;
            let size = read_uvarint(b, &mut pos)? as usize;
            let offset = read_uvarint(b, &mut pos)? as usize;

            let payload_start = body_start + offset;
            let payload_end = payload_start
                .checked_add(size)
                .filter(|&n| n <= b.len())
                .ok_or_else(|| DocumentError::Encoding("payload out of bounds".into()))?;
            if !f(
                name,
                ty,
                self.start + payload_start,
                self.start + payload_end,
            )? {
                return Ok(());
            }
        }
        Ok(())
    }
}

fn decode_value(
    bytes: &Arc<[u8]>,
    ty: ValueType,
    start: usize,
    end: usize,
) -> Result<Value, DocumentError> {
    let payload = &bytes[start..end];
    Ok(match ty {
        ValueType::Null => Value::Null,
        ValueType::Bool => Value::Bool(payload.first().is_some_and(|&b| b != 0)),
        ValueType::Integer => Value::Integer(read_i64(payload)?),
        ValueType::Duration => Value::Duration(read_i64(payload)?),
        ValueType::Double => Value::Double(f64::from_bits(read_i64(payload)? as u64)),
        ValueType::Text => Value::Text(
            std::str::from_utf8(payload)
                .map_err(|_| DocumentError::Encoding("text payload is not utf-8".into()))?
                .to_string(),
        ),
        ValueType::Blob => Value::Blob(payload.to_vec()),
        ValueType::Document => {
            Value::Document(Document::Encoded(EncodedDocument::from_range(
                bytes.clone(),
                start,
                end,
            )))
        }
        ValueType::Array => {
            let mut pos = 0;
            let count = read_uvarint(payload, &mut pos)?;
            let mut items = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let tag = read_uvarint(payload, &mut pos)?;
                let elem_ty = u8::try_from(tag)
                    .ok()
                    .and_then(ValueType::from_u8)
                    .ok_or_else(|| DocumentError::Encoding(format!("unknown type tag {tag}")))?;
                let size = read_uvarint(payload, &mut pos)? as usize;
                let elem_end = pos
                    .checked_add(size)
                    .filter(|&n| n <= payload.len())
                    .ok_or_else(|| DocumentError::Encoding("truncated array element".into()))?;
                items.push(decode_value(
                    bytes,
                    elem_ty,
                    start + pos,
                    start + elem_end,
                )?);
                pos = elem_end;
            }
            Value::Array(items)
        }
    })
}

fn read_i64(payload: &[u8]) -> Result<i64, DocumentError> {
    let arr: [u8; 8] = payload
        .try_into()
        .map_err(|_| DocumentError::Encoding("expected 8-byte payload".into()))?;
    Ok(i64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FieldBuffer {
        let mut inner = FieldBuffer::new();
        inner.add("city", Value::Text("Lyon".into()));
        inner.add("zip", Value::Integer(69001));

        let mut fb = FieldBuffer::new();
        fb.add("name", Value::Text("Ada".into()));
        fb.add("age", Value::Integer(36));
        fb.add("score", Value::Double(9.5));
        fb.add("active", Value::Bool(true));
        fb.add("bio", Value::Null);
        fb.add("raw", Value::Blob(vec![0x00, 0xFF, 0x7f]));
        fb.add("wait", Value::Duration(1_500_000_000));
        fb.add(
            "tags",
            Value::Array(vec![
                Value::Text("a".into()),
                Value::Integer(2),
                Value::Array(vec![Value::Bool(false)]),
            ]),
        );
        fb.add("address", Value::Document(Document::Buf(inner)));
        fb
    }

    #[test]
    fn roundtrip_preserves_order_and_values() {
        let fb = sample();
        let bytes = encode(&Document::Buf(fb.clone())).unwrap();
        let decoded = EncodedDocument::new(bytes);

        let mut seen = Vec::new();
        decoded
            .iterate(&mut |name, value| {
                seen.push((name.to_string(), value));
                Ok(())
            })
            .unwrap();

        let expected: Vec<(String, Value)> = fb
            .iter()
            .map(|f| (f.name.clone(), f.value.clone()))
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn get_agrees_with_buffer() {
        let fb = sample();
        let bytes = encode(&Document::Buf(fb.clone())).unwrap();
        let decoded = EncodedDocument::new(bytes);
        for field in fb.iter() {
            assert_eq!(
                decoded.get(&field.name).unwrap().as_ref(),
                Some(&field.value),
                "field {}",
                field.name
            );
        }
        assert_eq!(decoded.get("missing").unwrap(), None);
    }

    #[test]
    fn duplicate_names_return_first() {
        let mut fb = FieldBuffer::new();
        fb.add("a", Value::Integer(1));
        fb.add("a", Value::Integer(2));
        let bytes = encode(&Document::Buf(fb)).unwrap();
        let decoded = EncodedDocument::new(bytes);
        assert_eq!(decoded.get("a").unwrap(), Some(Value::Integer(1)));
        assert_eq!(decoded.field_count().unwrap(), 2);
    }

    #[test]
    fn empty_field_name_fails() {
        let mut fb = FieldBuffer::new();
        fb.add("", Value::Integer(1));
        assert!(matches!(
            encode(&Document::Buf(fb)),
            Err(DocumentError::EmptyFieldName)
        ));
    }

    #[test]
    fn nested_document_is_lazy() {
        let fb = sample();
        let bytes = encode(&Document::Buf(fb)).unwrap();
        let decoded = EncodedDocument::new(bytes);
        let Some(Value::Document(Document::Encoded(inner))) = decoded.get("address").unwrap()
        else {
            panic!("expected encoded nested document");
        };
        assert_eq!(inner.get("zip").unwrap(), Some(Value::Integer(69001)));
    }

    #[test]
    fn decode_field_short_circuits() {
        let fb = sample();
        let bytes = encode(&Document::Buf(fb)).unwrap();
        assert_eq!(
            decode_field(&bytes, "age").unwrap(),
            Some(Value::Integer(36))
        );
    }

    #[test]
    fn encoding_already_encoded_is_identity() {
        let fb = sample();
        let bytes = encode(&Document::Buf(fb)).unwrap();
        let doc = Document::Encoded(EncodedDocument::new(bytes.clone()));
        assert_eq!(encode(&doc).unwrap(), bytes);
    }

    #[test]
    fn uvarint_roundtrip() {
        let mut buf = Vec::new();
        for v in [0u64, 1, 127, 128, 300, u64::from(u32::MAX), u64::MAX] {
            buf.clear();
            write_uvarint(&mut buf, v);
            let mut pos = 0;
            assert_eq!(read_uvarint(&buf, &mut pos).unwrap(), v);
            assert_eq!(pos, buf.len());
        }
    }
}
