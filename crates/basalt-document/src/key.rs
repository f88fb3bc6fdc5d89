//! Order-preserving key encoding.
//!
//! Encoded keys compare byte-lexicographically exactly like
//! [`Value::cmp_values`]: a leading rank byte orders the type classes, and
//! each class payload is encoded so byte order matches value order. The
//! numeric class (integer, double, duration) shares one rank and encodes as
//! sign-flipped big-endian IEEE 754 bits, so `1` and `1.0` produce the same
//! key. Index keys, sort keys and hash keys all go through here.

use crate::error::DocumentError;
use crate::value::Value;

const TAG_NULL: u8 = 0x05;
const TAG_BOOL: u8 = 0x10;
const TAG_NUMBER: u8 = 0x20;
const TAG_TEXT: u8 = 0x30;
const TAG_BLOB: u8 = 0x38;
const TAG_ARRAY: u8 = 0x40;
const TAG_DOCUMENT: u8 = 0x48;

/// Terminates variable-length items. Escaped content never produces the
/// `0x00 0x00` pair, and no value tag is zero, so the terminator is
/// unambiguous inside composite keys.
const TERM: [u8; 2] = [0x00, 0x00];
const ESCAPED_ZERO: [u8; 2] = [0x00, 0xFF];

#[inline]
fn encode_f64_sortable(f: f64) -> [u8; 8] {
    let bits = f.to_bits();
    let encoded = if (bits & 0x8000_0000_0000_0000) != 0 {
        !bits // negative: flip all bits
    } else {
        bits ^ 0x8000_0000_0000_0000 // positive: flip sign bit
    };
    encoded.to_be_bytes()
}

fn write_escaped(bytes: &[u8], buf: &mut Vec<u8>) {
    for &b in bytes {
        if b == 0x00 {
            buf.extend_from_slice(&ESCAPED_ZERO);
        } else {
            buf.push(b);
        }
    }
    buf.extend_from_slice(&TERM);
}

/// Append the sortable encoding of `value` to `buf`.
pub fn encode_key(value: &Value, buf: &mut Vec<u8>) -> Result<(), DocumentError> {
    match value {
        Value::Null => buf.push(TAG_NULL),
        Value::Bool(b) => {
            buf.push(TAG_BOOL);
            buf.push(*b as u8);
        }
        Value::Integer(n) | Value::Duration(n) => {
            buf.push(TAG_NUMBER);
            buf.extend_from_slice(&encode_f64_sortable(*n as f64));
        }
        Value::Double(d) => {
            buf.push(TAG_NUMBER);
            buf.extend_from_slice(&encode_f64_sortable(*d));
        }
        Value::Text(s) => {
            buf.push(TAG_TEXT);
            write_escaped(s.as_bytes(), buf);
        }
        Value::Blob(b) => {
            buf.push(TAG_BLOB);
            write_escaped(b, buf);
        }
        Value::Array(items) => {
            buf.push(TAG_ARRAY);
            for item in items {
                encode_key(item, buf)?;
            }
            buf.push(0x00);
        }
        Value::Document(doc) => {
            buf.push(TAG_DOCUMENT);
            let fb = doc.to_field_buffer()?;
            for field in fb.iter() {
                write_escaped(field.name.as_bytes(), buf);
                encode_key(&field.value, buf)?;
            }
            buf.push(0x00);
        }
    }
    Ok(())
}

/// Encode a sequence of values into one composite key.
pub fn encode_key_values(values: &[Value]) -> Result<Vec<u8>, DocumentError> {
    let mut buf = Vec::new();
    for value in values {
        encode_key(value, &mut buf)?;
    }
    Ok(buf)
}

#[inline]
fn decode_f64_sortable(b: [u8; 8]) -> f64 {
    let encoded = u64::from_be_bytes(b);
    let bits = if (encoded & 0x8000_0000_0000_0000) != 0 {
        encoded ^ 0x8000_0000_0000_0000 // was positive
    } else {
        !encoded // was negative
    };
    f64::from_bits(bits)
}

fn truncated() -> DocumentError {
    DocumentError::Encoding("truncated key".into())
}

fn read_escaped(bytes: &[u8], pos: &mut usize) -> Result<Vec<u8>, DocumentError> {
    let mut out = Vec::new();
    loop {
        let b = *bytes.get(*pos).ok_or_else(truncated)?;
        *pos += 1;
        if b != 0x00 {
            out.push(b);
            continue;
        }
        let next = *bytes.get(*pos).ok_or_else(truncated)?;
        *pos += 1;
        match next {
            0x00 => return Ok(out),
            0xFF => out.push(0x00),
            _ => return Err(DocumentError::Encoding("invalid key escape".into())),
        }
    }
}

fn decode_one(bytes: &[u8], pos: &mut usize) -> Result<Value, DocumentError> {
    let tag = *bytes.get(*pos).ok_or_else(truncated)?;
    *pos += 1;
    Ok(match tag {
        TAG_NULL => Value::Null,
        TAG_BOOL => {
            let b = *bytes.get(*pos).ok_or_else(truncated)?;
            *pos += 1;
            Value::Bool(b != 0)
        }
        TAG_NUMBER => {
            let end = pos.checked_add(8).filter(|&n| n <= bytes.len()).ok_or_else(truncated)?;
            let arr: [u8; 8] = bytes[*pos..end].try_into().expect("checked length");
            *pos = end;
            let f = decode_f64_sortable(arr);
            // Integers and doubles share the numeric encoding; whole values
            // come back as integers.
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                Value::Integer(f as i64)
            } else {
                Value::Double(f)
            }
        }
        TAG_TEXT => {
            let raw = read_escaped(bytes, pos)?;
            Value::Text(
                String::from_utf8(raw)
                    .map_err(|_| DocumentError::Encoding("key text is not utf-8".into()))?,
            )
        }
        TAG_BLOB => Value::Blob(read_escaped(bytes, pos)?),
        TAG_ARRAY => {
            let mut items = Vec::new();
            while *bytes.get(*pos).ok_or_else(truncated)? != 0x00 {
                items.push(decode_one(bytes, pos)?);
            }
            *pos += 1;
            Value::Array(items)
        }
        TAG_DOCUMENT => {
            let mut fb = crate::document::FieldBuffer::new();
            while *bytes.get(*pos).ok_or_else(truncated)? != 0x00 {
                let name = read_escaped(bytes, pos)?;
                let name = String::from_utf8(name)
                    .map_err(|_| DocumentError::Encoding("key field name is not utf-8".into()))?;
                fb.add(name, decode_one(bytes, pos)?);
            }
            *pos += 1;
            Value::Document(crate::document::Document::Buf(fb))
        }
        other => {
            return Err(DocumentError::Encoding(format!(
                "unknown key tag 0x{other:02x}"
            )));
        }
    })
}

/// Decode a composite key back into values. Integers and doubles share one
/// numeric encoding, so whole doubles come back as integers; re-encoding
/// always reproduces the input bytes.
pub fn decode_key_values(bytes: &[u8]) -> Result<Vec<Value>, DocumentError> {
    let mut values = Vec::new();
    let mut pos = 0;
    while pos < bytes.len() {
        values.push(decode_one(bytes, &mut pos)?);
    }
    Ok(values)
}
