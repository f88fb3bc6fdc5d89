mod document;
mod encoding;
mod error;
mod hash;
mod json;
pub mod key;
mod path;
mod value;

pub use document::{Document, Field, FieldBuffer};
pub use encoding::{EncodedDocument, decode_field, encode};
pub use error::DocumentError;
pub use hash::{ValueMap, ValueSet};
pub use path::{Fragment, Path};
pub use value::{Value, ValueType};
