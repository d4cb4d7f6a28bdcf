//! Value codecs — turn structured records into store-able bytes and back.
//!
//! The store itself treats values as opaque; these codecs live at the
//! boundary where callers hand records in. [`CompactCodec`] joins a fixed,
//! ordered field table into one delimiter-separated line (cheap, ideal for
//! the line-based chunk format); [`JsonCodec`] keeps the whole record as
//! JSON with lexicographically ordered keys.

use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// Per-field encoder: field value → string form.
pub type EncodeFn = fn(&Value) -> String;
/// Per-field decoder: string form → field value.
pub type DecodeFn = fn(&str) -> Value;

/// One entry of the ordered field table. Dotted names (`"meta.origin"`)
/// address nested maps.
#[derive(Clone)]
pub struct Field {
    name: String,
    encode: Option<EncodeFn>,
    decode: Option<DecodeFn>,
}

impl Field {
    /// Field with default string conversion in both directions.
    pub fn new(name: &str) -> Self {
        Field {
            name: name.to_string(),
            encode: None,
            decode: None,
        }
    }

    /// Field with explicit encoder/decoder functions.
    pub fn with_codec(name: &str, encode: EncodeFn, decode: DecodeFn) -> Self {
        Field {
            name: name.to_string(),
            encode: Some(encode),
            decode: Some(decode),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Delimiter-joined record codec over a fixed field table.
///
/// Every record serialises to exactly one part per field, joined with the
/// delimiter. An absent or empty sub-record encodes as the empty string;
/// decoding the empty string yields `Value::Null`.
pub struct CompactCodec {
    fields: Vec<Field>,
    delimiter: char,
}

impl CompactCodec {
    pub fn new(fields: Vec<Field>) -> Self {
        CompactCodec {
            fields,
            delimiter: '|',
        }
    }

    pub fn serialize(&self, record: &Value) -> Vec<u8> {
        let parts: Vec<String> = self
            .fields
            .iter()
            .map(|field| self.stringify(field, lookup_path(record, &field.name)))
            .collect();
        parts.join(&self.delimiter.to_string()).into_bytes()
    }

    pub fn deserialize(&self, data: &[u8]) -> Result<Value> {
        let text = std::str::from_utf8(data)
            .map_err(|_| StoreError::Codec("record is not valid UTF-8".into()))?;
        let parts: Vec<&str> = text.split(self.delimiter).collect();
        if parts.len() != self.fields.len() {
            return Err(StoreError::Codec(format!(
                "expected {} fields, found {}",
                self.fields.len(),
                parts.len()
            )));
        }
        let mut record = Value::Object(Map::new());
        for (field, part) in self.fields.iter().zip(parts) {
            insert_path(&mut record, &field.name, self.destringify(field, part));
        }
        Ok(record)
    }

    fn stringify(&self, field: &Field, value: Option<&Value>) -> String {
        let Some(value) = value else {
            return String::new();
        };
        let empty = match value {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if empty {
            return String::new();
        }
        match field.encode {
            Some(encode) => encode(value),
            None => default_to_string(value),
        }
    }

    fn destringify(&self, field: &Field, part: &str) -> Value {
        if part.is_empty() {
            return Value::Null;
        }
        match field.decode {
            Some(decode) => decode(part),
            None => Value::String(part.to_string()),
        }
    }
}

/// JSON record codec with deterministic output: object keys serialise in
/// lexicographical order.
pub struct JsonCodec;

impl JsonCodec {
    pub fn serialize(&self, record: &Value) -> Result<Vec<u8>> {
        serde_json::to_vec(record).map_err(|e| StoreError::Codec(e.to_string()))
    }

    pub fn deserialize(&self, data: &[u8]) -> Result<Value> {
        serde_json::from_slice(data).map_err(|e| StoreError::Codec(e.to_string()))
    }
}

fn default_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Walk a dotted path through nested maps. `None` once any segment is
/// missing.
fn lookup_path<'a>(record: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = record;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// Insert `value` at a dotted path, creating intermediate maps as needed.
fn insert_path(record: &mut Value, path: &str, value: Value) {
    let parts: Vec<&str> = path.split('.').collect();
    let mut current = record;
    for part in &parts[..parts.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let Some(map) = current.as_object_mut() else {
            return;
        };
        current = map.entry(part.to_string()).or_insert(Value::Null);
    }
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(parts[parts.len() - 1].to_string(), value);
    }
}
