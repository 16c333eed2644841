use serde::{Serialize, Deserialize};
use std::collections::BTreeMap;
use xxhash_rust::xxh3::xxh3_64;
use crate::core::error::{Error, ErrorKind, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u64);

impl DocId {
    pub fn new(id: u64) -> Self {
        DocId(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl From<u64> for DocId {
    fn from(id: u64) -> Self {
        DocId(id)
    }
}

/// Stable id of a field name within a collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyId(pub u32);

/// Position of a value record in the value index
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ValueId(pub u64);

/// Hash of a field name, the lookup key of the key registry
pub fn key_hash(name: &str) -> u64 {
    xxh3_64(name.as_bytes())
}

/// Collections are addressed on disk by the hash of their name
pub fn collection_id(name: &str) -> u64 {
    xxh3_64(name.as_bytes())
}

/// On-disk type tag of a stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    Text = 1,
    Int = 2,
    Float = 3,
    Binary = 4,
}

impl DataType {
    pub fn as_byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            1 => Ok(DataType::Text),
            2 => Ok(DataType::Int),
            3 => Ok(DataType::Float),
            4 => Ok(DataType::Binary),
            other => Err(Error::malformed(format!("unknown data type tag {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Int(i64),
    Float(f64),
    Binary(Vec<u8>),
}

impl FieldValue {
    pub fn data_type(&self) -> DataType {
        match self {
            FieldValue::Text(_) => DataType::Text,
            FieldValue::Int(_) => DataType::Int,
            FieldValue::Float(_) => DataType::Float,
            FieldValue::Binary(_) => DataType::Binary,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            FieldValue::Text(s) => s.as_bytes().to_vec(),
            FieldValue::Int(i) => i.to_le_bytes().to_vec(),
            FieldValue::Float(f) => f.to_le_bytes().to_vec(),
            FieldValue::Binary(b) => b.clone(),
        }
    }

    pub fn from_bytes(data_type: DataType, bytes: &[u8]) -> Result<Self> {
        match data_type {
            DataType::Text => String::from_utf8(bytes.to_vec())
                .map(FieldValue::Text)
                .map_err(|_| Error::malformed("text value is not valid UTF-8")),
            DataType::Int => fixed_8(bytes).map(|b| FieldValue::Int(i64::from_le_bytes(b))),
            DataType::Float => fixed_8(bytes).map(|b| FieldValue::Float(f64::from_le_bytes(b))),
            DataType::Binary => Ok(FieldValue::Binary(bytes.to_vec())),
        }
    }

    /// Converts a JSON scalar; null, booleans, arrays and objects have no stored form
    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::String(s) => Ok(FieldValue::Text(s.clone())),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(FieldValue::Int(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(FieldValue::Float(f))
                } else {
                    Err(Error::new(
                        ErrorKind::UnsupportedValueType,
                        format!("number {} is out of range", n),
                    ))
                }
            }
            other => Err(Error::new(
                ErrorKind::UnsupportedValueType,
                format!("unsupported value {}", other),
            )),
        }
    }
}

fn fixed_8(bytes: &[u8]) -> Result<[u8; 8]> {
    bytes
        .try_into()
        .map_err(|_| Error::malformed(format!("expected 8 value bytes, got {}", bytes.len())))
}

/// Incoming document: an unordered field map, kept sorted for deterministic ingest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub fields: BTreeMap<String, FieldValue>,
}

impl Document {
    pub fn new() -> Self {
        Document {
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: FieldValue) -> Self {
        self.add_field(name.to_string(), value);
        self
    }

    pub fn add_field(&mut self, name: String, value: FieldValue) {
        self.fields.insert(name, value);
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Self> {
        let object = value.as_object().ok_or_else(|| {
            Error::new(ErrorKind::UnsupportedValueType, "document must be a JSON object".to_string())
        })?;

        let mut doc = Document::new();
        for (name, value) in object {
            doc.add_field(name.clone(), FieldValue::from_json(value)?);
        }
        Ok(doc)
    }
}

/// Document read back from a published segment
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub id: DocId,
    pub fields: Vec<(String, FieldValue)>,
}

impl StoredDocument {
    pub fn get_field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_value_bytes_keep_type() {
        let values = vec![
            FieldValue::Text("héllo".to_string()),
            FieldValue::Int(-42),
            FieldValue::Float(2.5),
            FieldValue::Binary(vec![0, 1, 2, 255]),
        ];

        for value in values {
            let bytes = value.to_bytes();
            let back = FieldValue::from_bytes(value.data_type(), &bytes).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn test_short_int_is_malformed() {
        let err = FieldValue::from_bytes(DataType::Int, &[1, 2, 3]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedSegment);
    }

    #[test]
    fn test_unknown_type_tag() {
        assert!(DataType::from_byte(0).is_err());
        assert_eq!(DataType::from_byte(4).unwrap(), DataType::Binary);
    }

    #[test]
    fn test_document_from_json() {
        let doc = Document::from_json(&json!({"title": "cat", "created": 7, "score": 0.5})).unwrap();
        assert_eq!(doc.get_field("title"), Some(&FieldValue::Text("cat".to_string())));
        assert_eq!(doc.get_field("created"), Some(&FieldValue::Int(7)));
        assert_eq!(doc.get_field("score"), Some(&FieldValue::Float(0.5)));
    }

    #[test]
    fn test_document_from_json_rejects_unsupported() {
        let err = Document::from_json(&json!({"title": "cat", "tags": ["a"]})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedValueType);

        let err = Document::from_json(&json!({"flag": true})).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedValueType);

        let err = Document::from_json(&json!("not an object")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedValueType);
    }

    #[test]
    fn test_key_hash_is_stable() {
        assert_eq!(key_hash("title"), key_hash("title"));
        assert_ne!(key_hash("title"), key_hash("body"));
    }
}
