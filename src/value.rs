//! In-memory row values.

use std::collections::BTreeMap;

use serde::{ Serialize, Serializer };
use serde_json::{ Map, Number, Value };

/// A single row keyed by field name.
pub type RowData = BTreeMap<String, FieldValue>;

/// A tagged cell value. Rows coming from JSON arrive mostly as `Json` or
/// primitive variants; the column builder coerces them per field type.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(Value),
    Array(Vec<FieldValue>),
    FloatVector(Vec<f32>),
    /// Raw bytes: binary vectors, pre-encoded float16/bfloat16 buffers.
    Bytes(Vec<u8>),
    Int8Vector(Vec<i8>),
    Sparse(SparseVector),
    /// One struct-array cell: an ordered list of element rows.
    Struct(Vec<RowData>),
}

impl Default for FieldValue {
    fn default() -> Self {
        FieldValue::Null
    }
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null | FieldValue::Json(Value::Null))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            FieldValue::Json(Value::String(s)) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            FieldValue::Json(v) => v.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Float(v) => Some(*v),
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Json(v) => v.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            FieldValue::Json(Value::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::Null => Value::Null,
            FieldValue::Bool(v) => Value::Bool(*v),
            FieldValue::Int(v) => Value::from(*v),
            FieldValue::Float(v) => float_to_json(*v),
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Json(v) => v.clone(),
            FieldValue::Array(items) => Value::Array(items.iter().map(FieldValue::to_json).collect()),
            FieldValue::FloatVector(v) => Value::Array(v.iter().map(|x| float_to_json(*x as f64)).collect()),
            FieldValue::Bytes(b) => Value::Array(b.iter().map(|x| Value::from(*x)).collect()),
            FieldValue::Int8Vector(v) => Value::Array(v.iter().map(|x| Value::from(*x)).collect()),
            FieldValue::Sparse(s) => s.to_json(),
            FieldValue::Struct(rows) => Value::Array(rows.iter().map(row_to_json).collect()),
        }
    }
}

fn float_to_json(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

pub fn row_to_json(row: &RowData) -> Value {
    let mut map = Map::new();
    for (key, value) in row {
        map.insert(key.clone(), value.to_json());
    }
    Value::Object(map)
}

/// Builds a row from a JSON object. Non-object input yields an empty row.
pub fn row_from_json(value: Value) -> RowData {
    match value {
        Value::Object(map) => map.into_iter().map(|(k, v)| (k, FieldValue::from(v))).collect(),
        _ => RowData::new(),
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(b) => FieldValue::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    FieldValue::Int(i)
                } else {
                    FieldValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => FieldValue::String(s),
            other => FieldValue::Json(other),
        }
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(v as i64)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::String(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::String(v)
    }
}

impl From<Vec<f32>> for FieldValue {
    fn from(v: Vec<f32>) -> Self {
        FieldValue::FloatVector(v)
    }
}

impl From<Vec<u8>> for FieldValue {
    fn from(v: Vec<u8>) -> Self {
        FieldValue::Bytes(v)
    }
}

impl From<Vec<i8>> for FieldValue {
    fn from(v: Vec<i8>) -> Self {
        FieldValue::Int8Vector(v)
    }
}

impl From<SparseVector> for FieldValue {
    fn from(v: SparseVector) -> Self {
        FieldValue::Sparse(v)
    }
}

/// String form of a parameter value: strings pass through, everything
/// else is rendered as JSON text.
pub fn param_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Largest index a sparse entry may carry (exclusive).
pub const SPARSE_INDEX_LIMIT: u64 = u32::MAX as u64;

/// Sparse vector as (index, value) pairs sorted by ascending index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(u32, f32)>,
}

/// Input shapes accepted for a sparse vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparseFormat {
    /// `{"12": 0.5, "17": 0.1}`
    Dict,
    /// `{"indices": [12, 17], "values": [0.5, 0.1]}`
    Csr,
    /// `[{"index": 12, "value": 0.5}]`
    Coo,
    /// Positional `[0.0, 0.5, null]`; present entries keep their position.
    Array,
    Unknown,
}

impl SparseFormat {
    /// Classifies a JSON payload. An object carrying both `indices` and
    /// `values` arrays is CSR; any other object is a dict.
    pub fn classify(value: &Value) -> SparseFormat {
        match value {
            Value::Object(map) => {
                let csr = matches!(map.get("indices"), Some(Value::Array(_))) &&
                    matches!(map.get("values"), Some(Value::Array(_)));
                if csr {
                    SparseFormat::Csr
                } else {
                    SparseFormat::Dict
                }
            }
            Value::Array(items) => {
                match items.first() {
                    None => SparseFormat::Array,
                    Some(Value::Object(first)) if first.contains_key("index") && first.contains_key("value") =>
                        SparseFormat::Coo,
                    Some(_) if items.iter().all(|v| v.is_number() || v.is_null()) => SparseFormat::Array,
                    _ => SparseFormat::Unknown,
                }
            }
            _ => SparseFormat::Unknown,
        }
    }
}

impl SparseVector {
    /// Sorts by index; a repeated index keeps its last value.
    pub fn new(mut entries: Vec<(u32, f32)>) -> Result<Self, String> {
        for (index, value) in &entries {
            if *index as u64 >= SPARSE_INDEX_LIMIT {
                return Err(format!("sparse index {} out of range", index));
            }
            if value.is_nan() {
                return Err(format!("sparse value at index {} is NaN", index));
            }
        }
        entries.sort_by_key(|(i, _)| *i);
        let mut deduped: Vec<(u32, f32)> = Vec::with_capacity(entries.len());
        for (index, value) in entries {
            match deduped.last_mut() {
                Some(last) if last.0 == index => last.1 = value,
                _ => deduped.push((index, value)),
            }
        }
        Ok(SparseVector { entries: deduped })
    }

    pub fn entries(&self) -> &[(u32, f32)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: u32) -> Option<f32> {
        self.entries
            .binary_search_by_key(&index, |(i, _)| *i)
            .ok()
            .map(|pos| self.entries[pos].1)
    }

    /// Maximum index plus one; zero when empty.
    pub fn dim(&self) -> u64 {
        self.entries.last().map(|(i, _)| *i as u64 + 1).unwrap_or(0)
    }

    /// 8 bytes per entry: little-endian u32 index, then little-endian f32 value.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.entries.len() * 8);
        for (index, value) in &self.entries {
            out.extend_from_slice(&index.to_le_bytes());
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() % 8 != 0 {
            return Err(format!("sparse row length {} is not a multiple of 8", bytes.len()));
        }
        let entries = bytes
            .chunks_exact(8)
            .map(|chunk| {
                let index = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                let value = f32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
                (index, value)
            })
            .collect();
        SparseVector::new(entries)
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        for (index, value) in &self.entries {
            map.insert(index.to_string(), float_to_json(*value as f64));
        }
        Value::Object(map)
    }

    pub fn from_json(value: &Value) -> Result<Self, String> {
        let entries = match SparseFormat::classify(value) {
            SparseFormat::Dict => {
                let map = value.as_object().ok_or("expected object")?;
                let mut entries = Vec::with_capacity(map.len());
                for (key, v) in map {
                    let index = key
                        .parse::<u64>()
                        .map_err(|_| format!("sparse key '{}' is not an index", key))?;
                    entries.push((check_index(index)?, number(v)?));
                }
                entries
            }
            SparseFormat::Csr => {
                let indices = value["indices"].as_array().ok_or("indices must be an array")?;
                let values = value["values"].as_array().ok_or("values must be an array")?;
                if indices.len() != values.len() {
                    return Err(
                        format!("indices ({}) and values ({}) differ in length", indices.len(), values.len())
                    );
                }
                indices
                    .iter()
                    .zip(values)
                    .map(|(i, v)| Ok((index(i)?, number(v)?)))
                    .collect::<Result<Vec<_>, String>>()?
            }
            SparseFormat::Coo => {
                let items = value.as_array().ok_or("expected array")?;
                items
                    .iter()
                    .map(|item| Ok((index(&item["index"])?, number(&item["value"])?)))
                    .collect::<Result<Vec<_>, String>>()?
            }
            SparseFormat::Array => {
                let items = value.as_array().ok_or("expected array")?;
                let mut entries = Vec::new();
                for (pos, v) in items.iter().enumerate() {
                    if v.is_null() {
                        continue;
                    }
                    entries.push((check_index(pos as u64)?, number(v)?));
                }
                entries
            }
            SparseFormat::Unknown => {
                return Err("unrecognized sparse vector format".to_string());
            }
        };
        SparseVector::new(entries)
    }

    /// Positional input: every non-null slot becomes an entry.
    pub fn from_positional(values: &[f32]) -> Result<Self, String> {
        let entries = values
            .iter()
            .enumerate()
            .map(|(i, v)| Ok((check_index(i as u64)?, *v)))
            .collect::<Result<Vec<_>, String>>()?;
        SparseVector::new(entries)
    }
}

fn check_index(index: u64) -> Result<u32, String> {
    if index >= SPARSE_INDEX_LIMIT {
        return Err(format!("sparse index {} out of range", index));
    }
    Ok(index as u32)
}

fn index(value: &Value) -> Result<u32, String> {
    value
        .as_u64()
        .ok_or_else(|| format!("sparse index {} is not a non-negative integer", value))
        .and_then(check_index)
}

fn number(value: &Value) -> Result<f32, String> {
    value
        .as_f64()
        .map(|v| v as f32)
        .ok_or_else(|| format!("sparse value {} is not a number", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sparse_formats_are_classified() {
        assert_eq!(SparseFormat::classify(&json!({"1": 0.5})), SparseFormat::Dict);
        assert_eq!(SparseFormat::classify(&json!({})), SparseFormat::Dict);
        assert_eq!(
            SparseFormat::classify(&json!({"indices": [1], "values": [0.5]})),
            SparseFormat::Csr
        );
        assert_eq!(SparseFormat::classify(&json!([{"index": 1, "value": 0.5}])), SparseFormat::Coo);
        assert_eq!(SparseFormat::classify(&json!([0.0, null, 0.5])), SparseFormat::Array);
        assert_eq!(SparseFormat::classify(&json!([[1.0], [2.0]])), SparseFormat::Unknown);
        assert_eq!(SparseFormat::classify(&json!("x")), SparseFormat::Unknown);
    }

    #[test]
    fn every_format_yields_the_same_vector() {
        let dict = SparseVector::from_json(&json!({"17": 0.25, "12": 0.5})).unwrap();
        let csr = SparseVector::from_json(&json!({"indices": [12, 17], "values": [0.5, 0.25]})).unwrap();
        let coo = SparseVector::from_json(
            &json!([{"index": 17, "value": 0.25}, {"index": 12, "value": 0.5}])
        ).unwrap();
        assert_eq!(dict, csr);
        assert_eq!(dict, coo);
        assert_eq!(dict.entries(), &[(12, 0.5), (17, 0.25)]);
        assert_eq!(dict.dim(), 18);
    }

    #[test]
    fn array_format_skips_null_slots() {
        let v = SparseVector::from_json(&json!([0.0, null, 1.5])).unwrap();
        assert_eq!(v.entries(), &[(0, 0.0), (2, 1.5)]);
    }

    #[test]
    fn sparse_bytes_are_index_then_value() {
        let v = SparseVector::new(vec![(12, 0.875), (17, 0.789), (19, 0.934)]).unwrap();
        let bytes = v.to_bytes();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[0..4], &12u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0.875f32.to_le_bytes());
        assert_eq!(SparseVector::from_bytes(&bytes).unwrap(), v);
        assert!(SparseVector::from_bytes(&bytes[..7]).is_err());
    }

    #[test]
    fn out_of_range_and_nan_are_rejected() {
        assert!(SparseVector::new(vec![(u32::MAX, 1.0)]).is_err());
        assert!(SparseVector::new(vec![(1, f32::NAN)]).is_err());
        assert!(SparseVector::from_json(&json!({"4294967295": 1.0})).is_err());
        assert!(SparseVector::from_json(&json!({"-1": 1.0})).is_err());
        assert!(SparseVector::from_json(&json!({"indices": [1, 2], "values": [0.1]})).is_err());
    }

    #[test]
    fn json_values_map_to_tagged_cells() {
        assert_eq!(FieldValue::from(json!(3)), FieldValue::Int(3));
        assert_eq!(FieldValue::from(json!(1.5)), FieldValue::Float(1.5));
        assert_eq!(FieldValue::from(json!(null)), FieldValue::Null);
        assert_eq!(FieldValue::from(json!([1, 2])), FieldValue::Json(json!([1, 2])));
        assert_eq!(param_string(&json!("IVF_FLAT")), "IVF_FLAT");
        assert_eq!(param_string(&json!(100)), "100");
        assert_eq!(param_string(&json!({"k": 60})), "{\"k\":60}");
        let row = row_from_json(json!({"a": 1, "b": "x"}));
        assert_eq!(row_to_json(&row), json!({"a": 1, "b": "x"}));
    }
}
