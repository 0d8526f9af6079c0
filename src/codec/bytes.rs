//! Byte-level vector encodings and the pluggable transformer registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use half::{ bf16, f16 };

use crate::registry::VectorKind;
use crate::value::{ FieldValue, SparseVector };

/// Converts between caller-facing floats and the packed wire form of one
/// vector kind. Errors are plain messages; the caller attaches field context.
pub trait VectorTransformer: Send + Sync {
    fn encode(&self, values: &[f32]) -> Result<Vec<u8>, String>;
    fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>, String>;
}

pub struct Float16Transformer;

impl VectorTransformer for Float16Transformer {
    fn encode(&self, values: &[f32]) -> Result<Vec<u8>, String> {
        Ok(
            values
                .iter()
                .flat_map(|v| f16::from_f32(*v).to_le_bytes())
                .collect()
        )
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>, String> {
        if bytes.len() % 2 != 0 {
            return Err(format!("float16 buffer length {} is odd", bytes.len()));
        }
        Ok(
            bytes
                .chunks_exact(2)
                .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect()
        )
    }
}

pub struct BFloat16Transformer;

impl VectorTransformer for BFloat16Transformer {
    fn encode(&self, values: &[f32]) -> Result<Vec<u8>, String> {
        Ok(
            values
                .iter()
                .flat_map(|v| bf16::from_f32(*v).to_le_bytes())
                .collect()
        )
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>, String> {
        if bytes.len() % 2 != 0 {
            return Err(format!("bfloat16 buffer length {} is odd", bytes.len()));
        }
        Ok(
            bytes
                .chunks_exact(2)
                .map(|c| bf16::from_le_bytes([c[0], c[1]]).to_f32())
                .collect()
        )
    }
}

/// Integral values in `[-128, 127]` only.
pub struct Int8Transformer;

impl VectorTransformer for Int8Transformer {
    fn encode(&self, values: &[f32]) -> Result<Vec<u8>, String> {
        values
            .iter()
            .map(|v| {
                if v.fract() != 0.0 || *v < (i8::MIN as f32) || *v > (i8::MAX as f32) {
                    Err(format!("{} is not a valid int8 value", v))
                } else {
                    Ok((*v as i8) as u8)
                }
            })
            .collect()
    }

    fn decode(&self, bytes: &[u8]) -> Result<Vec<f32>, String> {
        Ok(bytes.iter().map(|b| (*b as i8) as f32).collect())
    }
}

/// Per-kind transformer overrides. Kinds without an override use the
/// built-in conversions above.
#[derive(Clone, Default)]
pub struct Transformers {
    overrides: HashMap<VectorKind, Arc<dyn VectorTransformer>>,
}

impl fmt::Debug for Transformers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transformers").field("overrides", &self.overrides.keys().collect::<Vec<_>>()).finish()
    }
}

static FLOAT16: Float16Transformer = Float16Transformer;
static BFLOAT16: BFloat16Transformer = BFloat16Transformer;
static INT8: Int8Transformer = Int8Transformer;

impl Transformers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<T: VectorTransformer + 'static>(mut self, kind: VectorKind, transformer: T) -> Self {
        self.overrides.insert(kind, Arc::new(transformer));
        self
    }

    pub fn has_override(&self, kind: VectorKind) -> bool {
        self.overrides.contains_key(&kind)
    }

    /// Transformer for a packed kind; `None` for kinds that travel as floats,
    /// bits or sparse pairs.
    pub fn get(&self, kind: VectorKind) -> Option<&dyn VectorTransformer> {
        if let Some(custom) = self.overrides.get(&kind) {
            return Some(custom.as_ref());
        }
        match kind {
            VectorKind::Float16 => Some(&FLOAT16),
            VectorKind::BFloat16 => Some(&BFLOAT16),
            VectorKind::Int8 => Some(&INT8),
            _ => None,
        }
    }
}

/// Little-endian f32 buffer, the placeholder form of a float vector.
pub fn f32_to_le_bytes(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 4);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn i8_to_bytes(values: &[i8]) -> Vec<u8> {
    values
        .iter()
        .map(|v| *v as u8)
        .collect()
}

pub fn bytes_to_i8(bytes: &[u8]) -> Vec<i8> {
    bytes
        .iter()
        .map(|b| *b as i8)
        .collect()
}

/// A vector value normalized to its wire payload.
#[derive(Debug, Clone, PartialEq)]
pub enum PackedVector {
    Floats(Vec<f32>),
    Bytes(Vec<u8>),
    Sparse(SparseVector),
}

impl PackedVector {
    /// Logical dimension carried by the payload.
    pub fn dim(&self, kind: VectorKind) -> usize {
        match self {
            PackedVector::Floats(v) => v.len(),
            PackedVector::Bytes(b) =>
                match kind {
                    VectorKind::Binary => b.len() * 8,
                    VectorKind::Float16 | VectorKind::BFloat16 => b.len() / 2,
                    _ => b.len(),
                }
            PackedVector::Sparse(s) => s.dim() as usize,
        }
    }

    /// Placeholder bytes: floats little-endian, sparse as index/value pairs.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            PackedVector::Floats(v) => f32_to_le_bytes(&v),
            PackedVector::Bytes(b) => b,
            PackedVector::Sparse(s) => s.to_bytes(),
        }
    }
}

/// Numbers of a dense vector value, if it is one.
pub fn float_values(value: &FieldValue) -> Option<Vec<f32>> {
    match value {
        FieldValue::FloatVector(v) => Some(v.clone()),
        FieldValue::Int8Vector(v) => Some(v.iter().map(|x| *x as f32).collect()),
        FieldValue::Array(items) => items.iter().map(|i| i.as_f64().map(|x| x as f32)).collect(),
        FieldValue::Json(serde_json::Value::Array(items)) =>
            items.iter().map(|i| i.as_f64().map(|x| x as f32)).collect(),
        _ => None,
    }
}

fn byte_values(value: &FieldValue) -> Option<Vec<u8>> {
    match value {
        FieldValue::Bytes(b) => Some(b.clone()),
        FieldValue::Array(items) =>
            items
                .iter()
                .map(|i| i.as_i64().and_then(|x| u8::try_from(x).ok()))
                .collect(),
        FieldValue::Json(serde_json::Value::Array(items)) =>
            items
                .iter()
                .map(|i| i.as_u64().and_then(|x| u8::try_from(x).ok()))
                .collect(),
        _ => None,
    }
}

/// Normalizes one vector value of `kind`. Pre-packed byte input passes
/// through; float input goes through the kind's transformer.
pub fn pack_vector(
    kind: VectorKind,
    value: &FieldValue,
    transformers: &Transformers
) -> Result<PackedVector, String> {
    match kind {
        VectorKind::Float =>
            float_values(value)
                .map(PackedVector::Floats)
                .ok_or_else(|| "expected an array of numbers".to_string()),
        VectorKind::Binary =>
            byte_values(value)
                .map(PackedVector::Bytes)
                .ok_or_else(|| "expected bytes for a binary vector".to_string()),
        VectorKind::Float16 | VectorKind::BFloat16 | VectorKind::Int8 => {
            match value {
                FieldValue::Bytes(b) => Ok(PackedVector::Bytes(b.clone())),
                FieldValue::Int8Vector(v) if kind == VectorKind::Int8 && !transformers.has_override(kind) =>
                    Ok(PackedVector::Bytes(i8_to_bytes(v))),
                other => {
                    let floats = float_values(other).ok_or_else(|| "expected an array of numbers".to_string())?;
                    let transformer = transformers
                        .get(kind)
                        .ok_or_else(|| format!("no transformer for {:?}", kind))?;
                    transformer.encode(&floats).map(PackedVector::Bytes)
                }
            }
        }
        VectorKind::Sparse =>
            match value {
                FieldValue::Sparse(s) => Ok(PackedVector::Sparse(s.clone())),
                FieldValue::FloatVector(v) => SparseVector::from_positional(v).map(PackedVector::Sparse),
                other => SparseVector::from_json(&other.to_json()).map(PackedVector::Sparse),
            }
    }
}
