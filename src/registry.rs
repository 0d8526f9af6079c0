//! Mapping tables between logical field types, wire discriminants,
//! column container keys and per-field codecs.

use std::fmt;
use std::str::FromStr;

use serde::{ Deserialize, Serialize };

/// Logical field type. Discriminants are the `schema.DataType` wire tags.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    ::prost::Enumeration,
    Serialize,
    Deserialize
)]
#[repr(i32)]
pub enum DataType {
    None = 0,
    Bool = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    Float = 10,
    Double = 11,
    String = 20,
    VarChar = 21,
    Array = 22,
    #[serde(rename = "JSON")]
    Json = 23,
    Geometry = 24,
    Text = 25,
    Timestamptz = 26,
    BinaryVector = 100,
    FloatVector = 101,
    Float16Vector = 102,
    BFloat16Vector = 103,
    SparseFloatVector = 104,
    Int8Vector = 105,
    /// Internal: vector sub-field of a struct array.
    ArrayOfVector = 106,
    ArrayOfStruct = 200,
    /// Element type of a struct-array field.
    Struct = 201,
}

const DATA_TYPE_NAMES: &[(DataType, &str)] = &[
    (DataType::None, "None"),
    (DataType::Bool, "Bool"),
    (DataType::Int8, "Int8"),
    (DataType::Int16, "Int16"),
    (DataType::Int32, "Int32"),
    (DataType::Int64, "Int64"),
    (DataType::Float, "Float"),
    (DataType::Double, "Double"),
    (DataType::String, "String"),
    (DataType::VarChar, "VarChar"),
    (DataType::Array, "Array"),
    (DataType::Json, "JSON"),
    (DataType::Geometry, "Geometry"),
    (DataType::Text, "Text"),
    (DataType::Timestamptz, "Timestamptz"),
    (DataType::BinaryVector, "BinaryVector"),
    (DataType::FloatVector, "FloatVector"),
    (DataType::Float16Vector, "Float16Vector"),
    (DataType::BFloat16Vector, "BFloat16Vector"),
    (DataType::SparseFloatVector, "SparseFloatVector"),
    (DataType::Int8Vector, "Int8Vector"),
    (DataType::ArrayOfVector, "ArrayOfVector"),
    (DataType::ArrayOfStruct, "ArrayOfStruct"),
    (DataType::Struct, "Struct"),
];

impl DataType {
    /// Wire name, as returned by describe-collection.
    pub fn name(self) -> &'static str {
        DATA_TYPE_NAMES.iter()
            .find(|(t, _)| *t == self)
            .map(|(_, n)| *n)
            .unwrap_or("None")
    }

    /// Resolves a wire name; case-insensitive.
    pub fn from_name(name: &str) -> Option<DataType> {
        DATA_TYPE_NAMES.iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(t, _)| *t)
    }

    pub fn from_code(code: i32) -> Option<DataType> {
        DataType::try_from(code).ok()
    }

    pub fn is_vector(self) -> bool {
        VectorKind::from_data_type(self).is_some()
    }

    /// Key of the column container that carries this type's values.
    pub fn data_key(self) -> Option<&'static str> {
        let key = match self {
            DataType::FloatVector => "float_vector",
            DataType::Float16Vector => "float16_vector",
            DataType::BFloat16Vector => "bfloat16_vector",
            DataType::BinaryVector => "binary_vector",
            DataType::SparseFloatVector => "sparse_float_vector",
            DataType::Int8Vector => "int8_vector",
            DataType::Double => "double_data",
            DataType::Float => "float_data",
            DataType::Int64 => "long_data",
            DataType::Int32 | DataType::Int16 | DataType::Int8 => "int_data",
            DataType::Bool => "bool_data",
            DataType::VarChar | DataType::String | DataType::Text => "string_data",
            DataType::Array => "array_data",
            DataType::Json => "json_data",
            DataType::Geometry => "geometry_wkt_data",
            DataType::Timestamptz => "timestamptz_data",
            DataType::ArrayOfVector => "vector_array",
            DataType::ArrayOfStruct => "struct_arrays",
            DataType::None | DataType::Struct => return None,
        };
        Some(key)
    }

    pub fn container(self) -> FieldContainer {
        if self == DataType::ArrayOfStruct || self == DataType::Struct {
            FieldContainer::StructArrays
        } else if self.is_vector() || self == DataType::ArrayOfVector {
            FieldContainer::Vectors
        } else {
            FieldContainer::Scalars
        }
    }

    /// Placeholder type used when this field is the target of a search.
    /// `emb_list` marks vector members of a struct array.
    pub fn placeholder_type(self, emb_list: bool, function_output: bool) -> PlaceholderType {
        match (self, emb_list) {
            (DataType::SparseFloatVector, _) if function_output => PlaceholderType::VarChar,
            (DataType::FloatVector, false) => PlaceholderType::FloatVector,
            (DataType::FloatVector, true) => PlaceholderType::EmbListFloatVector,
            (DataType::BinaryVector, false) => PlaceholderType::BinaryVector,
            (DataType::BinaryVector, true) => PlaceholderType::EmbListBinaryVector,
            (DataType::Float16Vector, false) => PlaceholderType::Float16Vector,
            (DataType::Float16Vector, true) => PlaceholderType::EmbListFloat16Vector,
            (DataType::BFloat16Vector, false) => PlaceholderType::BFloat16Vector,
            (DataType::BFloat16Vector, true) => PlaceholderType::EmbListBFloat16Vector,
            (DataType::Int8Vector, false) => PlaceholderType::Int8Vector,
            (DataType::Int8Vector, true) => PlaceholderType::EmbListInt8Vector,
            (DataType::SparseFloatVector, false) => PlaceholderType::SparseFloatVector,
            (DataType::SparseFloatVector, true) => PlaceholderType::EmbListSparseFloatVector,
            (DataType::Int64, _) => PlaceholderType::Int64,
            (DataType::VarChar, _) => PlaceholderType::VarChar,
            _ => PlaceholderType::None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<i32>() {
            return DataType::from_code(code).ok_or_else(|| format!("Unsupported data type code: {}", s));
        }
        DataType::from_name(s).ok_or_else(|| format!("Unsupported data type: {}", s))
    }
}

/// Which `FieldData` oneof branch carries a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldContainer {
    Scalars,
    Vectors,
    StructArrays,
}

/// `common.PlaceholderType` wire tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PlaceholderType {
    None = 0,
    Int64 = 5,
    VarChar = 21,
    BinaryVector = 100,
    FloatVector = 101,
    Float16Vector = 102,
    BFloat16Vector = 103,
    SparseFloatVector = 104,
    Int8Vector = 105,
    EmbListBinaryVector = 300,
    EmbListFloatVector = 301,
    EmbListFloat16Vector = 302,
    EmbListBFloat16Vector = 303,
    EmbListSparseFloatVector = 304,
    EmbListInt8Vector = 305,
}

impl PlaceholderType {
    pub fn is_emb_list(self) -> bool {
        (self as i32) >= 300
    }

    /// Vector encoding carried by this placeholder, if any.
    pub fn vector_kind(self) -> Option<VectorKind> {
        match self {
            PlaceholderType::FloatVector | PlaceholderType::EmbListFloatVector =>
                Some(VectorKind::Float),
            PlaceholderType::BinaryVector | PlaceholderType::EmbListBinaryVector =>
                Some(VectorKind::Binary),
            PlaceholderType::Float16Vector | PlaceholderType::EmbListFloat16Vector =>
                Some(VectorKind::Float16),
            PlaceholderType::BFloat16Vector | PlaceholderType::EmbListBFloat16Vector =>
                Some(VectorKind::BFloat16),
            PlaceholderType::Int8Vector | PlaceholderType::EmbListInt8Vector =>
                Some(VectorKind::Int8),
            PlaceholderType::SparseFloatVector | PlaceholderType::EmbListSparseFloatVector =>
                Some(VectorKind::Sparse),
            _ => None,
        }
    }
}

/// `schema.FunctionType` wire tags.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    ::prost::Enumeration,
    Serialize,
    Deserialize
)]
#[repr(i32)]
pub enum FunctionType {
    Unknown = 0,
    #[serde(rename = "BM25")]
    Bm25 = 1,
    TextEmbedding = 2,
    Rerank = 3,
}

/// `common.ConsistencyLevel` wire tags.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    ::prost::Enumeration,
    Serialize,
    Deserialize
)]
#[repr(i32)]
pub enum ConsistencyLevel {
    Strong = 0,
    Session = 1,
    Bounded = 2,
    Eventually = 3,
    Customized = 4,
}

impl FromStr for ConsistencyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "strong" => Ok(ConsistencyLevel::Strong),
            "session" => Ok(ConsistencyLevel::Session),
            "bounded" => Ok(ConsistencyLevel::Bounded),
            "eventually" => Ok(ConsistencyLevel::Eventually),
            "customized" => Ok(ConsistencyLevel::Customized),
            _ => Err(format!("Unsupported consistency level: {}", s)),
        }
    }
}

/// `common.DslType` wire tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum DslType {
    Dsl = 0,
    BoolExprV1 = 1,
}

/// Subset of `common.ErrorCode` the core reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ErrorCode {
    Success = 0,
    UnexpectedError = 1,
    CollectionNotExists = 4,
    IllegalArgument = 5,
    IllegalDimension = 7,
    SchemaMismatch = 62,
}

/// Closed set of vector encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VectorKind {
    Float,
    Binary,
    Float16,
    BFloat16,
    Int8,
    Sparse,
}

impl VectorKind {
    pub fn from_data_type(data_type: DataType) -> Option<VectorKind> {
        match data_type {
            DataType::FloatVector => Some(VectorKind::Float),
            DataType::BinaryVector => Some(VectorKind::Binary),
            DataType::Float16Vector => Some(VectorKind::Float16),
            DataType::BFloat16Vector => Some(VectorKind::BFloat16),
            DataType::Int8Vector => Some(VectorKind::Int8),
            DataType::SparseFloatVector => Some(VectorKind::Sparse),
            _ => None,
        }
    }

    pub fn data_type(self) -> DataType {
        match self {
            VectorKind::Float => DataType::FloatVector,
            VectorKind::Binary => DataType::BinaryVector,
            VectorKind::Float16 => DataType::Float16Vector,
            VectorKind::BFloat16 => DataType::BFloat16Vector,
            VectorKind::Int8 => DataType::Int8Vector,
            VectorKind::Sparse => DataType::SparseFloatVector,
        }
    }

    /// Encoded bytes per row for a declared dimension. Sparse has none.
    pub fn bytes_per_row(self, dim: usize) -> Option<usize> {
        match self {
            VectorKind::Float => Some(dim * 4),
            VectorKind::Binary => Some(dim / 8),
            VectorKind::Float16 | VectorKind::BFloat16 => Some(dim * 2),
            VectorKind::Int8 => Some(dim),
            VectorKind::Sparse => None,
        }
    }

    /// Element count per row as it appears in the wire buffer.
    pub fn elements_per_row(self, dim: usize) -> usize {
        match self {
            VectorKind::Binary => dim / 8,
            VectorKind::Float16 | VectorKind::BFloat16 => dim * 2,
            _ => dim,
        }
    }
}

/// Scalar element encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int8,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    VarChar,
    Json,
    Geometry,
    Timestamptz,
}

impl ScalarKind {
    pub fn from_data_type(data_type: DataType) -> Option<ScalarKind> {
        match data_type {
            DataType::Bool => Some(ScalarKind::Bool),
            DataType::Int8 => Some(ScalarKind::Int8),
            DataType::Int16 => Some(ScalarKind::Int16),
            DataType::Int32 => Some(ScalarKind::Int32),
            DataType::Int64 => Some(ScalarKind::Int64),
            DataType::Float => Some(ScalarKind::Float),
            DataType::Double => Some(ScalarKind::Double),
            DataType::VarChar | DataType::String | DataType::Text => Some(ScalarKind::VarChar),
            DataType::Json => Some(ScalarKind::Json),
            DataType::Geometry => Some(ScalarKind::Geometry),
            DataType::Timestamptz => Some(ScalarKind::Timestamptz),
            _ => None,
        }
    }

    pub fn data_type(self) -> DataType {
        match self {
            ScalarKind::Bool => DataType::Bool,
            ScalarKind::Int8 => DataType::Int8,
            ScalarKind::Int16 => DataType::Int16,
            ScalarKind::Int32 => DataType::Int32,
            ScalarKind::Int64 => DataType::Int64,
            ScalarKind::Float => DataType::Float,
            ScalarKind::Double => DataType::Double,
            ScalarKind::VarChar => DataType::VarChar,
            ScalarKind::Json => DataType::Json,
            ScalarKind::Geometry => DataType::Geometry,
            ScalarKind::Timestamptz => DataType::Timestamptz,
        }
    }

    /// Inclusive range accepted by the narrow integer kinds.
    pub fn int_range(self) -> Option<(i64, i64)> {
        match self {
            ScalarKind::Int8 => Some((i8::MIN as i64, i8::MAX as i64)),
            ScalarKind::Int16 => Some((i16::MIN as i64, i16::MAX as i64)),
            ScalarKind::Int32 => Some((i32::MIN as i64, i32::MAX as i64)),
            _ => None,
        }
    }
}

/// Codec selected once per field when its descriptor is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCodec {
    Scalar(ScalarKind),
    Vector(VectorKind),
    /// Array of scalar elements.
    Array(ScalarKind),
    /// Vector member of a struct array: one list of vectors per row.
    VectorArray(VectorKind),
    StructArray,
}

impl FieldCodec {
    /// Codec for a top-level field.
    pub fn resolve(data_type: DataType, element_type: Option<DataType>) -> Result<FieldCodec, String> {
        if let Some(kind) = VectorKind::from_data_type(data_type) {
            return Ok(FieldCodec::Vector(kind));
        }
        if let Some(kind) = ScalarKind::from_data_type(data_type) {
            return Ok(FieldCodec::Scalar(kind));
        }
        match (data_type, element_type) {
            (DataType::Array, Some(DataType::Struct)) | (DataType::ArrayOfStruct, _) =>
                Ok(FieldCodec::StructArray),
            (DataType::Array, Some(element)) =>
                ScalarKind::from_data_type(element)
                    .filter(|k| *k != ScalarKind::Json)
                    .map(FieldCodec::Array)
                    .ok_or_else(|| format!("Unsupported array element type: {}", element)),
            (DataType::ArrayOfVector, Some(element)) =>
                VectorKind::from_data_type(element)
                    .map(FieldCodec::VectorArray)
                    .ok_or_else(|| format!("Unsupported vector array element type: {}", element)),
            (DataType::Array, None) | (DataType::ArrayOfVector, None) =>
                Err(format!("{} field requires an element type", data_type)),
            _ => Err(format!("Unsupported field type: {}", data_type)),
        }
    }

    /// Codec for a member of a struct array, whose declared type is the element type.
    pub fn for_struct_member(element_type: DataType) -> Result<FieldCodec, String> {
        if let Some(kind) = VectorKind::from_data_type(element_type) {
            return Ok(FieldCodec::VectorArray(kind));
        }
        ScalarKind::from_data_type(element_type)
            .filter(|k| *k != ScalarKind::Json)
            .map(FieldCodec::Array)
            .ok_or_else(|| format!("Unsupported struct member type: {}", element_type))
    }

    /// Wire discriminant written into `FieldData.type`.
    pub fn wire_type(self) -> DataType {
        match self {
            FieldCodec::Scalar(kind) => kind.data_type(),
            FieldCodec::Vector(kind) => kind.data_type(),
            FieldCodec::Array(_) => DataType::Array,
            FieldCodec::VectorArray(_) => DataType::ArrayOfVector,
            FieldCodec::StructArray => DataType::ArrayOfStruct,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_keys_follow_container_layout() {
        assert_eq!(DataType::Int16.data_key(), Some("int_data"));
        assert_eq!(DataType::Int64.data_key(), Some("long_data"));
        assert_eq!(DataType::ArrayOfVector.data_key(), Some("vector_array"));
        assert_eq!(DataType::Struct.data_key(), None);
    }

    #[test]
    fn names_and_codes_resolve() {
        assert_eq!("FloatVector".parse::<DataType>().unwrap(), DataType::FloatVector);
        assert_eq!("json".parse::<DataType>().unwrap(), DataType::Json);
        assert_eq!("104".parse::<DataType>().unwrap(), DataType::SparseFloatVector);
        assert!("Tensor".parse::<DataType>().is_err());
        assert_eq!(DataType::Json.to_string(), "JSON");
    }

    #[test]
    fn placeholder_types_distinguish_embedding_lists() {
        assert_eq!(
            DataType::FloatVector.placeholder_type(true, false),
            PlaceholderType::EmbListFloatVector
        );
        assert_eq!(
            DataType::SparseFloatVector.placeholder_type(false, true),
            PlaceholderType::VarChar
        );
        assert!(PlaceholderType::EmbListInt8Vector.is_emb_list());
        assert!(!PlaceholderType::Int8Vector.is_emb_list());
    }

    #[test]
    fn codecs_resolve_per_declared_type() {
        assert_eq!(
            FieldCodec::resolve(DataType::Array, Some(DataType::Struct)).unwrap(),
            FieldCodec::StructArray
        );
        assert_eq!(
            FieldCodec::resolve(DataType::Array, Some(DataType::Int32)).unwrap(),
            FieldCodec::Array(ScalarKind::Int32)
        );
        assert!(FieldCodec::resolve(DataType::Array, None).is_err());
        assert_eq!(
            FieldCodec::for_struct_member(DataType::FloatVector).unwrap(),
            FieldCodec::VectorArray(VectorKind::Float)
        );
        assert_eq!(FieldCodec::VectorArray(VectorKind::Float).wire_type(), DataType::ArrayOfVector);
    }

    #[test]
    fn vector_kinds_report_row_width() {
        assert_eq!(VectorKind::Float.bytes_per_row(4), Some(16));
        assert_eq!(VectorKind::Binary.bytes_per_row(16), Some(2));
        assert_eq!(VectorKind::BFloat16.bytes_per_row(4), Some(8));
        assert_eq!(VectorKind::Sparse.bytes_per_row(4), None);
    }
}
