//! Collection-creation schema formatting.
//!
//! Validates field declarations and turns them into the wire
//! `CollectionSchema`. Every check runs before anything is sent, and the
//! field order of the output is the order the write codec follows.

use std::collections::HashSet;

use log::debug;
use prost::Message;
use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };

use crate::error::{ MarshalError, Result };
use crate::proto::{ self, value_field, KeyValuePair, ValueField };
use crate::registry::{ ConsistencyLevel, DataType, FieldCodec, ScalarKind, VectorKind };
use crate::schema::{ CollectionSchema, FunctionDescriptor };
use crate::value::param_string;

/// One field as declared by the caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldDeclaration {
    pub name: String,
    pub description: String,
    pub data_type: DataType,
    /// Element type of an `Array`; `Struct` marks a struct array.
    pub element_type: Option<DataType>,
    pub dim: Option<usize>,
    pub max_length: Option<usize>,
    pub max_capacity: Option<usize>,
    pub is_primary_key: bool,
    pub auto_id: bool,
    pub is_partition_key: bool,
    pub is_clustering_key: bool,
    pub is_function_output: bool,
    pub nullable: bool,
    pub default_value: Option<Value>,
    /// Extra type parameters passed through as strings (`enable_match`,
    /// `analyzer_params`, `mmap.enabled` ...).
    pub type_params: Map<String, Value>,
    /// Members of a struct array.
    pub fields: Vec<FieldDeclaration>,
}

impl FieldDeclaration {
    pub fn new<S: Into<String>>(name: S, data_type: DataType) -> Self {
        FieldDeclaration {
            name: name.into(),
            data_type,
            ..Default::default()
        }
    }

    pub fn primary_key(mut self, auto_id: bool) -> Self {
        self.is_primary_key = true;
        self.auto_id = auto_id;
        self
    }

    pub fn dim(mut self, dim: usize) -> Self {
        self.dim = Some(dim);
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn array(mut self, element_type: DataType, max_capacity: usize) -> Self {
        self.element_type = Some(element_type);
        self.max_capacity = Some(max_capacity);
        self
    }

    /// A struct array holding up to `max_capacity` elements of `members`.
    pub fn struct_array(mut self, members: Vec<FieldDeclaration>, max_capacity: usize) -> Self {
        self.data_type = DataType::Array;
        self.element_type = Some(DataType::Struct);
        self.max_capacity = Some(max_capacity);
        self.fields = members;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn default_value<V: Into<Value>>(mut self, value: V) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn type_param<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.type_params.insert(key.into(), value.into());
        self
    }

    fn is_struct_array(&self) -> bool {
        (self.data_type == DataType::Array && self.element_type == Some(DataType::Struct)) ||
            self.data_type == DataType::ArrayOfStruct
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionDeclaration {
    pub name: String,
    pub description: String,
    pub fields: Vec<FieldDeclaration>,
    pub functions: Vec<FunctionDescriptor>,
    pub enable_dynamic_field: bool,
    /// Marks the named field as partition key.
    pub partition_key_field: Option<String>,
    /// Marks the named field as clustering key.
    pub clustering_key_field: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FormattedSchema {
    pub schema: proto::CollectionSchema,
    /// `schema` encoded, as carried by a create-collection request.
    pub descriptor: Vec<u8>,
    /// Fields the server computes; never part of a write.
    pub function_output_fields: Vec<String>,
}

impl FormattedSchema {
    /// The schema as the write codec will see it after describe.
    pub fn collection_schema(&self, consistency_level: ConsistencyLevel) -> Result<CollectionSchema> {
        CollectionSchema::from_proto(&self.schema, consistency_level)
    }
}

/// Validates a collection declaration and formats it for the wire.
pub fn format_collection_schema(declaration: &CollectionDeclaration) -> Result<FormattedSchema> {
    if declaration.name.trim().is_empty() {
        return Err(MarshalError::schema("Collection name must not be empty"));
    }
    check_names(&declaration.fields)?;
    for key_field in [&declaration.partition_key_field, &declaration.clustering_key_field].into_iter().flatten() {
        if !declaration.fields.iter().any(|f| &f.name == key_field) {
            return Err(MarshalError::schema(format!("Key field '{}' is not declared", key_field)));
        }
    }

    let declared: HashSet<&str> = declaration.fields
        .iter()
        .map(|f| f.name.as_str())
        .collect();
    let mut function_output_fields = Vec::new();
    for function in &declaration.functions {
        for name in function.input_field_names.iter().chain(&function.output_field_names) {
            if !declared.contains(name.as_str()) {
                return Err(
                    MarshalError::schema(
                        format!("Function '{}' references undeclared field '{}'", function.name, name)
                    )
                );
            }
        }
        function_output_fields.extend(function.output_field_names.iter().cloned());
    }

    let primary_keys: Vec<&FieldDeclaration> = declaration.fields
        .iter()
        .filter(|f| f.is_primary_key)
        .collect();
    match primary_keys.as_slice() {
        [] => {
            return Err(MarshalError::schema("Collection requires a primary key field"));
        }
        [pk] => {
            if !matches!(pk.data_type, DataType::Int64 | DataType::VarChar) {
                return Err(
                    MarshalError::schema(format!("Primary key '{}' must be Int64 or VarChar, got {}", pk.name, pk.data_type))
                );
            }
            if pk.nullable {
                return Err(MarshalError::schema(format!("Primary key '{}' cannot be nullable", pk.name)));
            }
        }
        several => {
            let names: Vec<&str> = several
                .iter()
                .map(|f| f.name.as_str())
                .collect();
            return Err(MarshalError::schema(format!("Only one primary key is allowed, found {}", names.join(", "))));
        }
    }

    let mut fields = Vec::new();
    let mut struct_array_fields = Vec::new();
    for field in &declaration.fields {
        if field.is_struct_array() {
            struct_array_fields.push(format_struct_array(field)?);
        } else {
            let mut wire = format_field(field)?;
            wire.is_partition_key |= declaration.partition_key_field.as_deref() == Some(field.name.as_str());
            wire.is_clustering_key |= declaration.clustering_key_field.as_deref() == Some(field.name.as_str());
            wire.is_function_output |= function_output_fields.contains(&field.name);
            fields.push(wire);
        }
    }

    let schema = proto::CollectionSchema {
        name: declaration.name.clone(),
        description: declaration.description.clone(),
        fields,
        enable_dynamic_field: declaration.enable_dynamic_field,
        functions: declaration.functions
            .iter()
            .map(FunctionDescriptor::to_proto)
            .collect(),
        struct_array_fields,
        ..Default::default()
    };
    let descriptor = schema.encode_to_vec();
    debug!(
        "Formatted schema '{}': {} fields, {} struct arrays, {} functions",
        schema.name,
        schema.fields.len(),
        schema.struct_array_fields.len(),
        schema.functions.len()
    );
    Ok(FormattedSchema {
        schema,
        descriptor,
        function_output_fields,
    })
}

fn check_names(fields: &[FieldDeclaration]) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if field.name.trim().is_empty() {
            return Err(MarshalError::schema("Field name must not be empty"));
        }
        if !seen.insert(field.name.as_str()) {
            return Err(MarshalError::schema(format!("Duplicate field name '{}'", field.name)));
        }
    }
    Ok(())
}

/// Formats one flat field after checking its type attributes.
fn format_field(field: &FieldDeclaration) -> Result<proto::FieldSchema> {
    let codec = FieldCodec::resolve(field.data_type, field.element_type).map_err(|e|
        MarshalError::schema(format!("Field '{}': {}", field.name, e))
    )?;
    match codec {
        FieldCodec::Vector(kind) => check_dim(&field.name, kind, field.dim)?,
        FieldCodec::Scalar(ScalarKind::VarChar) => check_max_length(&field.name, field.max_length)?,
        FieldCodec::Array(element) => {
            check_capacity(&field.name, field.max_capacity)?;
            if element == ScalarKind::VarChar {
                check_max_length(&field.name, field.max_length)?;
            }
        }
        FieldCodec::VectorArray(kind) => {
            check_capacity(&field.name, field.max_capacity)?;
            check_dim(&field.name, kind, field.dim)?;
        }
        _ => {}
    }

    let default_value = match &field.default_value {
        Some(value) => Some(default_to_proto(field, value)?),
        None => None,
    };

    Ok(proto::FieldSchema {
        name: field.name.clone(),
        description: field.description.clone(),
        is_primary_key: field.is_primary_key,
        data_type: field.data_type as i32,
        type_params: type_params(field),
        auto_id: field.auto_id,
        element_type: field.element_type.map_or(0, |t| t as i32),
        default_value,
        is_partition_key: field.is_partition_key,
        is_clustering_key: field.is_clustering_key,
        nullable: field.nullable,
        is_function_output: field.is_function_output,
        ..Default::default()
    })
}

/// Members become `Array` or `ArrayOfVector` columns carrying the
/// container's capacity.
fn format_struct_array(field: &FieldDeclaration) -> Result<proto::StructArrayFieldSchema> {
    if field.fields.is_empty() {
        return Err(MarshalError::schema(format!("Struct array '{}' declares no members", field.name)));
    }
    check_capacity(&field.name, field.max_capacity)?;
    check_names(&field.fields)?;
    let mut members = Vec::with_capacity(field.fields.len());
    for member in &field.fields {
        if member.is_primary_key || member.is_struct_array() {
            return Err(
                MarshalError::schema(
                    format!("Struct member '{}[{}]' must be a plain scalar or vector", field.name, member.name)
                )
            );
        }
        let mut flattened = member.clone();
        flattened.element_type = Some(member.data_type);
        flattened.data_type = if member.data_type.is_vector() { DataType::ArrayOfVector } else { DataType::Array };
        flattened.max_capacity = field.max_capacity;
        let formatted = format_field(&flattened).map_err(|e| match e {
            MarshalError::Schema(reason) =>
                MarshalError::schema(format!("{} (in struct '{}')", reason, field.name)),
            other => other,
        })?;
        members.push(formatted);
    }
    Ok(proto::StructArrayFieldSchema {
        name: field.name.clone(),
        description: field.description.clone(),
        fields: members,
        ..Default::default()
    })
}

fn check_dim(name: &str, kind: VectorKind, dim: Option<usize>) -> Result<()> {
    if kind == VectorKind::Sparse {
        return Ok(());
    }
    match dim {
        Some(d) if d > 0 => {
            if kind == VectorKind::Binary && d % 8 != 0 {
                return Err(MarshalError::schema(format!("Binary vector '{}' dimension {} is not a multiple of 8", name, d)));
            }
            Ok(())
        }
        _ => Err(MarshalError::schema(format!("Vector field '{}' requires a positive dimension", name))),
    }
}

fn check_max_length(name: &str, max_length: Option<usize>) -> Result<()> {
    match max_length {
        Some(n) if n > 0 => Ok(()),
        _ => Err(MarshalError::schema(format!("VarChar field '{}' requires max_length", name))),
    }
}

fn check_capacity(name: &str, max_capacity: Option<usize>) -> Result<()> {
    match max_capacity {
        Some(n) if n > 0 => Ok(()),
        _ => Err(MarshalError::schema(format!("Array field '{}' requires max_capacity", name))),
    }
}

/// `dim`, `max_length` and `max_capacity` first, then the extras in key order.
fn type_params(field: &FieldDeclaration) -> Vec<KeyValuePair> {
    let mut params = Vec::new();
    if let Some(dim) = field.dim {
        params.push(KeyValuePair::new("dim", dim.to_string()));
    }
    if let Some(max_length) = field.max_length {
        params.push(KeyValuePair::new("max_length", max_length.to_string()));
    }
    if let Some(max_capacity) = field.max_capacity {
        params.push(KeyValuePair::new("max_capacity", max_capacity.to_string()));
    }
    for (key, value) in &field.type_params {
        if matches!(key.as_str(), "dim" | "max_length" | "max_capacity") {
            continue;
        }
        params.push(KeyValuePair::new(key.clone(), param_string(value)));
    }
    params
}

/// Microsecond values below this are taken as milliseconds.
const TIMESTAMP_MILLIS_LIMIT: i64 = 1_000_000_000_000;

fn default_to_proto(field: &FieldDeclaration, value: &Value) -> Result<ValueField> {
    use value_field::Data;
    let bad = || {
        MarshalError::schema(
            format!("Default value {} does not fit field '{}' of type {}", value, field.name, field.data_type)
        )
    };
    let data = match field.data_type {
        DataType::Bool => Data::BoolData(value.as_bool().ok_or_else(bad)?),
        DataType::Int8 | DataType::Int16 | DataType::Int32 => {
            let kind = ScalarKind::from_data_type(field.data_type).ok_or_else(bad)?;
            let v = value.as_i64().ok_or_else(bad)?;
            if let Some((min, max)) = kind.int_range() {
                if v < min || v > max {
                    return Err(bad());
                }
            }
            Data::IntData(v as i32)
        }
        DataType::Int64 => Data::LongData(value.as_i64().ok_or_else(bad)?),
        DataType::Float => Data::FloatData(value.as_f64().ok_or_else(bad)? as f32),
        DataType::Double => Data::DoubleData(value.as_f64().ok_or_else(bad)?),
        DataType::VarChar | DataType::String | DataType::Text => {
            let s = value.as_str().ok_or_else(bad)?;
            if let Some(max) = field.max_length {
                if s.len() > max {
                    return Err(bad());
                }
            }
            Data::StringData(s.to_string())
        }
        DataType::Json => Data::BytesData(value.to_string().into_bytes()),
        DataType::Timestamptz => {
            let v = value.as_i64().ok_or_else(bad)?;
            Data::TimestamptzData(if v < TIMESTAMP_MILLIS_LIMIT { v * 1000 } else { v })
        }
        _ => {
            return Err(bad());
        }
    };
    Ok(ValueField { data: Some(data) })
}
