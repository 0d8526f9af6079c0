//! Row-to-column transposition for insert and upsert payloads.

use std::borrow::Cow;
use std::collections::HashSet;

use log::debug;

use super::bytes::{ pack_vector, PackedVector, Transformers };
use super::dynamic::partition;
use crate::error::{ MarshalError, Result };
use crate::proto::{ self, field_data, scalar_field, vector_field, FieldData, ScalarField, VectorField };
use crate::registry::{ FieldCodec, ScalarKind, VectorKind };
use crate::schema::{ CollectionSchema, FieldDescriptor };
use crate::value::{ FieldValue, RowData };

/// Builds one column per writable field of `schema`, in schema order, plus
/// the dynamic JSON column when the collection has one.
pub fn build_columns(
    schema: &CollectionSchema,
    rows: &[RowData],
    transformers: &Transformers
) -> Result<Vec<FieldData>> {
    let synthetic_dynamic = schema.dynamic_field
        .as_deref()
        .filter(|name| schema.field(name).is_none())
        .map(FieldDescriptor::dynamic);

    let targets: Vec<&FieldDescriptor> = schema.fields
        .iter()
        .filter(|f| !f.is_server_generated())
        .filter(|f| !f.is_dynamic || schema.dynamic_field.as_deref() == Some(f.name.as_str()))
        .chain(synthetic_dynamic.iter())
        .collect();

    let mut excluded: HashSet<&str> = schema.function_output_fields();
    excluded.extend(
        schema.fields
            .iter()
            .filter(|f| f.is_server_generated())
            .map(|f| f.name.as_str())
    );
    let declared: HashSet<&str> = targets
        .iter()
        .filter(|f| !f.is_dynamic)
        .map(|f| f.name.as_str())
        .collect();

    let mut builders: Vec<ColumnBuilder> = targets
        .iter()
        .map(|f| ColumnBuilder::new(f, rows.len()))
        .collect();

    for (row_index, row) in rows.iter().enumerate() {
        let row: Cow<RowData> = match schema.dynamic_field.as_deref() {
            Some(dynamic_field) => Cow::Owned(partition(row, &declared, dynamic_field, &excluded)),
            None => {
                if let Some(unknown) = row.keys().find(|k| !declared.contains(k.as_str()) && !excluded.contains(k.as_str())) {
                    return Err(MarshalError::UnknownField { row: row_index, field: unknown.clone() });
                }
                Cow::Borrowed(row)
            }
        };
        for builder in builders.iter_mut() {
            let field = builder.field;
            builder.push(row.get(field.name.as_str()), row_index, transformers)?;
        }
    }

    let columns: Vec<FieldData> = builders.into_iter().map(ColumnBuilder::finish).collect();
    debug!("Built {} columns for {} rows of '{}'", columns.len(), rows.len(), schema.name);
    Ok(columns)
}

/// Typed accumulator for one column.
enum Column<'a> {
    Bool(Vec<bool>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Str(Vec<String>),
    Json(Vec<Vec<u8>>),
    GeometryWkt(Vec<String>),
    Timestamptz(Vec<i64>),
    FloatVector(Vec<f32>),
    Packed(Vec<u8>),
    Sparse {
        contents: Vec<Vec<u8>>,
        dim: u64,
    },
    Array(Vec<ScalarField>),
    VectorArray(Vec<VectorField>),
    Struct(Vec<ColumnBuilder<'a>>),
}

struct ColumnBuilder<'a> {
    field: &'a FieldDescriptor,
    column: Column<'a>,
    valid: Vec<bool>,
}

impl<'a> ColumnBuilder<'a> {
    fn new(field: &'a FieldDescriptor, capacity: usize) -> Self {
        let column = match field.codec {
            FieldCodec::Scalar(kind) =>
                match kind {
                    ScalarKind::Bool => Column::Bool(Vec::with_capacity(capacity)),
                    ScalarKind::Int8 | ScalarKind::Int16 | ScalarKind::Int32 =>
                        Column::Int(Vec::with_capacity(capacity)),
                    ScalarKind::Int64 => Column::Long(Vec::with_capacity(capacity)),
                    ScalarKind::Float => Column::Float(Vec::with_capacity(capacity)),
                    ScalarKind::Double => Column::Double(Vec::with_capacity(capacity)),
                    ScalarKind::VarChar => Column::Str(Vec::with_capacity(capacity)),
                    ScalarKind::Json => Column::Json(Vec::with_capacity(capacity)),
                    ScalarKind::Geometry => Column::GeometryWkt(Vec::with_capacity(capacity)),
                    ScalarKind::Timestamptz => Column::Timestamptz(Vec::with_capacity(capacity)),
                }
            FieldCodec::Vector(VectorKind::Float) => Column::FloatVector(Vec::new()),
            FieldCodec::Vector(VectorKind::Sparse) =>
                Column::Sparse {
                    contents: Vec::with_capacity(capacity),
                    dim: 0,
                },
            FieldCodec::Vector(_) => Column::Packed(Vec::new()),
            FieldCodec::Array(_) => Column::Array(Vec::with_capacity(capacity)),
            FieldCodec::VectorArray(_) => Column::VectorArray(Vec::with_capacity(capacity)),
            FieldCodec::StructArray =>
                Column::Struct(
                    field.fields
                        .iter()
                        .map(|m| ColumnBuilder::new(m, capacity))
                        .collect()
                ),
        };
        ColumnBuilder { field, column, valid: Vec::with_capacity(capacity) }
    }

    fn name(&self) -> &str {
        &self.field.name
    }

    fn push(&mut self, value: Option<&FieldValue>, row: usize, transformers: &Transformers) -> Result<()> {
        match value.filter(|v| !v.is_null()) {
            Some(value) => {
                self.valid.push(true);
                self.push_value(value, row, transformers)
            }
            None => self.push_null(row),
        }
    }

    fn push_null(&mut self, row: usize) -> Result<()> {
        let json = matches!(self.field.codec, FieldCodec::Scalar(ScalarKind::Json));
        if !json && !self.field.tracks_validity() {
            return Err(MarshalError::MissingField { row, field: self.field.name.clone() });
        }
        self.valid.push(false);
        match &mut self.column {
            Column::Bool(v) => v.push(false),
            Column::Int(v) => v.push(0),
            Column::Long(v) => v.push(0),
            Column::Float(v) => v.push(0.0),
            Column::Double(v) => v.push(0.0),
            Column::Str(v) => v.push(String::new()),
            Column::Json(v) => v.push(Vec::new()),
            Column::GeometryWkt(v) => v.push(String::new()),
            Column::Timestamptz(v) => v.push(0),
            // Null vectors occupy no space in the packed buffer.
            Column::FloatVector(_) | Column::Packed(_) | Column::Sparse { .. } => {}
            Column::Array(v) => {
                if let FieldCodec::Array(kind) = self.field.codec {
                    v.push(empty_scalar(kind));
                }
            }
            Column::VectorArray(v) => v.push(VectorField::default()),
            Column::Struct(members) => {
                for member in members.iter_mut() {
                    member.push_elements(&[], row)?;
                }
            }
        }
        Ok(())
    }

    fn push_value(&mut self, value: &FieldValue, row: usize, transformers: &Transformers) -> Result<()> {
        let field = self.field;
        match field.codec {
            FieldCodec::VectorArray(_) => {
                let items = list_items(value).ok_or_else(||
                    MarshalError::invalid_value(&field.name, row, "expected a list of vectors")
                )?;
                return self.push_vectors(&items, row, transformers);
            }
            FieldCodec::StructArray => {
                let elements = struct_elements(value).ok_or_else(||
                    MarshalError::invalid_value(&field.name, row, "expected an array of objects")
                )?;
                check_capacity(field, row, elements.len())?;
                return self.push_struct(&elements, row, transformers);
            }
            _ => {}
        }
        match &mut self.column {
            Column::Bool(v) => v.push(to_bool(field, row, value)?),
            Column::Int(v) => v.push(to_int(field, row, value)? as i32),
            Column::Long(v) => v.push(to_int(field, row, value)?),
            Column::Float(v) => v.push(to_f64(field, row, value)? as f32),
            Column::Double(v) => v.push(to_f64(field, row, value)?),
            Column::Str(v) => v.push(to_string(field, row, value)?),
            Column::Json(v) => v.push(serde_json::to_vec(&value.to_json())?),
            Column::GeometryWkt(v) => v.push(to_string(field, row, value)?),
            Column::Timestamptz(v) => v.push(to_int(field, row, value)?),
            Column::FloatVector(buffer) => {
                match pack_checked(field, row, value, transformers)? {
                    PackedVector::Floats(values) => buffer.extend_from_slice(&values),
                    _ => {
                        return Err(MarshalError::invalid_value(&field.name, row, "expected float values"));
                    }
                }
            }
            Column::Packed(buffer) => {
                match pack_checked(field, row, value, transformers)? {
                    PackedVector::Bytes(bytes) => buffer.extend_from_slice(&bytes),
                    _ => {
                        return Err(MarshalError::invalid_value(&field.name, row, "expected packed bytes"));
                    }
                }
            }
            Column::Sparse { contents, dim } => {
                match pack_checked(field, row, value, transformers)? {
                    PackedVector::Sparse(sparse) => {
                        *dim = (*dim).max(sparse.dim());
                        contents.push(sparse.to_bytes());
                    }
                    _ => {
                        return Err(MarshalError::invalid_value(&field.name, row, "expected a sparse vector"));
                    }
                }
            }
            Column::Array(v) => {
                let items = list_items(value).ok_or_else(||
                    MarshalError::invalid_value(&field.name, row, "expected an array")
                )?;
                check_capacity(field, row, items.len())?;
                if let FieldCodec::Array(kind) = field.codec {
                    v.push(scalar_array(field, row, kind, &items)?);
                }
            }
            Column::VectorArray(_) | Column::Struct(_) => {}
        }
        Ok(())
    }

    /// Struct cell: validates element keys, then hands each member the
    /// values it owns across all elements of this row.
    fn push_struct(&mut self, elements: &[RowData], row: usize, transformers: &Transformers) -> Result<()> {
        let field = self.field;
        for (index, element) in elements.iter().enumerate() {
            if let Some(unknown) = element.keys().find(|k| field.member(k).is_none()) {
                return Err(
                    MarshalError::invalid_value(
                        &field.name,
                        row,
                        format!("field '{}' does not exist in struct at index {}", unknown, index)
                    )
                );
            }
        }
        if let Column::Struct(members) = &mut self.column {
            for member in members.iter_mut() {
                let mut values = Vec::with_capacity(elements.len());
                for (index, element) in elements.iter().enumerate() {
                    match element.get(member.name()).filter(|v| !v.is_null()) {
                        Some(value) => values.push(value.clone()),
                        None => {
                            return Err(
                                MarshalError::invalid_value(
                                    &field.name,
                                    row,
                                    format!("field '{}' is missing in struct at index {}", member.name(), index)
                                )
                            );
                        }
                    }
                }
                member.valid.push(true);
                match member.field.codec {
                    FieldCodec::VectorArray(_) => member.push_vectors(&values, row, transformers)?,
                    _ => member.push_elements(&values, row)?,
                }
            }
        }
        Ok(())
    }

    /// Scalar member of a struct, or an empty slot for a null struct cell.
    fn push_elements(&mut self, values: &[FieldValue], row: usize) -> Result<()> {
        let field = self.field;
        match (&mut self.column, field.codec) {
            (Column::Array(v), FieldCodec::Array(kind)) => v.push(scalar_array(field, row, kind, values)?),
            (Column::VectorArray(v), _) if values.is_empty() => v.push(VectorField::default()),
            _ => {
                return Err(MarshalError::invalid_value(&field.name, row, "unsupported struct member"));
            }
        }
        Ok(())
    }

    /// One row of a vector-array column: all vectors concatenated.
    fn push_vectors(&mut self, vectors: &[FieldValue], row: usize, transformers: &Transformers) -> Result<()> {
        let field = self.field;
        let kind = match field.codec {
            FieldCodec::VectorArray(kind) => kind,
            _ => {
                return Err(MarshalError::invalid_value(&field.name, row, "not a vector array"));
            }
        };
        let dim = field.dim.unwrap_or(0);
        let mut floats = Vec::new();
        let mut packed = Vec::new();
        let mut sparse = Vec::new();
        for vector in vectors {
            match pack_checked(field, row, vector, transformers)? {
                PackedVector::Floats(values) => floats.extend_from_slice(&values),
                PackedVector::Bytes(bytes) => packed.extend_from_slice(&bytes),
                PackedVector::Sparse(s) => sparse.push(s.to_bytes()),
            }
        }
        let data = match kind {
            VectorKind::Float => vector_field::Data::FloatVector(proto::FloatArray { data: floats }),
            VectorKind::Binary => vector_field::Data::BinaryVector(packed),
            VectorKind::Float16 => vector_field::Data::Float16Vector(packed),
            VectorKind::BFloat16 => vector_field::Data::Bfloat16Vector(packed),
            VectorKind::Int8 => vector_field::Data::Int8Vector(packed),
            VectorKind::Sparse =>
                vector_field::Data::SparseFloatVector(proto::SparseFloatArray {
                    contents: sparse,
                    dim: dim as i64,
                }),
        };
        if let Column::VectorArray(v) = &mut self.column {
            v.push(VectorField { dim: dim as i64, data: Some(data) });
        }
        Ok(())
    }

    fn finish(self) -> FieldData {
        let field = self.field;
        let valid_data = if field.tracks_validity() { self.valid } else { Vec::new() };
        let dim = field.dim.unwrap_or(0) as i64;
        let scalars = |data: scalar_field::Data| {
            Some(field_data::Field::Scalars(ScalarField { data: Some(data) }))
        };
        let vectors = |dim: i64, data: vector_field::Data| {
            Some(field_data::Field::Vectors(VectorField { dim, data: Some(data) }))
        };
        let payload = match self.column {
            Column::Bool(data) => scalars(scalar_field::Data::BoolData(proto::BoolArray { data })),
            Column::Int(data) => scalars(scalar_field::Data::IntData(proto::IntArray { data })),
            Column::Long(data) => scalars(scalar_field::Data::LongData(proto::LongArray { data })),
            Column::Float(data) => scalars(scalar_field::Data::FloatData(proto::FloatArray { data })),
            Column::Double(data) => scalars(scalar_field::Data::DoubleData(proto::DoubleArray { data })),
            Column::Str(data) => scalars(scalar_field::Data::StringData(proto::StringArray { data })),
            Column::Json(data) => scalars(scalar_field::Data::JsonData(proto::JsonArray { data })),
            Column::GeometryWkt(data) =>
                scalars(scalar_field::Data::GeometryWktData(proto::GeometryWktArray { data })),
            Column::Timestamptz(data) =>
                scalars(scalar_field::Data::TimestamptzData(proto::TimestamptzArray { data })),
            Column::FloatVector(data) => vectors(dim, vector_field::Data::FloatVector(proto::FloatArray { data })),
            Column::Packed(data) => {
                let data = match field.codec {
                    FieldCodec::Vector(VectorKind::Binary) => vector_field::Data::BinaryVector(data),
                    FieldCodec::Vector(VectorKind::Float16) => vector_field::Data::Float16Vector(data),
                    FieldCodec::Vector(VectorKind::BFloat16) => vector_field::Data::Bfloat16Vector(data),
                    _ => vector_field::Data::Int8Vector(data),
                };
                vectors(dim, data)
            }
            Column::Sparse { contents, dim } =>
                vectors(
                    dim as i64,
                    vector_field::Data::SparseFloatVector(proto::SparseFloatArray {
                        contents,
                        dim: dim as i64,
                    })
                ),
            Column::Array(data) => {
                let element_type = field.element_type.unwrap_or(field.data_type) as i32;
                scalars(scalar_field::Data::ArrayData(proto::ArrayArray { data, element_type }))
            }
            Column::VectorArray(data) =>
                vectors(
                    dim,
                    vector_field::Data::VectorArray(proto::VectorArray {
                        dim,
                        data,
                        element_type: field.data_type as i32,
                    })
                ),
            Column::Struct(members) =>
                Some(
                    field_data::Field::StructArrays(proto::StructArrayField {
                        fields: members.into_iter().map(ColumnBuilder::finish).collect(),
                    })
                ),
        };
        let wire_type = match field.codec {
            FieldCodec::Scalar(_) | FieldCodec::Vector(_) => field.data_type,
            other => other.wire_type(),
        };
        FieldData {
            r#type: wire_type as i32,
            field_name: field.name.clone(),
            field_id: field.field_id,
            is_dynamic: field.is_dynamic,
            valid_data,
            field: payload,
        }
    }
}

/// Packs a vector value and checks it against the declared dimension.
fn pack_checked(
    field: &FieldDescriptor,
    row: usize,
    value: &FieldValue,
    transformers: &Transformers
) -> Result<PackedVector> {
    let kind = match field.codec {
        FieldCodec::Vector(kind) | FieldCodec::VectorArray(kind) => kind,
        _ => {
            return Err(MarshalError::invalid_value(&field.name, row, "not a vector field"));
        }
    };
    let packed = pack_vector(kind, value, transformers).map_err(|e|
        MarshalError::invalid_value(&field.name, row, e)
    )?;
    if kind != VectorKind::Sparse {
        if let Some(expected) = field.dim {
            let actual = packed.dim(kind);
            if actual != expected {
                return Err(MarshalError::Dimension { field: field.name.clone(), row, expected, actual });
            }
        }
    }
    Ok(packed)
}

fn check_capacity(field: &FieldDescriptor, row: usize, len: usize) -> Result<()> {
    match field.max_capacity {
        Some(cap) if len > cap =>
            Err(MarshalError::invalid_value(&field.name, row, format!("{} elements exceed max_capacity {}", len, cap))),
        _ => Ok(()),
    }
}

fn list_items(value: &FieldValue) -> Option<Vec<FieldValue>> {
    match value {
        FieldValue::Array(items) => Some(items.clone()),
        FieldValue::Json(serde_json::Value::Array(items)) =>
            Some(items.iter().cloned().map(FieldValue::from).collect()),
        FieldValue::FloatVector(v) => Some(v.iter().map(|x| FieldValue::Float(*x as f64)).collect()),
        _ => None,
    }
}

fn struct_elements(value: &FieldValue) -> Option<Vec<RowData>> {
    match value {
        FieldValue::Struct(rows) => Some(rows.clone()),
        other => {
            let items = list_items(other)?;
            items
                .into_iter()
                .map(|item| {
                    match item {
                        FieldValue::Json(serde_json::Value::Object(map)) =>
                            Some(
                                map
                                    .into_iter()
                                    .map(|(k, v)| (k, FieldValue::from(v)))
                                    .collect()
                            ),
                        FieldValue::Struct(mut rows) if rows.len() == 1 => rows.pop(),
                        _ => None,
                    }
                })
                .collect()
        }
    }
}

fn empty_scalar(kind: ScalarKind) -> ScalarField {
    let data = match kind {
        ScalarKind::Bool => scalar_field::Data::BoolData(proto::BoolArray::default()),
        ScalarKind::Int8 | ScalarKind::Int16 | ScalarKind::Int32 =>
            scalar_field::Data::IntData(proto::IntArray::default()),
        ScalarKind::Int64 => scalar_field::Data::LongData(proto::LongArray::default()),
        ScalarKind::Float => scalar_field::Data::FloatData(proto::FloatArray::default()),
        ScalarKind::Double => scalar_field::Data::DoubleData(proto::DoubleArray::default()),
        ScalarKind::VarChar => scalar_field::Data::StringData(proto::StringArray::default()),
        ScalarKind::Json => scalar_field::Data::JsonData(proto::JsonArray::default()),
        ScalarKind::Geometry => scalar_field::Data::GeometryWktData(proto::GeometryWktArray::default()),
        ScalarKind::Timestamptz => scalar_field::Data::TimestamptzData(proto::TimestamptzArray::default()),
    };
    ScalarField { data: Some(data) }
}

/// Typed array cell of `kind` elements.
fn scalar_array(field: &FieldDescriptor, row: usize, kind: ScalarKind, items: &[FieldValue]) -> Result<ScalarField> {
    let data = match kind {
        ScalarKind::Bool =>
            scalar_field::Data::BoolData(proto::BoolArray {
                data: items
                    .iter()
                    .map(|v| to_bool(field, row, v))
                    .collect::<Result<_>>()?,
            }),
        ScalarKind::Int8 | ScalarKind::Int16 | ScalarKind::Int32 => {
            let data = items
                .iter()
                .map(|v| to_int_kind(field, row, v, kind).map(|i| i as i32))
                .collect::<Result<_>>()?;
            scalar_field::Data::IntData(proto::IntArray { data })
        }
        ScalarKind::Int64 | ScalarKind::Timestamptz => {
            let data = items
                .iter()
                .map(|v| to_int_kind(field, row, v, kind))
                .collect::<Result<_>>()?;
            if kind == ScalarKind::Int64 {
                scalar_field::Data::LongData(proto::LongArray { data })
            } else {
                scalar_field::Data::TimestamptzData(proto::TimestamptzArray { data })
            }
        }
        ScalarKind::Float =>
            scalar_field::Data::FloatData(proto::FloatArray {
                data: items
                    .iter()
                    .map(|v| to_f64(field, row, v).map(|f| f as f32))
                    .collect::<Result<_>>()?,
            }),
        ScalarKind::Double =>
            scalar_field::Data::DoubleData(proto::DoubleArray {
                data: items
                    .iter()
                    .map(|v| to_f64(field, row, v))
                    .collect::<Result<_>>()?,
            }),
        ScalarKind::VarChar | ScalarKind::Geometry => {
            let data = items
                .iter()
                .map(|v| to_string(field, row, v))
                .collect::<Result<_>>()?;
            if kind == ScalarKind::VarChar {
                scalar_field::Data::StringData(proto::StringArray { data })
            } else {
                scalar_field::Data::GeometryWktData(proto::GeometryWktArray { data })
            }
        }
        ScalarKind::Json =>
            scalar_field::Data::JsonData(proto::JsonArray {
                data: items
                    .iter()
                    .map(|v| serde_json::to_vec(&v.to_json()).map_err(MarshalError::from))
                    .collect::<Result<_>>()?,
            }),
    };
    Ok(ScalarField { data: Some(data) })
}

fn to_bool(field: &FieldDescriptor, row: usize, value: &FieldValue) -> Result<bool> {
    value.as_bool().ok_or_else(|| MarshalError::invalid_value(&field.name, row, "expected a boolean"))
}

fn to_int(field: &FieldDescriptor, row: usize, value: &FieldValue) -> Result<i64> {
    let kind = match field.codec {
        FieldCodec::Scalar(kind) | FieldCodec::Array(kind) => kind,
        _ => ScalarKind::Int64,
    };
    to_int_kind(field, row, value, kind)
}

fn to_int_kind(field: &FieldDescriptor, row: usize, value: &FieldValue, kind: ScalarKind) -> Result<i64> {
    let parsed = match value {
        FieldValue::Int(v) => Some(*v),
        FieldValue::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
        FieldValue::String(s) if kind == ScalarKind::Int64 => s.trim().parse::<i64>().ok(),
        other => other.as_i64(),
    };
    let v = parsed.ok_or_else(|| MarshalError::invalid_value(&field.name, row, "expected an integer"))?;
    if let Some((min, max)) = kind.int_range() {
        if v < min || v > max {
            return Err(
                MarshalError::invalid_value(&field.name, row, format!("{} is out of range for {:?}", v, kind))
            );
        }
    }
    Ok(v)
}

fn to_f64(field: &FieldDescriptor, row: usize, value: &FieldValue) -> Result<f64> {
    value.as_f64().ok_or_else(|| MarshalError::invalid_value(&field.name, row, "expected a number"))
}

fn to_string(field: &FieldDescriptor, row: usize, value: &FieldValue) -> Result<String> {
    let s = value.as_str().ok_or_else(|| MarshalError::invalid_value(&field.name, row, "expected a string"))?;
    if let Some(max) = field.max_length {
        if s.len() > max {
            return Err(
                MarshalError::invalid_value(&field.name, row, format!("length {} exceeds max_length {}", s.len(), max))
            );
        }
    }
    Ok(s.to_string())
}
