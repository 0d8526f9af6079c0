//! Column-to-row transposition for query and search results.

use log::debug;

use super::bytes::{ bytes_to_i8, Transformers };
use super::dynamic::merge;
use crate::error::{ MarshalError, Result };
use crate::proto::{ field_data, scalar_field, vector_field, FieldData, ScalarField, StructArrayField, VectorField };
use crate::registry::VectorKind;
use crate::value::{ FieldValue, RowData, SparseVector };

/// Decodes all columns and transposes them into rows. Keys of a dynamic
/// column are lifted onto each row and the column itself is dropped.
pub fn parse_columns(columns: &[FieldData], transformers: &Transformers) -> Result<Vec<RowData>> {
    let mut decoded = Vec::with_capacity(columns.len());
    let mut num_rows: Option<usize> = None;
    for column in columns {
        let values = decode_column(column, transformers)?;
        match num_rows {
            Some(n) if n != values.len() => {
                return Err(
                    MarshalError::decode(
                        format!("column '{}' has {} rows, expected {}", column.field_name, values.len(), n)
                    )
                );
            }
            _ => {
                num_rows = Some(values.len());
            }
        }
        decoded.push((column.field_name.as_str(), values));
    }

    let mut rows = vec![RowData::new(); num_rows.unwrap_or(0)];
    for (name, values) in decoded {
        for (row, value) in rows.iter_mut().zip(values) {
            row.insert(name.to_string(), value);
        }
    }
    if let Some(dynamic) = columns.iter().find(|c| c.is_dynamic) {
        rows = rows
            .into_iter()
            .map(|row| merge(row, &dynamic.field_name, false))
            .collect();
    }
    debug!("Parsed {} rows from {} columns", rows.len(), columns.len());
    Ok(rows)
}

/// Values of one column, one per row. Rows flagged invalid decode to null.
pub fn decode_column(column: &FieldData, transformers: &Transformers) -> Result<Vec<FieldValue>> {
    let values = match &column.field {
        None => Vec::new(),
        Some(field_data::Field::Scalars(scalars)) => decode_scalars(scalars)?,
        Some(field_data::Field::Vectors(vectors)) => decode_vectors(vectors, 0, transformers)?,
        Some(field_data::Field::StructArrays(structs)) => decode_struct(structs, transformers)?,
    };
    apply_validity(&column.field_name, values, &column.valid_data)
}

/// Scalar buffers are positional; vector buffers skip invalid rows. Both
/// layouts are accepted for either kind.
fn apply_validity(name: &str, values: Vec<FieldValue>, valid: &[bool]) -> Result<Vec<FieldValue>> {
    if valid.is_empty() {
        return Ok(values);
    }
    if values.len() == valid.len() {
        return Ok(
            values
                .into_iter()
                .zip(valid)
                .map(|(value, ok)| if *ok { value } else { FieldValue::Null })
                .collect()
        );
    }
    let present = valid
        .iter()
        .filter(|v| **v)
        .count();
    if values.len() != present {
        return Err(
            MarshalError::decode(
                format!(
                    "column '{}' has {} values for {} valid rows out of {}",
                    name,
                    values.len(),
                    present,
                    valid.len()
                )
            )
        );
    }
    let mut values = values.into_iter();
    Ok(
        valid
            .iter()
            .map(|ok| if *ok { values.next().unwrap_or(FieldValue::Null) } else { FieldValue::Null })
            .collect()
    )
}

pub(crate) fn decode_scalars(scalars: &ScalarField) -> Result<Vec<FieldValue>> {
    use scalar_field::Data;
    let values = match &scalars.data {
        None => Vec::new(),
        Some(Data::BoolData(a)) => a.data.iter().map(|v| FieldValue::Bool(*v)).collect(),
        Some(Data::IntData(a)) => a.data.iter().map(|v| FieldValue::Int(*v as i64)).collect(),
        Some(Data::LongData(a)) => a.data.iter().map(|v| FieldValue::Int(*v)).collect(),
        Some(Data::FloatData(a)) => a.data.iter().map(|v| FieldValue::Float(*v as f64)).collect(),
        Some(Data::DoubleData(a)) => a.data.iter().map(|v| FieldValue::Float(*v)).collect(),
        Some(Data::StringData(a)) => a.data.iter().cloned().map(FieldValue::String).collect(),
        Some(Data::BytesData(a)) => a.data.iter().cloned().map(FieldValue::Bytes).collect(),
        Some(Data::GeometryData(a)) => a.data.iter().cloned().map(FieldValue::Bytes).collect(),
        Some(Data::GeometryWktData(a)) => a.data.iter().cloned().map(FieldValue::String).collect(),
        Some(Data::TimestamptzData(a)) => a.data.iter().map(|v| FieldValue::Int(*v)).collect(),
        Some(Data::JsonData(a)) =>
            a.data
                .iter()
                .map(|bytes| {
                    if bytes.is_empty() {
                        Ok(FieldValue::Null)
                    } else {
                        serde_json::from_slice(bytes).map(FieldValue::Json).map_err(MarshalError::from)
                    }
                })
                .collect::<Result<_>>()?,
        Some(Data::ArrayData(a)) =>
            a.data
                .iter()
                .map(|cell| decode_scalars(cell).map(FieldValue::Array))
                .collect::<Result<_>>()?,
    };
    Ok(values)
}

/// Splits a packed buffer into per-row slices of `size` elements.
fn rows_of<'a, T>(data: &'a [T], size: usize, what: &str) -> Result<Vec<&'a [T]>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    if size == 0 || data.len() % size != 0 {
        return Err(
            MarshalError::decode(format!("{} buffer of {} elements does not split into rows of {}", what, data.len(), size))
        );
    }
    Ok(data.chunks(size).collect())
}

/// `fallback_dim` covers vector-array entries that leave their own dim unset.
fn decode_vectors(
    vectors: &VectorField,
    fallback_dim: usize,
    transformers: &Transformers
) -> Result<Vec<FieldValue>> {
    use vector_field::Data;
    let dim = if vectors.dim > 0 { vectors.dim as usize } else { fallback_dim };
    let values = match &vectors.data {
        None => Vec::new(),
        Some(Data::FloatVector(a)) =>
            rows_of(&a.data, dim, "float vector")?
                .into_iter()
                .map(|row| FieldValue::FloatVector(row.to_vec()))
                .collect(),
        Some(Data::BinaryVector(b)) =>
            rows_of(b, VectorKind::Binary.elements_per_row(dim), "binary vector")?
                .into_iter()
                .map(|row| FieldValue::Bytes(row.to_vec()))
                .collect(),
        Some(Data::Float16Vector(b)) => decode_packed(b, dim, VectorKind::Float16, transformers)?,
        Some(Data::Bfloat16Vector(b)) => decode_packed(b, dim, VectorKind::BFloat16, transformers)?,
        Some(Data::Int8Vector(b)) => {
            if transformers.has_override(VectorKind::Int8) {
                decode_packed(b, dim, VectorKind::Int8, transformers)?
            } else {
                rows_of(b, dim, "int8 vector")?
                    .into_iter()
                    .map(|row| FieldValue::Int8Vector(bytes_to_i8(row)))
                    .collect()
            }
        }
        Some(Data::SparseFloatVector(s)) =>
            s.contents
                .iter()
                .map(|row| SparseVector::from_bytes(row).map(FieldValue::Sparse).map_err(MarshalError::decode))
                .collect::<Result<_>>()?,
        Some(Data::VectorArray(array)) => {
            let inner_dim = if array.dim > 0 { array.dim as usize } else { dim };
            array.data
                .iter()
                .map(|row| decode_vectors(row, inner_dim, transformers).map(FieldValue::Array))
                .collect::<Result<_>>()?
        }
    };
    Ok(values)
}

fn decode_packed(
    bytes: &[u8],
    dim: usize,
    kind: VectorKind,
    transformers: &Transformers
) -> Result<Vec<FieldValue>> {
    let transformer = transformers
        .get(kind)
        .ok_or_else(|| MarshalError::decode(format!("no transformer for {:?}", kind)))?;
    rows_of(bytes, kind.elements_per_row(dim), "packed vector")?
        .into_iter()
        .map(|row| transformer.decode(row).map(FieldValue::FloatVector).map_err(MarshalError::decode))
        .collect()
}

/// Members decode to one list per row; they are regrouped by row, then by
/// element index.
fn decode_struct(structs: &StructArrayField, transformers: &Transformers) -> Result<Vec<FieldValue>> {
    let mut members = Vec::with_capacity(structs.fields.len());
    for member in &structs.fields {
        members.push((member.field_name.as_str(), decode_column(member, transformers)?));
    }
    let num_rows = members
        .iter()
        .map(|(_, values)| values.len())
        .max()
        .unwrap_or(0);
    let mut rows = Vec::with_capacity(num_rows);
    for row in 0..num_rows {
        let mut elements: Vec<RowData> = Vec::new();
        for (name, values) in &members {
            let items: &[FieldValue] = match values.get(row) {
                Some(FieldValue::Array(items)) => items.as_slice(),
                _ => &[],
            };
            if elements.len() < items.len() {
                elements.resize_with(items.len(), RowData::new);
            }
            for (element, item) in elements.iter_mut().zip(items) {
                element.insert(name.to_string(), item.clone());
            }
        }
        rows.push(FieldValue::Struct(elements));
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{ self, LongArray };
    use crate::registry::DataType;
    use serde_json::json;

    fn long_column(name: &str, data: Vec<i64>, valid: Vec<bool>) -> FieldData {
        FieldData {
            r#type: DataType::Int64 as i32,
            field_name: name.to_string(),
            valid_data: valid,
            field: Some(
                field_data::Field::Scalars(ScalarField {
                    data: Some(scalar_field::Data::LongData(LongArray { data })),
                })
            ),
            ..Default::default()
        }
    }

    fn float_vector_column(name: &str, dim: i64, data: Vec<f32>, valid: Vec<bool>) -> FieldData {
        FieldData {
            r#type: DataType::FloatVector as i32,
            field_name: name.to_string(),
            valid_data: valid,
            field: Some(
                field_data::Field::Vectors(VectorField {
                    dim,
                    data: Some(vector_field::Data::FloatVector(proto::FloatArray { data })),
                })
            ),
            ..Default::default()
        }
    }

    #[test]
    fn invalid_scalar_rows_are_null() {
        let column = long_column("age", vec![10, 99, 30], vec![true, false, true]);
        let values = decode_column(&column, &Transformers::new()).unwrap();
        assert_eq!(values, vec![FieldValue::Int(10), FieldValue::Null, FieldValue::Int(30)]);
    }

    #[test]
    fn compact_vector_buffers_expand_around_nulls() {
        let column = float_vector_column("v", 2, vec![1.0, 2.0, 3.0, 4.0], vec![true, false, true]);
        let values = decode_column(&column, &Transformers::new()).unwrap();
        assert_eq!(
            values,
            vec![FieldValue::FloatVector(vec![1.0, 2.0]), FieldValue::Null, FieldValue::FloatVector(vec![3.0, 4.0])]
        );
    }

    #[test]
    fn ragged_buffers_are_decode_errors() {
        let column = float_vector_column("v", 4, vec![1.0, 2.0, 3.0], vec![]);
        assert!(matches!(decode_column(&column, &Transformers::new()), Err(MarshalError::Decode(_))));
        let column = long_column("age", vec![1], vec![true, true, false]);
        assert!(decode_column(&column, &Transformers::new()).is_err());
    }

    #[test]
    fn empty_json_bytes_decode_to_null() {
        let column = FieldData {
            r#type: DataType::Json as i32,
            field_name: "meta".to_string(),
            field: Some(
                field_data::Field::Scalars(ScalarField {
                    data: Some(
                        scalar_field::Data::JsonData(proto::JsonArray {
                            data: vec![br#"{"a":1}"#.to_vec(), Vec::new()],
                        })
                    ),
                })
            ),
            ..Default::default()
        };
        let values = decode_column(&column, &Transformers::new()).unwrap();
        assert_eq!(values, vec![FieldValue::Json(json!({"a": 1})), FieldValue::Null]);
    }

    #[test]
    fn dynamic_columns_are_lifted_onto_rows() {
        let mut meta = FieldData {
            r#type: DataType::Json as i32,
            field_name: "$meta".to_string(),
            is_dynamic: true,
            field: Some(
                field_data::Field::Scalars(ScalarField {
                    data: Some(
                        scalar_field::Data::JsonData(proto::JsonArray {
                            data: vec![br#"{"color":"red"}"#.to_vec(), b"{}".to_vec()],
                        })
                    ),
                })
            ),
            ..Default::default()
        };
        meta.field_id = 101;
        let rows = parse_columns(&[long_column("id", vec![1, 2], vec![]), meta], &Transformers::new()).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("color"), Some(&FieldValue::String("red".to_string())));
        assert!(!rows[0].contains_key("$meta"));
        assert_eq!(rows[1].len(), 1);
    }

    #[test]
    fn struct_members_regroup_by_row_then_element() {
        let lens = FieldData {
            r#type: DataType::Array as i32,
            field_name: "len".to_string(),
            field: Some(
                field_data::Field::Scalars(ScalarField {
                    data: Some(
                        scalar_field::Data::ArrayData(proto::ArrayArray {
                            data: vec![
                                ScalarField {
                                    data: Some(scalar_field::Data::IntData(proto::IntArray { data: vec![3, 5] })),
                                },
                                ScalarField {
                                    data: Some(scalar_field::Data::IntData(proto::IntArray { data: vec![7] })),
                                }
                            ],
                            element_type: DataType::Int32 as i32,
                        })
                    ),
                })
            ),
            ..Default::default()
        };
        let column = FieldData {
            r#type: DataType::ArrayOfStruct as i32,
            field_name: "clips".to_string(),
            valid_data: vec![true, false, true],
            field: Some(field_data::Field::StructArrays(StructArrayField { fields: vec![lens] })),
            ..Default::default()
        };
        let values = decode_column(&column, &Transformers::new()).unwrap();
        assert_eq!(values.len(), 3);
        match &values[0] {
            FieldValue::Struct(elements) => {
                assert_eq!(elements.len(), 2);
                assert_eq!(elements[1].get("len"), Some(&FieldValue::Int(5)));
            }
            other => panic!("unexpected value: {:?}", other),
        }
        assert_eq!(values[1], FieldValue::Null);
    }

    #[test]
    fn mismatched_column_lengths_fail() {
        let columns = [long_column("a", vec![1, 2], vec![]), long_column("b", vec![1], vec![])];
        assert!(parse_columns(&columns, &Transformers::new()).is_err());
    }
}
