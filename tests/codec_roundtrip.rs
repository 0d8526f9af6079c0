use serde_json::json;

use milvus_marshal::codec::{ build_columns, parse_columns, Transformers };
use milvus_marshal::collection::{ format_collection_schema, CollectionDeclaration, FieldDeclaration };
use milvus_marshal::error::{ MarshalError, Result };
use milvus_marshal::registry::{ ConsistencyLevel, DataType };
use milvus_marshal::schema::CollectionSchema;
use milvus_marshal::value::{ row_from_json, FieldValue, RowData, SparseVector };

fn sample_schema() -> Result<CollectionSchema> {
    let declaration = CollectionDeclaration {
        name: "items".into(),
        fields: vec![
            FieldDeclaration::new("id", DataType::Int64).primary_key(false),
            FieldDeclaration::new("title", DataType::VarChar).max_length(64),
            FieldDeclaration::new("dense", DataType::FloatVector).dim(4),
            FieldDeclaration::new("half", DataType::Float16Vector).dim(2),
            FieldDeclaration::new("brain", DataType::BFloat16Vector).dim(2),
            FieldDeclaration::new("bits", DataType::BinaryVector).dim(16),
            FieldDeclaration::new("small", DataType::Int8Vector).dim(2),
            FieldDeclaration::new("sparse", DataType::SparseFloatVector)
        ],
        enable_dynamic_field: true,
        ..Default::default()
    };
    format_collection_schema(&declaration)?.collection_schema(ConsistencyLevel::Bounded)
}

fn rows(value: serde_json::Value) -> Vec<RowData> {
    match value {
        serde_json::Value::Array(items) => items.into_iter().map(row_from_json).collect(),
        other => vec![row_from_json(other)],
    }
}

fn sample_rows() -> Vec<RowData> {
    rows(
        json!([
            {
                "id": 1,
                "title": "first",
                "dense": [0.1, 0.2, 0.3, 0.4],
                "half": [0.5, -1.0],
                "brain": [2.0, 0.25],
                "bits": [255, 0],
                "small": [1, -2],
                "sparse": {"3": 0.5, "10": 1.0},
                "color": "red"
            },
            {
                "id": 2,
                "title": "second",
                "dense": [1.0, 2.0, 3.0, 4.0],
                "half": [0.0, 4.0],
                "brain": [-0.5, 8.0],
                "bits": [1, 128],
                "small": [127, -128],
                "sparse": {"0": 0.75}
            }
        ])
    )
}

#[test]
fn every_vector_kind_survives_the_column_layout() -> Result<()> {
    let schema = sample_schema()?;
    let transformers = Transformers::new();
    let columns = build_columns(&schema, &sample_rows(), &transformers)?;
    let decoded = parse_columns(&columns, &transformers)?;

    assert_eq!(decoded.len(), 2);
    let first = &decoded[0];
    assert_eq!(first["id"], FieldValue::Int(1));
    assert_eq!(first["title"], FieldValue::String("first".into()));
    assert_eq!(first["dense"], FieldValue::FloatVector(vec![0.1, 0.2, 0.3, 0.4]));
    assert_eq!(first["half"], FieldValue::FloatVector(vec![0.5, -1.0]));
    assert_eq!(first["brain"], FieldValue::FloatVector(vec![2.0, 0.25]));
    assert_eq!(first["bits"], FieldValue::Bytes(vec![255, 0]));
    assert_eq!(first["small"], FieldValue::Int8Vector(vec![1, -2]));
    assert_eq!(first["sparse"], FieldValue::Sparse(SparseVector::new(vec![(3, 0.5), (10, 1.0)]).unwrap()));
    assert_eq!(first["color"], FieldValue::String("red".into()));
    assert!(!first.contains_key("$meta"));

    let second = &decoded[1];
    assert_eq!(second["small"], FieldValue::Int8Vector(vec![127, -128]));
    assert_eq!(second["sparse"], FieldValue::Sparse(SparseVector::new(vec![(0, 0.75)]).unwrap()));
    assert!(!second.contains_key("color"));
    Ok(())
}

#[test]
fn columns_follow_schema_order_with_dynamic_last() -> Result<()> {
    let schema = sample_schema()?;
    let columns = build_columns(&schema, &sample_rows(), &Transformers::new())?;
    let names: Vec<&str> = columns
        .iter()
        .map(|c| c.field_name.as_str())
        .collect();
    assert_eq!(names, vec!["id", "title", "dense", "half", "brain", "bits", "small", "sparse", "$meta"]);
    assert!(columns.last().map_or(false, |c| c.is_dynamic));
    Ok(())
}

#[test]
fn row_order_is_preserved() -> Result<()> {
    let schema = sample_schema()?;
    let mut input = sample_rows();
    input.reverse();
    let decoded = parse_columns(&build_columns(&schema, &input, &Transformers::new())?, &Transformers::new())?;
    let ids: Vec<&FieldValue> = decoded
        .iter()
        .map(|r| &r["id"])
        .collect();
    assert_eq!(ids, vec![&FieldValue::Int(2), &FieldValue::Int(1)]);
    Ok(())
}

#[test]
fn wrong_dimension_names_field_and_row() -> Result<()> {
    let schema = sample_schema()?;
    let mut input = sample_rows();
    input[1].insert("dense".into(), FieldValue::FloatVector(vec![1.0, 2.0, 3.0]));
    match build_columns(&schema, &input, &Transformers::new()) {
        Err(MarshalError::Dimension { field, row, expected, actual }) => {
            assert_eq!(field, "dense");
            assert_eq!(row, 1);
            assert_eq!(expected, 4);
            assert_eq!(actual, 3);
        }
        other => panic!("expected a dimension error, got {:?}", other.map(|c| c.len())),
    }
    Ok(())
}

#[test]
fn missing_required_field_is_rejected() -> Result<()> {
    let schema = sample_schema()?;
    let mut input = sample_rows();
    input[0].remove("title");
    let err = build_columns(&schema, &input, &Transformers::new()).unwrap_err();
    assert!(matches!(err, MarshalError::MissingField { row: 0, ref field } if field == "title"));
    Ok(())
}

fn clips_schema() -> Result<CollectionSchema> {
    let declaration = CollectionDeclaration {
        name: "videos".into(),
        fields: vec![
            FieldDeclaration::new("id", DataType::Int64).primary_key(false),
            FieldDeclaration::new("cover", DataType::FloatVector).dim(2),
            FieldDeclaration::new("clips", DataType::Array).struct_array(
                vec![
                    FieldDeclaration::new("label", DataType::VarChar).max_length(16),
                    FieldDeclaration::new("cv", DataType::FloatVector).dim(2)
                ],
                4
            )
        ],
        ..Default::default()
    };
    format_collection_schema(&declaration)?.collection_schema(ConsistencyLevel::Bounded)
}

fn clip(label: &str, cv: Vec<f32>) -> RowData {
    let mut element = RowData::new();
    element.insert("label".into(), FieldValue::String(label.into()));
    element.insert("cv".into(), FieldValue::FloatVector(cv));
    element
}

#[test]
fn struct_arrays_keep_elements_per_row() -> Result<()> {
    let schema = clips_schema()?;
    let input = rows(
        json!([
            {
                "id": 1,
                "cover": [0.0, 1.0],
                "clips": [{"label": "intro", "cv": [1.0, 2.0]}, {"label": "outro", "cv": [3.0, 4.0]}]
            },
            {"id": 2, "cover": [1.0, 0.0], "clips": [{"label": "solo", "cv": [5.0, 6.0]}]}
        ])
    );
    let transformers = Transformers::new();
    let columns = build_columns(&schema, &input, &transformers)?;
    let clips = columns
        .iter()
        .find(|c| c.field_name == "clips")
        .expect("struct column");
    assert_eq!(clips.r#type(), DataType::ArrayOfStruct);

    let decoded = parse_columns(&columns, &transformers)?;
    assert_eq!(
        decoded[0]["clips"],
        FieldValue::Struct(vec![clip("intro", vec![1.0, 2.0]), clip("outro", vec![3.0, 4.0])])
    );
    assert_eq!(decoded[1]["clips"], FieldValue::Struct(vec![clip("solo", vec![5.0, 6.0])]));
    Ok(())
}

#[test]
fn struct_elements_must_match_their_members() -> Result<()> {
    let schema = clips_schema()?;
    let unknown = rows(
        json!([{"id": 1, "cover": [0.0, 1.0], "clips": [{"label": "a", "cv": [1.0, 2.0], "mood": "calm"}]}])
    );
    match build_columns(&schema, &unknown, &Transformers::new()) {
        Err(MarshalError::InvalidValue { field, row, reason }) => {
            assert_eq!(field, "clips");
            assert_eq!(row, 0);
            assert!(reason.contains("'mood' does not exist"));
        }
        other => panic!("expected an invalid value error, got {:?}", other.map(|c| c.len())),
    }

    let missing = rows(
        json!([
            {"id": 1, "cover": [0.0, 1.0], "clips": [{"label": "a", "cv": [1.0, 2.0]}]},
            {"id": 2, "cover": [0.0, 1.0], "clips": [{"label": "b", "cv": [1.0, 2.0]}, {"label": "c"}]}
        ])
    );
    match build_columns(&schema, &missing, &Transformers::new()) {
        Err(MarshalError::InvalidValue { row, reason, .. }) => {
            assert_eq!(row, 1);
            assert!(reason.contains("'cv' is missing in struct at index 1"));
        }
        other => panic!("expected an invalid value error, got {:?}", other.map(|c| c.len())),
    }
    Ok(())
}
