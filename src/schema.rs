use std::collections::{ BTreeMap, HashSet };

use serde::{ Deserialize, Serialize };
use serde_json::{ Map, Value };

use crate::error::{ MarshalError, Result };
use crate::proto;
use crate::registry::{ ConsistencyLevel, DataType, FieldCodec, FunctionType, PlaceholderType };
use crate::value::{ param_string, FieldValue };

/// Name the server gives the hidden JSON column of a dynamic collection.
pub const DEFAULT_DYNAMIC_FIELD: &str = "$meta";

/// Describes one field of a collection as the codec sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    /// Field name, unique within its collection (or struct).
    pub name: String,
    pub field_id: i64,
    /// Declared type. For struct members this is the element type.
    pub data_type: DataType,
    /// Element type of array fields.
    pub element_type: Option<DataType>,
    /// Vector dimension.
    pub dim: Option<usize>,
    /// VarChar byte limit.
    pub max_length: Option<usize>,
    /// Array and struct-array element limit.
    pub max_capacity: Option<usize>,
    pub is_primary_key: bool,
    pub auto_id: bool,
    pub is_partition_key: bool,
    pub is_clustering_key: bool,
    /// Hidden JSON column that absorbs undeclared keys.
    pub is_dynamic: bool,
    /// Computed server-side by a function; never written by the client.
    pub is_function_output: bool,
    pub nullable: bool,
    pub default_value: Option<FieldValue>,
    /// Remaining type parameters, stringified.
    pub type_params: BTreeMap<String, String>,
    /// Members of a struct-array field.
    pub fields: Vec<FieldDescriptor>,
    pub codec: FieldCodec,
    pub placeholder_type: PlaceholderType,
}

impl FieldDescriptor {
    pub fn from_proto(field: &proto::FieldSchema) -> Result<Self> {
        let data_type = DataType::from_code(field.data_type).ok_or_else(||
            MarshalError::schema(
                format!("Field '{}' has unknown data type {}", field.name, field.data_type)
            )
        )?;
        let element_type = match field.element_type {
            0 => None,
            code => DataType::from_code(code),
        };
        let codec = FieldCodec::resolve(data_type, element_type).map_err(|e|
            MarshalError::schema(format!("Field '{}': {}", field.name, e))
        )?;
        let type_params = key_values(&field.type_params);
        Ok(FieldDescriptor {
            name: field.name.clone(),
            field_id: field.field_id,
            data_type,
            element_type,
            dim: parse_usize(&type_params, "dim"),
            max_length: parse_usize(&type_params, "max_length"),
            max_capacity: parse_usize(&type_params, "max_capacity"),
            is_primary_key: field.is_primary_key,
            auto_id: field.auto_id,
            is_partition_key: field.is_partition_key,
            is_clustering_key: field.is_clustering_key,
            is_dynamic: field.is_dynamic,
            is_function_output: field.is_function_output,
            nullable: field.nullable,
            default_value: field.default_value.as_ref().and_then(default_from_proto),
            type_params,
            fields: Vec::new(),
            codec,
            placeholder_type: data_type.placeholder_type(false, field.is_function_output),
        })
    }

    /// Struct-array container. Members arrive as `Array`/`ArrayOfVector`
    /// columns and are unwrapped to their element type.
    pub fn from_struct_proto(field: &proto::StructArrayFieldSchema) -> Result<Self> {
        let mut members = Vec::with_capacity(field.fields.len());
        for sub in &field.fields {
            members.push(FieldDescriptor::struct_member(sub, &field.name)?);
        }
        let max_capacity = members.iter().find_map(|m| m.max_capacity);
        Ok(FieldDescriptor {
            name: field.name.clone(),
            field_id: field.field_id,
            data_type: DataType::Array,
            element_type: Some(DataType::Struct),
            dim: None,
            max_length: None,
            max_capacity,
            is_primary_key: false,
            auto_id: false,
            is_partition_key: false,
            is_clustering_key: false,
            is_dynamic: false,
            is_function_output: false,
            nullable: false,
            default_value: None,
            type_params: BTreeMap::new(),
            fields: members,
            codec: FieldCodec::StructArray,
            placeholder_type: PlaceholderType::None,
        })
    }

    fn struct_member(sub: &proto::FieldSchema, parent: &str) -> Result<Self> {
        let mut member = FieldDescriptor::from_proto(sub)?;
        let element = match member.data_type {
            DataType::Array | DataType::ArrayOfVector => member.element_type,
            other => Some(other),
        };
        let element = element.ok_or_else(||
            MarshalError::schema(format!("Struct member '{}[{}]' has no element type", parent, sub.name))
        )?;
        member.data_type = element;
        member.element_type = None;
        member.codec = FieldCodec::for_struct_member(element).map_err(|e|
            MarshalError::schema(format!("Struct member '{}[{}]': {}", parent, sub.name, e))
        )?;
        member.placeholder_type = element.placeholder_type(true, false);
        Ok(member)
    }

    /// Hidden JSON column of a dynamic collection.
    pub fn dynamic(name: &str) -> Self {
        FieldDescriptor {
            name: name.to_string(),
            field_id: 0,
            data_type: DataType::Json,
            element_type: None,
            dim: None,
            max_length: None,
            max_capacity: None,
            is_primary_key: false,
            auto_id: false,
            is_partition_key: false,
            is_clustering_key: false,
            is_dynamic: true,
            is_function_output: false,
            nullable: false,
            default_value: None,
            type_params: BTreeMap::new(),
            fields: Vec::new(),
            codec: FieldCodec::Scalar(crate::registry::ScalarKind::Json),
            placeholder_type: PlaceholderType::None,
        }
    }

    pub fn is_vector(&self) -> bool {
        self.data_type.is_vector()
    }

    pub fn is_struct_array(&self) -> bool {
        self.codec == FieldCodec::StructArray
    }

    /// Nullable and defaulted fields carry a validity array on the wire.
    pub fn tracks_validity(&self) -> bool {
        self.nullable || self.default_value.is_some()
    }

    /// Excluded from write payloads.
    pub fn is_server_generated(&self) -> bool {
        (self.is_primary_key && self.auto_id) || self.is_function_output
    }

    pub fn member(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// Function attached to a collection, or a function-based reranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub function_type: FunctionType,
    #[serde(default)]
    pub input_field_names: Vec<String>,
    #[serde(default)]
    pub output_field_names: Vec<String>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl FunctionDescriptor {
    pub fn new<S: Into<String>>(name: S, function_type: FunctionType) -> Self {
        FunctionDescriptor {
            name: name.into(),
            description: String::new(),
            function_type,
            input_field_names: Vec::new(),
            output_field_names: Vec::new(),
            params: Map::new(),
        }
    }

    pub fn to_proto(&self) -> proto::FunctionSchema {
        proto::FunctionSchema {
            name: self.name.clone(),
            description: self.description.clone(),
            r#type: self.function_type as i32,
            input_field_names: self.input_field_names.clone(),
            output_field_names: self.output_field_names.clone(),
            params: self.params
                .iter()
                .map(|(k, v)| proto::KeyValuePair::new(k.clone(), param_string(v)))
                .collect(),
            ..Default::default()
        }
    }

    pub fn from_proto(function: &proto::FunctionSchema) -> Self {
        let params = function.params
            .iter()
            .map(|kv| {
                let value = serde_json
                    ::from_str::<Value>(&kv.value)
                    .unwrap_or_else(|_| Value::String(kv.value.clone()));
                (kv.key.clone(), value)
            })
            .collect();
        FunctionDescriptor {
            name: function.name.clone(),
            description: function.description.clone(),
            function_type: FunctionType::try_from(function.r#type).unwrap_or(FunctionType::Unknown),
            input_field_names: function.input_field_names.clone(),
            output_field_names: function.output_field_names.clone(),
            params,
        }
    }
}

/// Described collection. Fetched by the caller and handed to every codec
/// call; nothing here refreshes it.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionSchema {
    pub name: String,
    pub description: String,
    /// Regular fields in declaration order, then struct-array fields.
    pub fields: Vec<FieldDescriptor>,
    pub functions: Vec<FunctionDescriptor>,
    pub enable_dynamic_field: bool,
    /// Column holding undeclared keys, when dynamic fields are enabled.
    pub dynamic_field: Option<String>,
    pub consistency_level: ConsistencyLevel,
    pub properties: BTreeMap<String, String>,
}

impl CollectionSchema {
    pub fn from_describe(response: &proto::DescribeCollectionResponse) -> Result<Self> {
        let schema = response.schema
            .as_ref()
            .ok_or_else(|| {
                MarshalError::schema(
                    format!("Describe response for '{}' carries no schema", response.collection_name)
                )
            })?;
        let consistency = ConsistencyLevel::try_from(response.consistency_level).unwrap_or(
            ConsistencyLevel::Bounded
        );
        let mut described = CollectionSchema::from_proto(schema, consistency)?;
        if described.name.is_empty() {
            described.name = response.collection_name.clone();
        }
        Ok(described)
    }

    pub fn from_proto(schema: &proto::CollectionSchema, consistency_level: ConsistencyLevel) -> Result<Self> {
        let mut fields = Vec::with_capacity(schema.fields.len() + schema.struct_array_fields.len());
        for field in &schema.fields {
            fields.push(FieldDescriptor::from_proto(field)?);
        }
        for field in &schema.struct_array_fields {
            fields.push(FieldDescriptor::from_struct_proto(field)?);
        }
        let dynamic_field = if schema.enable_dynamic_field {
            Some(
                fields
                    .iter()
                    .find(|f| f.is_dynamic)
                    .map(|f| f.name.clone())
                    .unwrap_or_else(|| DEFAULT_DYNAMIC_FIELD.to_string())
            )
        } else {
            None
        };
        Ok(CollectionSchema {
            name: schema.name.clone(),
            description: schema.description.clone(),
            fields,
            functions: schema.functions.iter().map(FunctionDescriptor::from_proto).collect(),
            enable_dynamic_field: schema.enable_dynamic_field,
            dynamic_field,
            consistency_level,
            properties: key_values(&schema.properties),
        })
    }

    /// Renames the dynamic column unless the schema declares it explicitly.
    pub fn with_dynamic_field_name(mut self, name: &str) -> Self {
        if self.enable_dynamic_field && !self.fields.iter().any(|f| f.is_dynamic) {
            self.dynamic_field = Some(name.to_string());
        }
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn primary_field(&self) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.is_primary_key)
    }

    /// Names of function-computed fields.
    pub fn function_output_fields(&self) -> HashSet<&str> {
        let mut names: HashSet<&str> = self.fields
            .iter()
            .filter(|f| f.is_function_output)
            .map(|f| f.name.as_str())
            .collect();
        for function in &self.functions {
            names.extend(function.output_field_names.iter().map(String::as_str));
        }
        names
    }

    /// Searchable vector fields in schema order. Struct members are keyed
    /// as `struct[member]`.
    pub fn vector_field_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for field in &self.fields {
            if field.is_struct_array() {
                for member in field.fields.iter().filter(|m| m.is_vector()) {
                    names.push(format!("{}[{}]", field.name, member.name));
                }
            } else if field.is_vector() {
                names.push(field.name.clone());
            }
        }
        names
    }

    pub fn vector_field(&self, name: &str) -> Option<&FieldDescriptor> {
        if let Some((outer, inner)) = split_member_path(name) {
            return self
                .field(outer)
                .filter(|f| f.is_struct_array())
                .and_then(|f| f.member(inner))
                .filter(|m| m.is_vector());
        }
        self.field(name).filter(|f| f.is_vector())
    }
}

/// Splits `struct[member]` into its parts.
pub fn split_member_path(name: &str) -> Option<(&str, &str)> {
    let open = name.find('[')?;
    let inner = name[open + 1..].strip_suffix(']')?;
    if open == 0 || inner.is_empty() {
        return None;
    }
    Some((&name[..open], inner))
}

pub(crate) fn key_values(pairs: &[proto::KeyValuePair]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|kv| (kv.key.clone(), kv.value.clone()))
        .collect()
}

fn parse_usize(params: &BTreeMap<String, String>, key: &str) -> Option<usize> {
    params.get(key).and_then(|v| v.trim().parse::<usize>().ok())
}

fn default_from_proto(value: &proto::ValueField) -> Option<FieldValue> {
    use proto::value_field::Data;
    let data = value.data.as_ref()?;
    Some(match data {
        Data::BoolData(v) => FieldValue::Bool(*v),
        Data::IntData(v) => FieldValue::Int(*v as i64),
        Data::LongData(v) => FieldValue::Int(*v),
        Data::FloatData(v) => FieldValue::Float(*v as f64),
        Data::DoubleData(v) => FieldValue::Float(*v),
        Data::StringData(v) => FieldValue::String(v.clone()),
        Data::BytesData(v) =>
            match serde_json::from_slice::<Value>(v) {
                Ok(json) => FieldValue::Json(json),
                Err(_) => FieldValue::Bytes(v.clone()),
            }
        Data::TimestamptzData(v) => FieldValue::Int(*v),
    })
}
