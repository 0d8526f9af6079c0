//! Wire messages exchanged with the Milvus proxy.
//!
//! Declared by hand with prost derives; tags match the upstream
//! `common`, `schema` and `milvus` proto packages. Fields the codec never
//! reads or writes (message base, travel timestamps, namespaces) are left out.

use std::collections::HashMap;

use crate::registry::{ ConsistencyLevel, DataType, DslType, ErrorCode, FunctionType, PlaceholderType };

// ---- common ----

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyValuePair {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(string, tag = "2")]
    pub value: String,
}

impl KeyValuePair {
    pub fn new<K: Into<String>, V: Into<String>>(key: K, value: V) -> Self {
        KeyValuePair { key: key.into(), value: value.into() }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Status {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub error_code: i32,
    #[prost(string, tag = "2")]
    pub reason: String,
    #[prost(int32, tag = "3")]
    pub code: i32,
    #[prost(bool, tag = "4")]
    pub retriable: bool,
    #[prost(string, tag = "5")]
    pub detail: String,
    #[prost(map = "string, string", tag = "6")]
    pub extra_info: HashMap<String, String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlaceholderValue {
    #[prost(string, tag = "1")]
    pub tag: String,
    #[prost(enumeration = "PlaceholderType", tag = "2")]
    pub r#type: i32,
    #[prost(bytes = "vec", repeated, tag = "3")]
    pub values: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlaceholderGroup {
    #[prost(message, repeated, tag = "1")]
    pub placeholders: Vec<PlaceholderValue>,
}

// ---- schema ----

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FieldSchema {
    #[prost(int64, tag = "1")]
    pub field_id: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(bool, tag = "3")]
    pub is_primary_key: bool,
    #[prost(string, tag = "4")]
    pub description: String,
    #[prost(enumeration = "DataType", tag = "5")]
    pub data_type: i32,
    #[prost(message, repeated, tag = "6")]
    pub type_params: Vec<KeyValuePair>,
    #[prost(message, repeated, tag = "7")]
    pub index_params: Vec<KeyValuePair>,
    #[prost(bool, tag = "8")]
    pub auto_id: bool,
    #[prost(int32, tag = "9")]
    pub state: i32,
    #[prost(enumeration = "DataType", tag = "10")]
    pub element_type: i32,
    #[prost(message, optional, tag = "11")]
    pub default_value: Option<ValueField>,
    #[prost(bool, tag = "12")]
    pub is_dynamic: bool,
    #[prost(bool, tag = "13")]
    pub is_partition_key: bool,
    #[prost(bool, tag = "14")]
    pub is_clustering_key: bool,
    #[prost(bool, tag = "15")]
    pub nullable: bool,
    #[prost(bool, tag = "16")]
    pub is_function_output: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StructArrayFieldSchema {
    #[prost(int64, tag = "1")]
    pub field_id: i64,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub description: String,
    #[prost(message, repeated, tag = "4")]
    pub fields: Vec<FieldSchema>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FunctionSchema {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(int64, tag = "2")]
    pub id: i64,
    #[prost(string, tag = "3")]
    pub description: String,
    #[prost(enumeration = "FunctionType", tag = "4")]
    pub r#type: i32,
    #[prost(string, repeated, tag = "5")]
    pub input_field_names: Vec<String>,
    #[prost(int64, repeated, tag = "6")]
    pub input_field_ids: Vec<i64>,
    #[prost(string, repeated, tag = "7")]
    pub output_field_names: Vec<String>,
    #[prost(int64, repeated, tag = "8")]
    pub output_field_ids: Vec<i64>,
    #[prost(message, repeated, tag = "9")]
    pub params: Vec<KeyValuePair>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FunctionScore {
    #[prost(message, repeated, tag = "1")]
    pub functions: Vec<FunctionSchema>,
    #[prost(message, repeated, tag = "2")]
    pub params: Vec<KeyValuePair>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CollectionSchema {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub description: String,
    #[prost(bool, tag = "3")]
    pub auto_id: bool,
    #[prost(message, repeated, tag = "4")]
    pub fields: Vec<FieldSchema>,
    #[prost(bool, tag = "5")]
    pub enable_dynamic_field: bool,
    #[prost(message, repeated, tag = "6")]
    pub properties: Vec<KeyValuePair>,
    #[prost(message, repeated, tag = "7")]
    pub functions: Vec<FunctionSchema>,
    #[prost(string, tag = "8")]
    pub db_name: String,
    #[prost(message, repeated, tag = "9")]
    pub struct_array_fields: Vec<StructArrayFieldSchema>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ValueField {
    #[prost(oneof = "value_field::Data", tags = "1, 2, 3, 4, 5, 6, 7, 8")]
    pub data: Option<value_field::Data>,
}

pub mod value_field {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Data {
        #[prost(bool, tag = "1")]
        BoolData(bool),
        #[prost(int32, tag = "2")]
        IntData(i32),
        #[prost(int64, tag = "3")]
        LongData(i64),
        #[prost(float, tag = "4")]
        FloatData(f32),
        #[prost(double, tag = "5")]
        DoubleData(f64),
        #[prost(string, tag = "6")]
        StringData(String),
        #[prost(bytes = "vec", tag = "7")]
        BytesData(Vec<u8>),
        #[prost(int64, tag = "8")]
        TimestamptzData(i64),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BoolArray {
    #[prost(bool, repeated, tag = "1")]
    pub data: Vec<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct IntArray {
    #[prost(int32, repeated, tag = "1")]
    pub data: Vec<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LongArray {
    #[prost(int64, repeated, tag = "1")]
    pub data: Vec<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FloatArray {
    #[prost(float, repeated, tag = "1")]
    pub data: Vec<f32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DoubleArray {
    #[prost(double, repeated, tag = "1")]
    pub data: Vec<f64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StringArray {
    #[prost(string, repeated, tag = "1")]
    pub data: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct BytesArray {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub data: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JsonArray {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub data: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GeometryArray {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub data: Vec<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GeometryWktArray {
    #[prost(string, repeated, tag = "1")]
    pub data: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TimestamptzArray {
    #[prost(int64, repeated, tag = "1")]
    pub data: Vec<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ArrayArray {
    #[prost(message, repeated, tag = "1")]
    pub data: Vec<ScalarField>,
    #[prost(enumeration = "DataType", tag = "2")]
    pub element_type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ScalarField {
    #[prost(oneof = "scalar_field::Data", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12")]
    pub data: Option<scalar_field::Data>,
}

pub mod scalar_field {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "1")]
        BoolData(super::BoolArray),
        #[prost(message, tag = "2")]
        IntData(super::IntArray),
        #[prost(message, tag = "3")]
        LongData(super::LongArray),
        #[prost(message, tag = "4")]
        FloatData(super::FloatArray),
        #[prost(message, tag = "5")]
        DoubleData(super::DoubleArray),
        #[prost(message, tag = "6")]
        StringData(super::StringArray),
        #[prost(message, tag = "7")]
        BytesData(super::BytesArray),
        #[prost(message, tag = "8")]
        ArrayData(super::ArrayArray),
        #[prost(message, tag = "9")]
        JsonData(super::JsonArray),
        #[prost(message, tag = "10")]
        GeometryData(super::GeometryArray),
        #[prost(message, tag = "11")]
        TimestamptzData(super::TimestamptzArray),
        #[prost(message, tag = "12")]
        GeometryWktData(super::GeometryWktArray),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SparseFloatArray {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub contents: Vec<Vec<u8>>,
    #[prost(int64, tag = "2")]
    pub dim: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VectorField {
    #[prost(int64, tag = "1")]
    pub dim: i64,
    #[prost(oneof = "vector_field::Data", tags = "2, 3, 4, 5, 6, 7, 8")]
    pub data: Option<vector_field::Data>,
}

pub mod vector_field {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "2")]
        FloatVector(super::FloatArray),
        #[prost(bytes = "vec", tag = "3")]
        BinaryVector(Vec<u8>),
        #[prost(bytes = "vec", tag = "4")]
        Float16Vector(Vec<u8>),
        #[prost(bytes = "vec", tag = "5")]
        Bfloat16Vector(Vec<u8>),
        #[prost(message, tag = "6")]
        SparseFloatVector(super::SparseFloatArray),
        #[prost(bytes = "vec", tag = "7")]
        Int8Vector(Vec<u8>),
        #[prost(message, tag = "8")]
        VectorArray(super::VectorArray),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct VectorArray {
    #[prost(int64, tag = "1")]
    pub dim: i64,
    #[prost(message, repeated, tag = "2")]
    pub data: Vec<VectorField>,
    #[prost(enumeration = "DataType", tag = "3")]
    pub element_type: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StructArrayField {
    #[prost(message, repeated, tag = "1")]
    pub fields: Vec<FieldData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FieldData {
    #[prost(enumeration = "DataType", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub field_name: String,
    #[prost(int64, tag = "5")]
    pub field_id: i64,
    #[prost(bool, tag = "6")]
    pub is_dynamic: bool,
    #[prost(bool, repeated, tag = "7")]
    pub valid_data: Vec<bool>,
    #[prost(oneof = "field_data::Field", tags = "3, 4, 8")]
    pub field: Option<field_data::Field>,
}

pub mod field_data {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Field {
        #[prost(message, tag = "3")]
        Scalars(super::ScalarField),
        #[prost(message, tag = "4")]
        Vectors(super::VectorField),
        #[prost(message, tag = "8")]
        StructArrays(super::StructArrayField),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ids {
    #[prost(oneof = "ids::IdField", tags = "1, 2")]
    pub id_field: Option<ids::IdField>,
}

pub mod ids {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum IdField {
        #[prost(message, tag = "1")]
        IntId(super::LongArray),
        #[prost(message, tag = "2")]
        StrId(super::StringArray),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchResultData {
    #[prost(int64, tag = "1")]
    pub num_queries: i64,
    #[prost(int64, tag = "2")]
    pub top_k: i64,
    #[prost(message, repeated, tag = "3")]
    pub fields_data: Vec<FieldData>,
    #[prost(float, repeated, tag = "4")]
    pub scores: Vec<f32>,
    #[prost(message, optional, tag = "5")]
    pub ids: Option<Ids>,
    #[prost(int64, repeated, tag = "6")]
    pub topks: Vec<i64>,
    #[prost(string, repeated, tag = "7")]
    pub output_fields: Vec<String>,
    #[prost(message, optional, tag = "8")]
    pub group_by_field_value: Option<FieldData>,
    #[prost(int64, tag = "9")]
    pub all_search_count: i64,
    #[prost(float, repeated, tag = "10")]
    pub distances: Vec<f32>,
    #[prost(float, repeated, tag = "12")]
    pub recalls: Vec<f32>,
    #[prost(string, tag = "13")]
    pub primary_field_name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TemplateValue {
    #[prost(oneof = "template_value::Val", tags = "1, 2, 3, 4, 5")]
    pub val: Option<template_value::Val>,
}

pub mod template_value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Val {
        #[prost(bool, tag = "1")]
        BoolVal(bool),
        #[prost(int64, tag = "2")]
        Int64Val(i64),
        #[prost(double, tag = "3")]
        FloatVal(f64),
        #[prost(string, tag = "4")]
        StringVal(String),
        #[prost(message, tag = "5")]
        ArrayVal(super::TemplateArrayValue),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TemplateArrayValue {
    #[prost(oneof = "template_array_value::Data", tags = "1, 2, 3, 4, 5, 6")]
    pub data: Option<template_array_value::Data>,
}

pub mod template_array_value {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Data {
        #[prost(message, tag = "1")]
        BoolData(super::BoolArray),
        #[prost(message, tag = "2")]
        LongData(super::LongArray),
        #[prost(message, tag = "3")]
        DoubleData(super::DoubleArray),
        #[prost(message, tag = "4")]
        StringData(super::StringArray),
        #[prost(message, tag = "5")]
        ArrayData(super::TemplateArrayValueArray),
        #[prost(message, tag = "6")]
        JsonData(super::JsonArray),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TemplateArrayValueArray {
    #[prost(message, repeated, tag = "1")]
    pub data: Vec<TemplateArrayValue>,
}

// ---- milvus ----

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DescribeCollectionResponse {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
    #[prost(message, optional, tag = "2")]
    pub schema: Option<CollectionSchema>,
    #[prost(int64, tag = "3")]
    pub collection_id: i64,
    #[prost(enumeration = "ConsistencyLevel", tag = "11")]
    pub consistency_level: i32,
    #[prost(string, tag = "12")]
    pub collection_name: String,
    #[prost(message, repeated, tag = "13")]
    pub properties: Vec<KeyValuePair>,
    #[prost(string, tag = "14")]
    pub db_name: String,
    #[prost(int64, tag = "15")]
    pub num_partitions: i64,
}

/// Shared by insert and upsert; the two requests have the same layout.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InsertRequest {
    #[prost(string, tag = "2")]
    pub db_name: String,
    #[prost(string, tag = "3")]
    pub collection_name: String,
    #[prost(string, tag = "4")]
    pub partition_name: String,
    #[prost(message, repeated, tag = "5")]
    pub fields_data: Vec<FieldData>,
    #[prost(uint32, repeated, tag = "6")]
    pub hash_keys: Vec<u32>,
    #[prost(uint32, tag = "7")]
    pub num_rows: u32,
    #[prost(uint64, tag = "8")]
    pub schema_timestamp: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MutationResult {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
    #[prost(message, optional, tag = "2")]
    pub ids: Option<Ids>,
    #[prost(uint32, repeated, tag = "3")]
    pub succ_index: Vec<u32>,
    #[prost(uint32, repeated, tag = "4")]
    pub err_index: Vec<u32>,
    #[prost(bool, tag = "5")]
    pub acknowledged: bool,
    #[prost(int64, tag = "6")]
    pub insert_cnt: i64,
    #[prost(int64, tag = "7")]
    pub delete_cnt: i64,
    #[prost(int64, tag = "8")]
    pub upsert_cnt: i64,
    #[prost(uint64, tag = "9")]
    pub timestamp: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SubSearchRequest {
    #[prost(string, tag = "1")]
    pub dsl: String,
    #[prost(bytes = "vec", tag = "2")]
    pub placeholder_group: Vec<u8>,
    #[prost(enumeration = "DslType", tag = "3")]
    pub dsl_type: i32,
    #[prost(message, repeated, tag = "4")]
    pub search_params: Vec<KeyValuePair>,
    #[prost(int64, tag = "5")]
    pub nq: i64,
    #[prost(map = "string, message", tag = "6")]
    pub expr_template_values: HashMap<String, TemplateValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchRequest {
    #[prost(string, tag = "2")]
    pub db_name: String,
    #[prost(string, tag = "3")]
    pub collection_name: String,
    #[prost(string, repeated, tag = "4")]
    pub partition_names: Vec<String>,
    #[prost(string, tag = "5")]
    pub dsl: String,
    #[prost(bytes = "vec", tag = "6")]
    pub placeholder_group: Vec<u8>,
    #[prost(enumeration = "DslType", tag = "7")]
    pub dsl_type: i32,
    #[prost(string, repeated, tag = "8")]
    pub output_fields: Vec<String>,
    #[prost(message, repeated, tag = "9")]
    pub search_params: Vec<KeyValuePair>,
    #[prost(uint64, tag = "11")]
    pub guarantee_timestamp: u64,
    #[prost(int64, tag = "12")]
    pub nq: i64,
    #[prost(bool, tag = "13")]
    pub not_return_all_meta: bool,
    #[prost(enumeration = "ConsistencyLevel", tag = "14")]
    pub consistency_level: i32,
    #[prost(bool, tag = "15")]
    pub use_default_consistency: bool,
    #[prost(bool, tag = "16")]
    pub search_by_primary_keys: bool,
    #[prost(message, repeated, tag = "17")]
    pub sub_reqs: Vec<SubSearchRequest>,
    #[prost(map = "string, message", tag = "18")]
    pub expr_template_values: HashMap<String, TemplateValue>,
    #[prost(message, optional, tag = "19")]
    pub function_score: Option<FunctionScore>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HybridSearchRequest {
    #[prost(string, tag = "2")]
    pub db_name: String,
    #[prost(string, tag = "3")]
    pub collection_name: String,
    #[prost(string, repeated, tag = "4")]
    pub partition_names: Vec<String>,
    #[prost(message, repeated, tag = "5")]
    pub requests: Vec<SearchRequest>,
    #[prost(message, repeated, tag = "6")]
    pub rank_params: Vec<KeyValuePair>,
    #[prost(uint64, tag = "8")]
    pub guarantee_timestamp: u64,
    #[prost(bool, tag = "9")]
    pub not_return_all_meta: bool,
    #[prost(string, repeated, tag = "10")]
    pub output_fields: Vec<String>,
    #[prost(enumeration = "ConsistencyLevel", tag = "11")]
    pub consistency_level: i32,
    #[prost(bool, tag = "12")]
    pub use_default_consistency: bool,
    #[prost(message, optional, tag = "13")]
    pub function_score: Option<FunctionScore>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SearchResults {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
    #[prost(message, optional, tag = "2")]
    pub results: Option<SearchResultData>,
    #[prost(string, tag = "3")]
    pub collection_name: String,
    #[prost(uint64, tag = "4")]
    pub session_ts: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryRequest {
    #[prost(string, tag = "2")]
    pub db_name: String,
    #[prost(string, tag = "3")]
    pub collection_name: String,
    #[prost(string, tag = "4")]
    pub expr: String,
    #[prost(string, repeated, tag = "5")]
    pub output_fields: Vec<String>,
    #[prost(string, repeated, tag = "6")]
    pub partition_names: Vec<String>,
    #[prost(uint64, tag = "8")]
    pub guarantee_timestamp: u64,
    #[prost(message, repeated, tag = "9")]
    pub query_params: Vec<KeyValuePair>,
    #[prost(bool, tag = "10")]
    pub not_return_all_meta: bool,
    #[prost(enumeration = "ConsistencyLevel", tag = "11")]
    pub consistency_level: i32,
    #[prost(bool, tag = "12")]
    pub use_default_consistency: bool,
    #[prost(map = "string, message", tag = "13")]
    pub expr_template_values: HashMap<String, TemplateValue>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct QueryResults {
    #[prost(message, optional, tag = "1")]
    pub status: Option<Status>,
    #[prost(message, repeated, tag = "2")]
    pub fields_data: Vec<FieldData>,
    #[prost(string, tag = "3")]
    pub collection_name: String,
    #[prost(string, repeated, tag = "4")]
    pub output_fields: Vec<String>,
    #[prost(uint64, tag = "5")]
    pub session_ts: u64,
    #[prost(string, tag = "6")]
    pub primary_field_name: String,
}
