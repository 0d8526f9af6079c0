//! Scalar query requests.

use serde_json::{ Map, Value };

use super::template::format_expr_values;
use crate::config::CodecConfig;
use crate::error::{ MarshalError, Result };
use crate::proto::{ KeyValuePair, QueryRequest };
use crate::registry::ConsistencyLevel;
use crate::schema::CollectionSchema;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuerySpec {
    pub collection_name: String,
    pub filter: String,
    pub filter_params: Map<String, Value>,
    /// Empty means the configured default (`*`).
    pub output_fields: Vec<String>,
    pub partition_names: Vec<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub consistency_level: Option<ConsistencyLevel>,
}

impl QuerySpec {
    pub fn new<C: Into<String>, F: Into<String>>(collection_name: C, filter: F) -> Self {
        QuerySpec {
            collection_name: collection_name.into(),
            filter: filter.into(),
            ..Default::default()
        }
    }

    pub fn output_fields<I, S>(mut self, fields: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> {
        self.output_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter_param<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.filter_params.insert(key.into(), value.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// A query without a filter must bound its result with `limit`.
pub fn build_query_request(spec: &QuerySpec, schema: &CollectionSchema, config: &CodecConfig) -> Result<QueryRequest> {
    if spec.filter.trim().is_empty() && spec.limit.is_none() {
        return Err(MarshalError::search_config("A query needs a filter or a limit"));
    }
    let mut query_params = Vec::new();
    if let Some(limit) = spec.limit {
        query_params.push(KeyValuePair::new("limit", limit.to_string()));
    }
    if let Some(offset) = spec.offset {
        query_params.push(KeyValuePair::new("offset", offset.to_string()));
    }
    let output_fields = if spec.output_fields.is_empty() {
        config.default_output_fields.clone()
    } else {
        spec.output_fields.clone()
    };
    Ok(QueryRequest {
        collection_name: spec.collection_name.clone(),
        expr: spec.filter.clone(),
        output_fields,
        partition_names: spec.partition_names.clone(),
        query_params,
        consistency_level: spec.consistency_level.unwrap_or(schema.consistency_level) as i32,
        expr_template_values: format_expr_values(&spec.filter_params)?,
        ..Default::default()
    })
}
