//! Builds wire search requests from caller queries and a described schema.

use bytes::BytesMut;
use log::debug;
use prost::Message;
use serde_json::{ Map, Value };

use super::params::{ build_search_params, RerankSpec, SearchQuery };
use super::template::format_expr_values;
use crate::codec::bytes::{ pack_vector, Transformers };
use crate::config::CodecConfig;
use crate::error::{ MarshalError, Result };
use crate::proto::{
    HybridSearchRequest,
    KeyValuePair,
    PlaceholderGroup,
    PlaceholderValue,
    SearchRequest,
};
use crate::registry::{ ConsistencyLevel, DslType, PlaceholderType, VectorKind };
use crate::schema::{ CollectionSchema, FieldDescriptor };
use crate::value::{ FieldValue, SparseFormat, SparseVector };

/// A single search, or several searches fused by a ranker.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchQueries {
    Single(SearchQuery),
    Hybrid(Vec<SearchQuery>),
}

/// Everything needed to build one search call.
///
/// `limit`, `offset`, `filter` and `filter_params` are defaults inherited
/// by every query that leaves them unset. For a hybrid search `limit` and
/// `offset` also apply to the fused result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequestSpec {
    pub collection_name: String,
    pub partition_names: Vec<String>,
    /// Empty means the configured default (`*`).
    pub output_fields: Vec<String>,
    pub consistency_level: Option<ConsistencyLevel>,
    /// Score truncation applied to results; `-1` disables it.
    pub round_decimal: Option<i32>,
    pub rerank: Option<RerankSpec>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub filter: Option<String>,
    pub filter_params: Map<String, Value>,
    pub queries: SearchQueries,
}

impl SearchRequestSpec {
    pub fn single<S: Into<String>>(collection_name: S, query: SearchQuery) -> Self {
        Self::with_queries(collection_name.into(), SearchQueries::Single(query))
    }

    pub fn hybrid<S: Into<String>>(collection_name: S, queries: Vec<SearchQuery>) -> Self {
        Self::with_queries(collection_name.into(), SearchQueries::Hybrid(queries))
    }

    fn with_queries(collection_name: String, queries: SearchQueries) -> Self {
        SearchRequestSpec {
            collection_name,
            partition_names: Vec::new(),
            output_fields: Vec::new(),
            consistency_level: None,
            round_decimal: None,
            rerank: None,
            limit: None,
            offset: None,
            filter: None,
            filter_params: Map::new(),
            queries,
        }
    }

    pub fn output_fields<I, S>(mut self, fields: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> {
        self.output_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn partitions<I, S>(mut self, names: I) -> Self where I: IntoIterator<Item = S>, S: Into<String> {
        self.partition_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn rerank(mut self, rerank: RerankSpec) -> Self {
        self.rerank = Some(rerank);
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

    pub fn filter<S: Into<String>>(mut self, expr: S) -> Self {
        self.filter = Some(expr.into());
        self
    }

    pub fn round_decimal(mut self, digits: i32) -> Self {
        self.round_decimal = Some(digits);
        self
    }

    pub fn consistency(mut self, level: ConsistencyLevel) -> Self {
        self.consistency_level = Some(level);
        self
    }

    pub fn is_hybrid(&self) -> bool {
        matches!(self.queries, SearchQueries::Hybrid(_))
    }

    /// Applies the request-level defaults to one query.
    fn inherit(&self, query: &SearchQuery) -> SearchQuery {
        let mut query = query.clone();
        if query.limit.is_none() && query.topk.is_none() {
            query.limit = self.limit;
        }
        if query.offset.is_none() {
            query.offset = self.offset;
        }
        if query.filter.is_none() {
            query.filter = self.filter.clone();
        }
        if query.filter_params.is_empty() {
            query.filter_params = self.filter_params.clone();
        }
        query
    }

    /// Explicit setting first, then a `round_decimal` key in the first
    /// query's params.
    fn effective_round_decimal(&self) -> i32 {
        if let Some(digits) = self.round_decimal {
            return digits;
        }
        let first = match &self.queries {
            SearchQueries::Single(query) => Some(query),
            SearchQueries::Hybrid(queries) => queries.first(),
        };
        first
            .and_then(|q| q.params.get("round_decimal"))
            .and_then(Value::as_i64)
            .map(|d| d as i32)
            .unwrap_or(-1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WireSearchRequest {
    Single(SearchRequest),
    Hybrid(HybridSearchRequest),
}

/// A built request plus what the result formatter needs to read its answer.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltSearch {
    pub request: WireSearchRequest,
    /// Logical query count of the (first) sub-request.
    pub nq: usize,
    pub round_decimal: i32,
}

/// Builds a single or hybrid search request.
///
/// A hybrid request without a ranker gets reciprocal rank fusion with the
/// configured `k`. A function ranker is sent as a function score and no
/// strategy entries are added; on a single search it is the only ranker
/// honored.
pub fn build_search_request(
    spec: &SearchRequestSpec,
    schema: &CollectionSchema,
    config: &CodecConfig,
    transformers: &Transformers
) -> Result<BuiltSearch> {
    let round_decimal = spec.effective_round_decimal();
    let function_score = spec.rerank.as_ref().and_then(RerankSpec::function_score);

    match &spec.queries {
        SearchQueries::Single(query) => {
            let mut request = build_sub_request(spec, &spec.inherit(query), schema, config, transformers)?;
            let nq = request.nq as usize;
            if let Some(rerank) = spec.rerank.as_ref().filter(|r| !r.is_function()) {
                debug!("Ignoring {:?} ranker on a single-field search", rerank);
            }
            request.function_score = function_score;
            debug!(
                "Built search on '{}' (nq={}, {} placeholder bytes)",
                spec.collection_name,
                nq,
                request.placeholder_group.len()
            );
            Ok(BuiltSearch {
                request: WireSearchRequest::Single(request),
                nq,
                round_decimal,
            })
        }
        SearchQueries::Hybrid(queries) => {
            if queries.is_empty() {
                return Err(MarshalError::search_config("Hybrid search requires at least one sub-query"));
            }
            let mut requests = Vec::with_capacity(queries.len());
            for query in queries {
                requests.push(build_sub_request(spec, &spec.inherit(query), schema, config, transformers)?);
            }
            let nq = requests[0].nq as usize;

            let mut rank_params = match &spec.rerank {
                Some(rerank) => rerank.rank_entries(),
                None => RerankSpec::rrf(config.rrf_k).rank_entries(),
            };
            rank_params.push(KeyValuePair::new("round_decimal", round_decimal.to_string()));
            rank_params.push(KeyValuePair::new("limit", spec.limit.unwrap_or(config.default_topk).to_string()));
            rank_params.push(KeyValuePair::new("offset", spec.offset.unwrap_or(0).to_string()));

            let output_fields = requests[0].output_fields.clone();
            let consistency_level = requests[0].consistency_level;
            debug!(
                "Built hybrid search on '{}' with {} sub-requests (nq={})",
                spec.collection_name,
                requests.len(),
                nq
            );
            Ok(BuiltSearch {
                request: WireSearchRequest::Hybrid(HybridSearchRequest {
                    collection_name: spec.collection_name.clone(),
                    partition_names: spec.partition_names.clone(),
                    requests,
                    rank_params,
                    output_fields,
                    consistency_level,
                    function_score,
                    ..Default::default()
                }),
                nq,
                round_decimal,
            })
        }
    }
}

fn build_sub_request(
    spec: &SearchRequestSpec,
    query: &SearchQuery,
    schema: &CollectionSchema,
    config: &CodecConfig,
    transformers: &Transformers
) -> Result<SearchRequest> {
    let (anns_field, field) = resolve_vector_field(schema, query.anns_field.as_deref())?;
    let placeholder_type = field.placeholder_type;
    let values = shape_query_data(&anns_field, placeholder_type, &query.data, transformers)?;
    let nq = values.len();
    let placeholder_group = encode_placeholder_group(placeholder_type, values)?;

    let output_fields = if spec.output_fields.is_empty() {
        config.default_output_fields.clone()
    } else {
        spec.output_fields.clone()
    };
    let consistency = spec.consistency_level.unwrap_or(schema.consistency_level);

    Ok(SearchRequest {
        collection_name: spec.collection_name.clone(),
        partition_names: spec.partition_names.clone(),
        dsl: query.filter.clone().unwrap_or_default(),
        placeholder_group,
        dsl_type: DslType::BoolExprV1 as i32,
        output_fields,
        search_params: build_search_params(query, &anns_field, config.default_topk),
        nq: nq as i64,
        consistency_level: consistency as i32,
        expr_template_values: format_expr_values(&query.filter_params)?,
        ..Default::default()
    })
}

/// Finds the searched field. Without a name the collection must have
/// exactly one vector field.
pub fn resolve_vector_field<'a>(
    schema: &'a CollectionSchema,
    requested: Option<&str>
) -> Result<(String, &'a FieldDescriptor)> {
    if let Some(name) = requested {
        return schema
            .vector_field(name)
            .map(|field| (name.to_string(), field))
            .ok_or_else(|| {
                MarshalError::search_config(
                    format!("Vector field '{}' not found in collection '{}'", name, schema.name)
                )
            });
    }
    let names = schema.vector_field_names();
    match names.as_slice() {
        [] => Err(MarshalError::search_config(format!("Collection '{}' has no vector field", schema.name))),
        [only] => {
            let field = schema
                .vector_field(only)
                .ok_or_else(|| MarshalError::search_config(format!("Vector field '{}' not found", only)))?;
            Ok((only.clone(), field))
        }
        several =>
            Err(
                MarshalError::search_config(
                    format!(
                        "Collection '{}' has several vector fields ({}); name the one to search",
                        schema.name,
                        several.join(", ")
                    )
                )
            ),
    }
}

/// Turns query data into placeholder entries, one per logical query.
fn shape_query_data(
    field: &str,
    placeholder_type: PlaceholderType,
    data: &FieldValue,
    transformers: &Transformers
) -> Result<Vec<Vec<u8>>> {
    let bad = |reason: String| MarshalError::search_config(format!("Search data for '{}': {}", field, reason));
    if data.is_null() {
        return Err(bad("no search data".to_string()));
    }

    if placeholder_type == PlaceholderType::VarChar {
        return match data.as_str() {
            Some(text) => Ok(vec![text.as_bytes().to_vec()]),
            None =>
                list_items(data)
                    .ok_or_else(|| bad("expected query text".to_string()))?
                    .iter()
                    .map(|item|
                        item
                            .as_str()
                            .map(|t| t.as_bytes().to_vec())
                            .ok_or_else(|| bad("expected query text".to_string()))
                    )
                    .collect(),
        };
    }

    let kind = placeholder_type
        .vector_kind()
        .ok_or_else(|| bad(format!("{:?} fields cannot be searched", placeholder_type)))?;

    if placeholder_type.is_emb_list() {
        if kind == VectorKind::Sparse {
            return Err(bad("embedding-list search over sparse members is not supported".to_string()));
        }
        // One item is a list of vectors; a list of such lists is a batch.
        let items = list_items(data).ok_or_else(|| bad("expected a list of vectors".to_string()))?;
        let batch = items
            .first()
            .and_then(list_items)
            .map_or(false, |inner| inner.first().map_or(false, is_list));
        let groups = if batch { items } else { vec![data.clone()] };
        return groups
            .iter()
            .map(|group| {
                let vectors = list_items(group).ok_or_else(|| bad("expected a list of vectors".to_string()))?;
                let mut entry = Vec::new();
                for vector in &vectors {
                    entry.extend(pack_vector(kind, vector, transformers).map_err(&bad)?.into_bytes());
                }
                Ok(entry)
            })
            .collect();
    }

    if kind == VectorKind::Sparse {
        return shape_sparse(data).map_err(bad);
    }

    let vectors = if is_batch(data) {
        list_items(data).unwrap_or_default()
    } else {
        vec![data.clone()]
    };
    if vectors.is_empty() {
        return Err(bad("no search data".to_string()));
    }
    vectors
        .iter()
        .map(|v| {
            pack_vector(kind, v, transformers)
                .map(|packed| packed.into_bytes())
                .map_err(&bad)
        })
        .collect()
}

/// A recognizable sparse shape is one query; anything else is a batch.
fn shape_sparse(data: &FieldValue) -> std::result::Result<Vec<Vec<u8>>, String> {
    let one = |value: &FieldValue| -> std::result::Result<Vec<u8>, String> {
        match value {
            FieldValue::Sparse(sparse) => Ok(sparse.to_bytes()),
            other => SparseVector::from_json(&other.to_json()).map(|s| s.to_bytes()),
        }
    };
    match data {
        FieldValue::Sparse(sparse) => Ok(vec![sparse.to_bytes()]),
        FieldValue::Array(items) => items.iter().map(one).collect(),
        other => {
            let json = other.to_json();
            match SparseFormat::classify(&json) {
                SparseFormat::Unknown =>
                    match json {
                        Value::Array(items) =>
                            items
                                .iter()
                                .map(|item| SparseVector::from_json(item).map(|s| s.to_bytes()))
                                .collect(),
                        _ => Err("unrecognized sparse vector format".to_string()),
                    }
                _ => Ok(vec![one(other)?]),
            }
        }
    }
}

fn encode_placeholder_group(placeholder_type: PlaceholderType, values: Vec<Vec<u8>>) -> Result<Vec<u8>> {
    let group = PlaceholderGroup {
        placeholders: vec![PlaceholderValue {
            tag: "$0".to_string(),
            r#type: placeholder_type as i32,
            values,
        }],
    };
    let mut buf = BytesMut::with_capacity(group.encoded_len());
    group.encode(&mut buf)?;
    Ok(buf.to_vec())
}

fn is_list(value: &FieldValue) -> bool {
    matches!(
        value,
        FieldValue::Array(_) |
            FieldValue::Json(Value::Array(_)) |
            FieldValue::FloatVector(_) |
            FieldValue::Bytes(_) |
            FieldValue::Int8Vector(_)
    )
}

/// True when `data` is a list whose first element is itself a vector.
fn is_batch(data: &FieldValue) -> bool {
    match data {
        FieldValue::Array(items) => items.first().map_or(false, is_list),
        FieldValue::Json(Value::Array(items)) => items.first().map_or(false, Value::is_array),
        _ => false,
    }
}

fn list_items(value: &FieldValue) -> Option<Vec<FieldValue>> {
    match value {
        FieldValue::Array(items) => Some(items.clone()),
        FieldValue::Json(Value::Array(items)) => Some(items.iter().cloned().map(FieldValue::from).collect()),
        _ => None,
    }
}
