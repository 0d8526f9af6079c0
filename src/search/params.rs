//! Per-query search parameters and rank specifications.

use serde_json::{ json, Map, Value };

use crate::error::{ MarshalError, Result };
use crate::proto::{ FunctionScore, KeyValuePair };
use crate::registry::FunctionType;
use crate::schema::FunctionDescriptor;
use crate::value::{ param_string, FieldValue };

/// Insertion-ordered key/value block. Setting an existing key replaces its
/// value in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyValueBlock {
    pairs: Vec<(String, String)>,
}

impl KeyValueBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        let key = key.into();
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => {
                slot.1 = value;
            }
            None => self.pairs.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn into_pairs(self) -> Vec<KeyValuePair> {
        self.pairs
            .into_iter()
            .map(|(k, v)| KeyValuePair::new(k, v))
            .collect()
    }
}

/// One vector search against one field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchQuery {
    /// Target vector field; `struct[member]` addresses a struct-array member.
    pub anns_field: Option<String>,
    /// A vector, a batch of vectors, a sparse vector, or query text.
    pub data: FieldValue,
    pub filter: Option<String>,
    /// Values bound to `{name}` placeholders in `filter`.
    pub filter_params: Map<String, Value>,
    pub limit: Option<usize>,
    /// Older spelling of `limit`; `limit` wins when both are set.
    pub topk: Option<usize>,
    pub offset: Option<usize>,
    pub metric_type: Option<String>,
    /// Index search parameters (`nprobe`, `ef`, `radius`, `drop_ratio_search` ...).
    pub params: Map<String, Value>,
    pub ignore_growing: Option<bool>,
    pub group_by_field: Option<String>,
    pub group_size: Option<usize>,
    pub strict_group_size: Option<bool>,
    pub hints: Option<String>,
}

impl SearchQuery {
    pub fn new<D: Into<FieldValue>>(data: D) -> Self {
        SearchQuery {
            data: data.into(),
            ..Default::default()
        }
    }

    pub fn field<S: Into<String>>(mut self, name: S) -> Self {
        self.anns_field = Some(name.into());
        self
    }

    pub fn filter<S: Into<String>>(mut self, expr: S) -> Self {
        self.filter = Some(expr.into());
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

    pub fn metric<S: Into<String>>(mut self, metric_type: S) -> Self {
        self.metric_type = Some(metric_type.into());
        self
    }

    pub fn param<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn group_by<S: Into<String>>(mut self, field: S, group_size: Option<usize>, strict: bool) -> Self {
        self.group_by_field = Some(field.into());
        self.group_size = group_size;
        self.strict_group_size = Some(strict);
        self
    }

    pub fn hints<S: Into<String>>(mut self, hints: S) -> Self {
        self.hints = Some(hints.into());
        self
    }

    pub fn effective_limit(&self, default_topk: usize) -> usize {
        self.limit.or(self.topk).unwrap_or(default_topk)
    }
}

/// Flattens a query's parameters into the wire key/value block.
///
/// Structured keys come first in a fixed order. Every raw `params` key is
/// applied afterwards, so a raw key overrides a structured one of the same
/// name.
pub fn build_search_params(query: &SearchQuery, anns_field: &str, default_topk: usize) -> Vec<KeyValuePair> {
    let mut block = KeyValueBlock::new();
    block.set("anns_field", anns_field);
    block.set("params", Value::Object(query.params.clone()).to_string());
    block.set("topk", query.effective_limit(default_topk).to_string());
    block.set("offset", query.offset.unwrap_or(0).to_string());
    block.set("metric_type", query.metric_type.clone().unwrap_or_default());
    block.set("ignore_growing", query.ignore_growing.unwrap_or(false).to_string());

    if let Some(field) = query.group_by_field.as_deref().filter(|f| !f.is_empty()) {
        block.set("group_by_field", field);
    }
    if query.strict_group_size == Some(true) {
        block.set("strict_group_size", "true");
    }
    if let Some(size) = query.group_size.filter(|s| *s > 0) {
        block.set("group_size", size.to_string());
    }
    if let Some(hints) = query.hints.as_deref().filter(|h| !h.is_empty()) {
        block.set("hints", hints);
    }

    for (key, value) in &query.params {
        block.set(key.clone(), param_string(value));
    }
    block.into_pairs()
}

/// How per-field results of a hybrid search are fused.
#[derive(Debug, Clone, PartialEq)]
pub enum RerankSpec {
    /// Reciprocal rank fusion.
    Rrf { k: u32 },
    Weighted { weights: Vec<f64>, norm_score: Option<bool> },
    /// Server-side rerank function, sent as a function score.
    Function(FunctionDescriptor),
}

impl RerankSpec {
    pub fn rrf(k: u32) -> Self {
        RerankSpec::Rrf { k }
    }

    pub fn weighted(weights: Vec<f64>) -> Self {
        RerankSpec::Weighted { weights, norm_score: None }
    }

    pub fn function(function: FunctionDescriptor) -> Self {
        RerankSpec::Function(function)
    }

    /// Reads a caller-supplied ranker object. An object carrying `type` is a
    /// function; otherwise `strategy` names `rrf` or `weighted`.
    pub fn from_json(value: &Value) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| MarshalError::search_config("Rerank must be an object"))?;
        if obj.contains_key("type") {
            let function: FunctionDescriptor = serde_json::from_value(value.clone())?;
            return Ok(RerankSpec::Function(function));
        }
        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        match obj.get("strategy").and_then(Value::as_str) {
            Some("rrf") => {
                let k = params
                    .get("k")
                    .and_then(Value::as_u64)
                    .unwrap_or(crate::config::DEFAULT_RRF_K as u64);
                Ok(RerankSpec::rrf(k as u32))
            }
            Some("weighted") => {
                let weights = params
                    .get("weights")
                    .and_then(Value::as_array)
                    .ok_or_else(|| MarshalError::search_config("Weighted ranker requires a weights array"))?
                    .iter()
                    .map(|w| w.as_f64().ok_or_else(|| MarshalError::search_config("Ranker weights must be numbers")))
                    .collect::<Result<Vec<f64>>>()?;
                let norm_score = params.get("norm_score").and_then(Value::as_bool);
                Ok(RerankSpec::Weighted { weights, norm_score })
            }
            Some(other) => Err(MarshalError::search_config(format!("Unsupported rank strategy: {}", other))),
            None => Err(MarshalError::search_config("Rerank object has neither a strategy nor a type")),
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, RerankSpec::Function(_))
    }

    /// `strategy` and `params` entries of the rank block. Empty for a
    /// function reranker.
    pub fn rank_entries(&self) -> Vec<KeyValuePair> {
        let (strategy, params) = match self {
            RerankSpec::Rrf { k } => ("rrf", json!({ "k": k })),
            RerankSpec::Weighted { weights, norm_score } => {
                let mut params = json!({ "weights": weights });
                if let Some(norm) = norm_score {
                    params["norm_score"] = Value::Bool(*norm);
                }
                ("weighted", params)
            }
            RerankSpec::Function(_) => {
                return Vec::new();
            }
        };
        vec![KeyValuePair::new("strategy", strategy), KeyValuePair::new("params", params.to_string())]
    }

    pub fn function_score(&self) -> Option<FunctionScore> {
        match self {
            RerankSpec::Function(function) =>
                Some(FunctionScore {
                    functions: vec![function.to_proto()],
                    params: Vec::new(),
                }),
            _ => None,
        }
    }
}

/// Shorthand for a function reranker built from a name and params.
pub fn rerank_function<S: Into<String>>(name: S, input_fields: &[&str], params: Map<String, Value>) -> RerankSpec {
    let mut function = FunctionDescriptor::new(name, FunctionType::Rerank);
    function.input_field_names = input_fields
        .iter()
        .map(|f| f.to_string())
        .collect();
    function.params = params;
    RerankSpec::Function(function)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_pairs(kvs: &[KeyValuePair]) -> Vec<(&str, &str)> {
        kvs.iter()
            .map(|kv| (kv.key.as_str(), kv.value.as_str()))
            .collect()
    }

    #[test]
    fn structured_keys_come_in_order() {
        let query = SearchQuery::new(vec![0.1f32, 0.2]).limit(10);
        let pairs = build_search_params(&query, "vec", 100);
        assert_eq!(
            as_pairs(&pairs),
            vec![
                ("anns_field", "vec"),
                ("params", "{}"),
                ("topk", "10"),
                ("offset", "0"),
                ("metric_type", ""),
                ("ignore_growing", "false")
            ]
        );
    }

    #[test]
    fn raw_params_are_flattened_last_and_win() {
        let query = SearchQuery::new(vec![0.1f32])
            .param("nprobe", 16)
            .param("topk", 7)
            .group_by("category", Some(3), true)
            .hints("iterative_filter");
        let pairs = build_search_params(&query, "vec", 100);
        let block = as_pairs(&pairs);
        assert_eq!(block[1], ("params", "{\"nprobe\":16,\"topk\":7}"));
        assert_eq!(block[2], ("topk", "7"));
        assert_eq!(
            &block[6..],
            &[
                ("group_by_field", "category"),
                ("strict_group_size", "true"),
                ("group_size", "3"),
                ("hints", "iterative_filter"),
                ("nprobe", "16"),
            ]
        );
    }

    #[test]
    fn limit_falls_back_to_topk_then_default() {
        let mut query = SearchQuery::new(vec![1.0f32]);
        assert_eq!(query.effective_limit(100), 100);
        query.topk = Some(5);
        assert_eq!(query.effective_limit(100), 5);
        query.limit = Some(3);
        assert_eq!(query.effective_limit(100), 3);
    }

    #[test]
    fn rank_entries_per_strategy() {
        assert_eq!(
            as_pairs(&RerankSpec::rrf(60).rank_entries()),
            vec![("strategy", "rrf"), ("params", "{\"k\":60}")]
        );
        assert_eq!(
            as_pairs(&RerankSpec::weighted(vec![0.8, 0.2]).rank_entries()),
            vec![("strategy", "weighted"), ("params", "{\"weights\":[0.8,0.2]}")]
        );
        let function = rerank_function("decay", &["ts"], Map::new());
        assert!(function.rank_entries().is_empty());
        let score = function.function_score().unwrap();
        assert_eq!(score.functions[0].name, "decay");
        assert_eq!(score.functions[0].input_field_names, vec!["ts"]);
        assert!(score.params.is_empty());
    }

    #[test]
    fn rerank_objects_are_recognized() {
        let rrf = RerankSpec::from_json(&json!({"strategy": "rrf", "params": {"k": 20}})).unwrap();
        assert_eq!(rrf, RerankSpec::rrf(20));
        let weighted = RerankSpec::from_json(
            &json!({"strategy": "weighted", "params": {"weights": [1.0], "norm_score": true}})
        ).unwrap();
        assert_eq!(weighted, RerankSpec::Weighted { weights: vec![1.0], norm_score: Some(true) });
        let function = RerankSpec::from_json(
            &json!({"name": "r", "type": "Rerank", "input_field_names": ["ts"], "params": {"reranker": "decay"}})
        ).unwrap();
        assert!(function.is_function());
        assert!(RerankSpec::from_json(&json!({"strategy": "bogus"})).is_err());
        assert!(RerankSpec::from_json(&json!({})).is_err());
    }
}
