use serde::{ Deserialize, Serialize };

use crate::registry::ConsistencyLevel;
use crate::schema::DEFAULT_DYNAMIC_FIELD;

pub const DEFAULT_TOPK: usize = 100;
pub const DEFAULT_RRF_K: u32 = 60;

/// Defaults applied while shaping requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Dynamic column name used when the described schema does not name one.
    pub dynamic_field_name: String,
    /// Used when neither `limit` nor `topk` is given.
    pub default_topk: usize,
    /// `k` of the reciprocal-rank ranker injected into hybrid requests.
    pub rrf_k: u32,
    /// Fallback when neither the request nor the described collection sets one.
    pub consistency_level: ConsistencyLevel,
    /// Output fields requested when the caller names none.
    pub default_output_fields: Vec<String>,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            dynamic_field_name: DEFAULT_DYNAMIC_FIELD.to_string(),
            default_topk: DEFAULT_TOPK,
            rrf_k: DEFAULT_RRF_K,
            consistency_level: ConsistencyLevel::Bounded,
            default_output_fields: vec!["*".to_string()],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: CodecConfig = serde_json::from_str(r#"{"rrf_k": 20}"#).unwrap();
        assert_eq!(config.rrf_k, 20);
        assert_eq!(config.default_topk, DEFAULT_TOPK);
        assert_eq!(config.consistency_level, ConsistencyLevel::Bounded);
        assert_eq!(config.dynamic_field_name, "$meta");
    }
}
