pub mod milvus;

use async_trait::async_trait;
use serde::{ Deserialize, Serialize };
use std::error::Error;
use log::info;

use crate::config::CodecConfig;
use crate::proto::{
    DescribeCollectionResponse,
    HybridSearchRequest,
    InsertRequest,
    MutationResult,
    QueryRequest,
    QueryResults,
    SearchRequest,
    SearchResults,
};
use crate::registry::{ ConsistencyLevel, DataType };

pub use milvus::{ MilvusDataClient, MutationSummary };

/// Moves prost messages to a Milvus proxy and back. Connection handling,
/// authentication and retries live behind this trait.
#[async_trait]
pub trait MilvusTransport: Send + Sync {
    async fn describe_collection(
        &self,
        db_name: &str,
        collection_name: &str
    ) -> Result<DescribeCollectionResponse, Box<dyn Error + Send + Sync>>;

    async fn insert(&self, request: InsertRequest) -> Result<MutationResult, Box<dyn Error + Send + Sync>>;

    async fn upsert(&self, request: InsertRequest) -> Result<MutationResult, Box<dyn Error + Send + Sync>>;

    async fn search(&self, request: SearchRequest) -> Result<SearchResults, Box<dyn Error + Send + Sync>>;

    async fn hybrid_search(
        &self,
        request: HybridSearchRequest
    ) -> Result<SearchResults, Box<dyn Error + Send + Sync>>;

    async fn query(&self, request: QueryRequest) -> Result<QueryResults, Box<dyn Error + Send + Sync>>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub db_name: String,
    /// Partition written to when a call names none.
    pub partition_name: Option<String>,
    pub codec: CodecConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            db_name: "default".to_string(),
            partition_name: None,
            codec: CodecConfig::default(),
        }
    }
}

pub fn create_data_client<T: MilvusTransport>(transport: T, config: ClientConfig) -> MilvusDataClient<T> {
    info!(
        "Creating Milvus data client for db: {}, consistency: {:?}",
        config.db_name,
        config.codec.consistency_level
    );
    MilvusDataClient::new(transport, config)
}

pub fn get_consistency_level(level_str: &str) -> Result<ConsistencyLevel, String> {
    level_str.parse()
}

pub fn get_data_type(type_str: &str) -> Result<DataType, String> {
    type_str.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels_and_types_case_insensitively() {
        assert_eq!(get_consistency_level("STRONG"), Ok(ConsistencyLevel::Strong));
        assert!(get_consistency_level("eventual-ish").is_err());
        assert_eq!(get_data_type("FloatVector"), Ok(DataType::FloatVector));
        assert!(get_data_type("Tensor").is_err());
    }

    #[test]
    fn client_config_fills_missing_keys() {
        let config: ClientConfig = serde_json::from_str(r#"{"partition_name": "p1"}"#).unwrap();
        assert_eq!(config.db_name, "default");
        assert_eq!(config.partition_name.as_deref(), Some("p1"));
        assert_eq!(config.codec, CodecConfig::default());
    }
}
