//! Client-side marshaling core for the Milvus vector database: row/column
//! codecs, schema formatting, search request shaping and result decoding.

pub mod codec;
pub mod collection;
pub mod config;
pub mod db;
pub mod error;
pub mod proto;
pub mod registry;
pub mod schema;
pub mod search;
pub mod value;

pub use codec::{ build_columns, parse_columns, Transformers, VectorTransformer };
pub use collection::{ format_collection_schema, CollectionDeclaration, FieldDeclaration, FormattedSchema };
pub use config::CodecConfig;
pub use db::{ create_data_client, get_consistency_level, get_data_type, ClientConfig, MilvusDataClient, MilvusTransport, MutationSummary };
pub use error::{ MarshalError, Result };
pub use registry::{ ConsistencyLevel, DataType, FunctionType };
pub use schema::{ CollectionSchema, FieldDescriptor, FunctionDescriptor };
pub use search::{
    format_query_result,
    format_search_result,
    FormatOptions,
    QuerySpec,
    RerankSpec,
    SearchOutcome,
    SearchQuery,
    SearchRequestSpec,
};
pub use value::{ FieldValue, RowData, SparseVector };
