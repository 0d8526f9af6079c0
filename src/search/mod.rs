pub mod params;
pub mod query;
pub mod request;
pub mod result;
pub mod template;

pub use params::{ build_search_params, rerank_function, KeyValueBlock, RerankSpec, SearchQuery };
pub use query::{ build_query_request, QuerySpec };
pub use request::{
    build_search_request,
    resolve_vector_field,
    BuiltSearch,
    SearchQueries,
    SearchRequestSpec,
    WireSearchRequest,
};
pub use result::{ format_query_result, format_search_result, id_values, FormatOptions, SearchOutcome, SCORE_KEY };
pub use template::format_expr_values;
