use prost::Message;
use serde_json::{ json, Map };

use milvus_marshal::codec::Transformers;
use milvus_marshal::collection::{ format_collection_schema, CollectionDeclaration, FieldDeclaration };
use milvus_marshal::config::CodecConfig;
use milvus_marshal::error::{ MarshalError, Result };
use milvus_marshal::proto::{
    field_data,
    ids,
    scalar_field,
    FieldData,
    HybridSearchRequest,
    Ids,
    KeyValuePair,
    LongArray,
    PlaceholderGroup,
    ScalarField,
    SearchRequest,
    SearchResultData,
    StringArray,
};
use milvus_marshal::registry::{ ConsistencyLevel, DataType, PlaceholderType };
use milvus_marshal::schema::CollectionSchema;
use milvus_marshal::search::{
    build_search_request,
    format_search_result,
    rerank_function,
    FormatOptions,
    RerankSpec,
    SearchOutcome,
    SearchQuery,
    SearchRequestSpec,
    WireSearchRequest,
};
use milvus_marshal::value::FieldValue;

fn two_vector_schema() -> Result<CollectionSchema> {
    let declaration = CollectionDeclaration {
        name: "articles".into(),
        fields: vec![
            FieldDeclaration::new("id", DataType::Int64).primary_key(true),
            FieldDeclaration::new("title", DataType::VarChar).max_length(128),
            FieldDeclaration::new("dense", DataType::FloatVector).dim(2),
            FieldDeclaration::new("sparse", DataType::SparseFloatVector)
        ],
        ..Default::default()
    };
    format_collection_schema(&declaration)?.collection_schema(ConsistencyLevel::Bounded)
}

fn hybrid_spec() -> SearchRequestSpec {
    SearchRequestSpec::hybrid(
        "articles",
        vec![
            SearchQuery::new(vec![0.1f32, 0.2]).field("dense"),
            SearchQuery::new(FieldValue::from(json!({"7": 0.4}))).field("sparse")
        ]
    )
}

fn build(spec: &SearchRequestSpec) -> Result<WireSearchRequest> {
    let schema = two_vector_schema()?;
    Ok(build_search_request(spec, &schema, &CodecConfig::default(), &Transformers::new())?.request)
}

fn hybrid(request: WireSearchRequest) -> HybridSearchRequest {
    match request {
        WireSearchRequest::Hybrid(request) => request,
        other => panic!("expected a hybrid request, got {:?}", other),
    }
}

fn single(request: WireSearchRequest) -> SearchRequest {
    match request {
        WireSearchRequest::Single(request) => request,
        other => panic!("expected a single request, got {:?}", other),
    }
}

fn param<'a>(pairs: &'a [KeyValuePair], key: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|p| p.key == key)
        .map(|p| p.value.as_str())
}

#[test]
fn hybrid_without_ranker_uses_reciprocal_rank_fusion() -> Result<()> {
    let request = hybrid(build(&hybrid_spec())?);
    assert_eq!(request.requests.len(), 2);
    assert_eq!(param(&request.rank_params, "strategy"), Some("rrf"));
    assert_eq!(param(&request.rank_params, "params"), Some(r#"{"k":60}"#));
    assert_eq!(param(&request.rank_params, "round_decimal"), Some("-1"));
    assert_eq!(param(&request.rank_params, "limit"), Some("100"));
    assert_eq!(param(&request.rank_params, "offset"), Some("0"));
    assert!(request.function_score.is_none());
    Ok(())
}

#[test]
fn hybrid_with_weighted_ranker_keeps_its_weights() -> Result<()> {
    let spec = hybrid_spec().rerank(RerankSpec::weighted(vec![0.7, 0.3])).limit(5);
    let request = hybrid(build(&spec)?);
    assert_eq!(param(&request.rank_params, "strategy"), Some("weighted"));
    assert_eq!(param(&request.rank_params, "params"), Some(r#"{"weights":[0.7,0.3]}"#));
    assert_eq!(param(&request.rank_params, "limit"), Some("5"));
    for sub in &request.requests {
        assert_eq!(param(&sub.search_params, "topk"), Some("5"));
    }
    Ok(())
}

#[test]
fn hybrid_with_function_ranker_sends_a_function_score() -> Result<()> {
    let mut params = Map::new();
    params.insert("reranker".into(), json!("decay"));
    let spec = hybrid_spec().rerank(rerank_function("recency", &["id"], params));
    let request = hybrid(build(&spec)?);
    assert_eq!(param(&request.rank_params, "strategy"), None);
    assert!(param(&request.rank_params, "limit").is_some());
    let score = request.function_score.expect("function score");
    assert_eq!(score.functions.len(), 1);
    assert_eq!(score.functions[0].name, "recency");
    Ok(())
}

#[test]
fn index_params_are_json_encoded_and_flattened() -> Result<()> {
    let query = SearchQuery::new(vec![0.5f32, 0.5]).field("dense").param("nprobe", 10).metric("IP").limit(3);
    let request = single(build(&SearchRequestSpec::single("articles", query))?);
    assert_eq!(param(&request.search_params, "anns_field"), Some("dense"));
    assert_eq!(param(&request.search_params, "params"), Some(r#"{"nprobe":10}"#));
    assert_eq!(param(&request.search_params, "nprobe"), Some("10"));
    assert_eq!(param(&request.search_params, "metric_type"), Some("IP"));
    assert_eq!(param(&request.search_params, "topk"), Some("3"));
    assert_eq!(request.nq, 1);
    Ok(())
}

#[test]
fn batch_of_vectors_sets_nq() -> Result<()> {
    let query = SearchQuery::new(FieldValue::from(json!([[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]]))).field("dense");
    let request = single(build(&SearchRequestSpec::single("articles", query))?);
    assert_eq!(request.nq, 3);
    Ok(())
}

#[test]
fn unnamed_field_is_ambiguous_with_two_vector_fields() {
    let query = SearchQuery::new(vec![0.1f32, 0.2]);
    match build(&SearchRequestSpec::single("articles", query)) {
        Err(MarshalError::SearchConfig(reason)) => {
            assert!(reason.contains("dense"));
            assert!(reason.contains("sparse"));
        }
        other => panic!("expected a search config error, got {:?}", other),
    }
}

fn three_query_response() -> SearchResultData {
    SearchResultData {
        num_queries: 3,
        top_k: 2,
        topks: vec![2, 0, 2],
        scores: vec![0.9, 0.8, 0.7, 0.6],
        ids: Some(Ids { id_field: Some(ids::IdField::IntId(LongArray { data: vec![1, 2, 3, 4] })) }),
        output_fields: vec!["title".into()],
        primary_field_name: "id".into(),
        fields_data: vec![FieldData {
            r#type: DataType::VarChar as i32,
            field_name: "title".into(),
            field: Some(
                field_data::Field::Scalars(ScalarField {
                    data: Some(
                        scalar_field::Data::StringData(StringArray {
                            data: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                        })
                    ),
                })
            ),
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[test]
fn topks_split_hits_per_query_including_empty_ones() -> Result<()> {
    let transformers = Transformers::new();
    let batches = format_search_result(&three_query_response(), &FormatOptions::new(&transformers))?;
    let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 0, 2]);

    let third = &batches[2][0];
    assert_eq!(third["id"], FieldValue::Int(3));
    assert_eq!(third["title"], FieldValue::String("c".into()));
    assert_eq!(third["score"], FieldValue::Float(0.7f32 as f64));

    match SearchOutcome::from_batches(batches, 3) {
        SearchOutcome::Batch(all) => assert_eq!(all.len(), 3),
        other => panic!("expected a batch outcome, got {:?}", other),
    }
    Ok(())
}

#[test]
fn round_decimal_truncates_scores() -> Result<()> {
    let transformers = Transformers::new();
    let options = FormatOptions::new(&transformers).round_decimal(1);
    let batches = format_search_result(&three_query_response(), &options)?;
    assert_eq!(batches[0][0]["score"], FieldValue::Float(0.9));
    assert_eq!(batches[2][1]["score"], FieldValue::Float(0.6));
    Ok(())
}

#[test]
fn single_query_results_are_unwrapped() {
    let outcome = SearchOutcome::from_batches(vec![Vec::new()], 1);
    assert_eq!(outcome, SearchOutcome::Single(Vec::new()));
    assert!(outcome.is_empty());
}

#[test]
fn single_search_lifts_a_function_ranker() -> Result<()> {
    let query = SearchQuery::new(vec![0.5f32, 0.5]).field("dense");
    let spec = SearchRequestSpec::single("articles", query).rerank(rerank_function("recency", &["id"], Map::new()));
    let request = single(build(&spec)?);
    let score = request.function_score.expect("function score");
    assert_eq!(score.functions[0].name, "recency");
    assert_eq!(param(&request.search_params, "strategy"), None);
    Ok(())
}

#[test]
fn single_search_ignores_fusion_rankers() -> Result<()> {
    for rerank in [RerankSpec::rrf(60), RerankSpec::weighted(vec![1.0])] {
        let query = SearchQuery::new(vec![0.5f32, 0.5]).field("dense");
        let request = single(build(&SearchRequestSpec::single("articles", query).rerank(rerank))?);
        assert!(request.function_score.is_none());
        assert_eq!(param(&request.search_params, "strategy"), None);
        assert_eq!(param(&request.search_params, "params"), Some("{}"));
    }
    Ok(())
}

fn clips_schema() -> Result<CollectionSchema> {
    let declaration = CollectionDeclaration {
        name: "videos".into(),
        fields: vec![
            FieldDeclaration::new("id", DataType::Int64).primary_key(true),
            FieldDeclaration::new("clips", DataType::Array).struct_array(
                vec![FieldDeclaration::new("cv", DataType::FloatVector).dim(2)],
                8
            )
        ],
        ..Default::default()
    };
    format_collection_schema(&declaration)?.collection_schema(ConsistencyLevel::Bounded)
}

fn embedding_list_search(data: serde_json::Value) -> Result<SearchRequest> {
    let query = SearchQuery::new(FieldValue::from(data)).field("clips[cv]");
    let schema = clips_schema()?;
    let built = build_search_request(
        &SearchRequestSpec::single("videos", query),
        &schema,
        &CodecConfig::default(),
        &Transformers::new()
    )?;
    Ok(single(built.request))
}

fn entry_sizes(request: &SearchRequest) -> Vec<usize> {
    let group = PlaceholderGroup::decode(request.placeholder_group.as_slice()).expect("placeholder group");
    assert_eq!(group.placeholders.len(), 1);
    assert_eq!(group.placeholders[0].r#type(), PlaceholderType::EmbListFloatVector);
    group.placeholders[0].values.iter().map(Vec::len).collect()
}

#[test]
fn embedding_list_concatenates_one_item() -> Result<()> {
    let request = embedding_list_search(json!([[1, 2], [3, 4]]))?;
    assert_eq!(request.nq, 1);
    assert_eq!(entry_sizes(&request), vec![16]);
    Ok(())
}

#[test]
fn embedding_list_of_items_is_a_batch() -> Result<()> {
    let request = embedding_list_search(json!([[[1, 2]], [[3, 4], [5, 6]]]))?;
    assert_eq!(request.nq, 2);
    assert_eq!(entry_sizes(&request), vec![8, 16]);
    Ok(())
}

#[test]
fn score_count_must_match_topks() {
    let mut response = three_query_response();
    response.scores.push(0.5);
    let transformers = Transformers::new();
    match format_search_result(&response, &FormatOptions::new(&transformers)) {
        Err(MarshalError::Decode(reason)) => assert!(reason.contains("5 scores for 4 results")),
        other => panic!("expected a decode error, got {:?}", other.map(|b| b.len())),
    }
}
