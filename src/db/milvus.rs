use log::{ debug, info, warn };
use serde::Serialize;

use super::{ ClientConfig, MilvusTransport };
use crate::codec::{ build_columns, Transformers };
use crate::error::{ MarshalError, Result };
use crate::proto::{ InsertRequest, MutationResult, Status };
use crate::registry::{ ConsistencyLevel, ErrorCode };
use crate::schema::CollectionSchema;
use crate::search::{
    build_query_request,
    build_search_request,
    format_query_result,
    format_search_result,
    id_values,
    FormatOptions,
    QuerySpec,
    SearchOutcome,
    SearchRequestSpec,
    WireSearchRequest,
};
use crate::value::{ FieldValue, RowData };

/// What a write reports back.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MutationSummary {
    pub ids: Vec<FieldValue>,
    pub insert_count: i64,
    pub upsert_count: i64,
    pub succ_index: Vec<u32>,
    pub err_index: Vec<u32>,
    pub timestamp: u64,
}

impl MutationSummary {
    fn from_result(result: &MutationResult) -> Self {
        MutationSummary {
            ids: id_values(result.ids.as_ref()),
            insert_count: result.insert_cnt,
            upsert_count: result.upsert_cnt,
            succ_index: result.succ_index.clone(),
            err_index: result.err_index.clone(),
            timestamp: result.timestamp,
        }
    }
}

/// Describe, build, send and format over a [`MilvusTransport`].
///
/// Nothing is cached between calls. The `*_with_schema` variants take an
/// already described schema; a caller that keeps one around refreshes it
/// with [`MilvusDataClient::describe`] after a `SchemaMismatch`.
pub struct MilvusDataClient<T: MilvusTransport> {
    transport: T,
    config: ClientConfig,
    transformers: Transformers,
}

impl<T: MilvusTransport> MilvusDataClient<T> {
    pub fn new(transport: T, config: ClientConfig) -> Self {
        Self {
            transport,
            config,
            transformers: Transformers::default(),
        }
    }

    pub fn with_transformers(mut self, transformers: Transformers) -> Self {
        self.transformers = transformers;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn describe(&self, collection_name: &str) -> Result<CollectionSchema> {
        debug!("Describing collection '{}' in db '{}'", collection_name, self.config.db_name);
        let response = self.transport
            .describe_collection(&self.config.db_name, collection_name).await
            .map_err(MarshalError::Transport)?;
        check_status(response.status.as_ref())?;

        let mut schema = CollectionSchema::from_describe(&response)?.with_dynamic_field_name(
            &self.config.codec.dynamic_field_name
        );
        if ConsistencyLevel::try_from(response.consistency_level).is_err() {
            debug!(
                "Unknown consistency level {} for '{}', using {:?}",
                response.consistency_level,
                collection_name,
                self.config.codec.consistency_level
            );
            schema.consistency_level = self.config.codec.consistency_level;
        }
        Ok(schema)
    }

    pub async fn insert(&self, collection_name: &str, rows: &[RowData]) -> Result<MutationSummary> {
        let schema = self.describe(collection_name).await?;
        self.insert_with_schema(&schema, rows).await
    }

    pub async fn insert_with_schema(&self, schema: &CollectionSchema, rows: &[RowData]) -> Result<MutationSummary> {
        let request = self.build_write(schema, rows)?;
        info!("Inserting {} rows into '{}'", request.num_rows, request.collection_name);
        let result = self.transport.insert(request).await.map_err(MarshalError::Transport)?;
        summarize(&result)
    }

    pub async fn upsert(&self, collection_name: &str, rows: &[RowData]) -> Result<MutationSummary> {
        let schema = self.describe(collection_name).await?;
        self.upsert_with_schema(&schema, rows).await
    }

    pub async fn upsert_with_schema(&self, schema: &CollectionSchema, rows: &[RowData]) -> Result<MutationSummary> {
        let request = self.build_write(schema, rows)?;
        info!("Upserting {} rows into '{}'", request.num_rows, request.collection_name);
        let result = self.transport.upsert(request).await.map_err(MarshalError::Transport)?;
        summarize(&result)
    }

    /// Single or hybrid search, depending on `spec.queries`.
    pub async fn search(&self, spec: &SearchRequestSpec) -> Result<SearchOutcome> {
        let schema = self.describe(&spec.collection_name).await?;
        self.search_with_schema(&schema, spec).await
    }

    pub async fn search_with_schema(&self, schema: &CollectionSchema, spec: &SearchRequestSpec) -> Result<SearchOutcome> {
        let built = build_search_request(spec, schema, &self.config.codec, &self.transformers)?;
        let db_name = &self.config.db_name;
        let response = (match built.request {
            WireSearchRequest::Single(mut request) => {
                request.db_name = db_name.clone();
                debug!("Sending search to '{}' (nq={})", request.collection_name, request.nq);
                self.transport.search(request).await
            }
            WireSearchRequest::Hybrid(mut request) => {
                request.db_name = db_name.clone();
                for sub in &mut request.requests {
                    sub.db_name = db_name.clone();
                }
                debug!(
                    "Sending hybrid search to '{}' ({} sub-requests)",
                    request.collection_name,
                    request.requests.len()
                );
                self.transport.hybrid_search(request).await
            }
        }).map_err(MarshalError::Transport)?;
        check_status(response.status.as_ref())?;

        let options = self.format_options(schema, &spec.output_fields).round_decimal(built.round_decimal);
        let batches = match response.results.as_ref() {
            Some(data) => format_search_result(data, &options)?,
            None => Vec::new(),
        };
        Ok(SearchOutcome::from_batches(batches, built.nq))
    }

    pub async fn query(&self, spec: &QuerySpec) -> Result<Vec<RowData>> {
        let schema = self.describe(&spec.collection_name).await?;
        self.query_with_schema(&schema, spec).await
    }

    pub async fn query_with_schema(&self, schema: &CollectionSchema, spec: &QuerySpec) -> Result<Vec<RowData>> {
        let mut request = build_query_request(spec, schema, &self.config.codec)?;
        request.db_name = self.config.db_name.clone();
        debug!("Sending query to '{}': {}", request.collection_name, request.expr);
        let response = self.transport.query(request).await.map_err(MarshalError::Transport)?;
        check_status(response.status.as_ref())?;
        format_query_result(&response, &self.format_options(schema, &spec.output_fields))
    }

    fn build_write(&self, schema: &CollectionSchema, rows: &[RowData]) -> Result<InsertRequest> {
        if rows.is_empty() {
            return Err(MarshalError::invalid_value("rows", 0, "at least one row is required"));
        }
        let fields_data = build_columns(schema, rows, &self.transformers)?;
        Ok(InsertRequest {
            db_name: self.config.db_name.clone(),
            collection_name: schema.name.clone(),
            partition_name: self.config.partition_name.clone().unwrap_or_default(),
            fields_data,
            num_rows: rows.len() as u32,
            ..Default::default()
        })
    }

    fn format_options<'a>(&'a self, schema: &'a CollectionSchema, output_fields: &[String]) -> FormatOptions<'a> {
        let dynamic_field = schema.dynamic_field.as_deref().unwrap_or(&self.config.codec.dynamic_field_name);
        FormatOptions {
            keep_dynamic_field: output_fields.iter().any(|f| f == dynamic_field),
            dynamic_field,
            ..FormatOptions::new(&self.transformers)
        }
    }
}

fn summarize(result: &MutationResult) -> Result<MutationSummary> {
    check_status(result.status.as_ref())?;
    let summary = MutationSummary::from_result(result);
    if !summary.err_index.is_empty() {
        warn!("{} rows were rejected by the server", summary.err_index.len());
    }
    Ok(summary)
}

/// Maps a non-success status to an error. A stale schema is reported as
/// the retryable [`MarshalError::SchemaMismatch`].
pub fn check_status(status: Option<&Status>) -> Result<()> {
    let Some(status) = status else {
        return Ok(());
    };
    if status.error_code == (ErrorCode::SchemaMismatch as i32) {
        warn!("Server reported a stale collection schema: {}", status.reason);
        return Err(MarshalError::SchemaMismatch { reason: status.reason.clone() });
    }
    if status.error_code != (ErrorCode::Success as i32) || status.code != 0 {
        let code = if status.code != 0 { status.code } else { status.error_code };
        return Err(MarshalError::Server { code, reason: status.reason.clone() });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{ ids, Ids, LongArray };

    #[test]
    fn success_status_passes() {
        assert!(check_status(None).is_ok());
        assert!(check_status(Some(&Status::default())).is_ok());
    }

    #[test]
    fn schema_mismatch_is_retryable() {
        let status = Status {
            error_code: ErrorCode::SchemaMismatch as i32,
            reason: "collection schema mismatch".into(),
            ..Default::default()
        };
        let err = check_status(Some(&status)).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn other_failures_carry_their_code() {
        let status = Status { code: 100, reason: "collection not found".into(), ..Default::default() };
        match check_status(Some(&status)) {
            Err(MarshalError::Server { code, reason }) => {
                assert_eq!(code, 100);
                assert_eq!(reason, "collection not found");
            }
            other => panic!("unexpected {:?}", other),
        }
        let legacy = Status { error_code: ErrorCode::IllegalArgument as i32, ..Default::default() };
        assert!(matches!(check_status(Some(&legacy)), Err(MarshalError::Server { code: 5, .. })));
    }

    #[test]
    fn mutation_summary_lifts_ids() {
        let result = MutationResult {
            ids: Some(Ids { id_field: Some(ids::IdField::IntId(LongArray { data: vec![7, 8] })) }),
            insert_cnt: 2,
            succ_index: vec![0, 1],
            ..Default::default()
        };
        let summary = summarize(&result).unwrap();
        assert_eq!(summary.ids, vec![FieldValue::Int(7), FieldValue::Int(8)]);
        assert_eq!(summary.insert_count, 2);
        assert!(summary.err_index.is_empty());
    }
}
