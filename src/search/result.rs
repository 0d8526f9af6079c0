//! Turns search and query responses back into rows.

use std::collections::HashMap;

use log::debug;
use serde::Serialize;
use serde_json::Value;

use crate::codec::bytes::Transformers;
use crate::codec::dynamic::merge;
use crate::codec::rows::decode_column;
use crate::error::{ MarshalError, Result };
use crate::proto::{ ids, FieldData, Ids, QueryResults, SearchResultData };
use crate::schema::DEFAULT_DYNAMIC_FIELD;
use crate::value::{ FieldValue, RowData };

/// Key under which each hit's score is returned.
pub const SCORE_KEY: &str = "score";

#[derive(Debug, Clone, Copy)]
pub struct FormatOptions<'a> {
    /// Decimal places kept when truncating scores; `-1` keeps raw scores.
    pub round_decimal: i32,
    pub transformers: &'a Transformers,
    /// Used when no column is flagged dynamic.
    pub dynamic_field: &'a str,
    /// Return the dynamic object itself alongside its lifted keys.
    pub keep_dynamic_field: bool,
}

impl<'a> FormatOptions<'a> {
    pub fn new(transformers: &'a Transformers) -> Self {
        FormatOptions {
            round_decimal: -1,
            transformers,
            dynamic_field: DEFAULT_DYNAMIC_FIELD,
            keep_dynamic_field: false,
        }
    }

    pub fn round_decimal(mut self, digits: i32) -> Self {
        self.round_decimal = digits;
        self
    }
}

/// Rows of a search: flat for a single logical query, one list per query
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SearchOutcome {
    Single(Vec<RowData>),
    Batch(Vec<Vec<RowData>>),
}

impl SearchOutcome {
    pub fn from_batches(mut batches: Vec<Vec<RowData>>, nq: usize) -> Self {
        if nq == 1 && batches.len() <= 1 {
            SearchOutcome::Single(batches.pop().unwrap_or_default())
        } else {
            SearchOutcome::Batch(batches)
        }
    }

    pub fn into_batches(self) -> Vec<Vec<RowData>> {
        match self {
            SearchOutcome::Single(rows) => vec![rows],
            SearchOutcome::Batch(batches) => batches,
        }
    }

    /// Total number of rows across all queries.
    pub fn len(&self) -> usize {
        match self {
            SearchOutcome::Single(rows) => rows.len(),
            SearchOutcome::Batch(batches) => batches.iter().map(Vec::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decoded columns of one response, keyed by field name.
struct ColumnSet<'a> {
    columns: HashMap<&'a str, Vec<FieldValue>>,
    dynamic: Option<&'a str>,
}

impl<'a> ColumnSet<'a> {
    fn decode(fields_data: &'a [FieldData], options: &FormatOptions<'a>) -> Result<Self> {
        let mut columns = HashMap::with_capacity(fields_data.len());
        for column in fields_data {
            columns.insert(column.field_name.as_str(), decode_column(column, options.transformers)?);
        }
        let dynamic = fields_data
            .iter()
            .find(|c| c.is_dynamic)
            .map(|c| c.field_name.as_str())
            .or_else(|| columns.contains_key(options.dynamic_field).then_some(options.dynamic_field));
        Ok(ColumnSet { columns, dynamic })
    }

    fn check_len(&self, needed: usize) -> Result<()> {
        for (name, values) in &self.columns {
            if values.len() < needed {
                return Err(
                    MarshalError::decode(
                        format!("column '{}' has {} values, results need {}", name, values.len(), needed)
                    )
                );
            }
        }
        Ok(())
    }

    /// One row at `index`. Names without a column are looked up inside the
    /// dynamic object; absent keys are left out.
    fn row(&self, index: usize, output_fields: &[&str], keep_dynamic_field: bool) -> RowData {
        let mut row = RowData::new();
        let dynamic_object = self.dynamic
            .and_then(|name| self.columns.get(name))
            .and_then(|values| values.get(index))
            .map(FieldValue::to_json);
        for name in output_fields {
            if let Some(value) = self.columns.get(name).and_then(|values| values.get(index)) {
                row.insert(name.to_string(), value.clone());
            } else if let Some(Value::Object(map)) = &dynamic_object {
                if let Some(value) = map.get(*name) {
                    row.insert(name.to_string(), FieldValue::from(value.clone()));
                }
            }
        }
        match self.dynamic {
            Some(name) if row.contains_key(name) => merge(row, name, keep_dynamic_field),
            _ => row,
        }
    }
}

fn output_names<'a>(output_fields: &'a [String], fields_data: &'a [FieldData]) -> Vec<&'a str> {
    if output_fields.is_empty() {
        fields_data
            .iter()
            .map(|c| c.field_name.as_str())
            .collect()
    } else {
        output_fields.iter().map(String::as_str).collect()
    }
}

/// Splits a search response into one row list per logical query using the
/// `topks` boundaries. Each row carries `score` and the output fields.
pub fn format_search_result(data: &SearchResultData, options: &FormatOptions<'_>) -> Result<Vec<Vec<RowData>>> {
    let total = data.topks
        .iter()
        .map(|k| usize::try_from(*k).map_err(|_| MarshalError::decode(format!("negative topk {}", k))))
        .sum::<Result<usize>>()?;
    if data.scores.len() != total {
        return Err(
            MarshalError::decode(format!("{} scores for {} results", data.scores.len(), total))
        );
    }
    let columns = ColumnSet::decode(&data.fields_data, options)?;
    columns.check_len(total)?;
    let output_fields = output_names(&data.output_fields, &data.fields_data);
    let ids = id_values(data.ids.as_ref());
    let primary = data.primary_field_name.as_str();

    let mut results = Vec::with_capacity(data.topks.len());
    let mut offset = 0usize;
    for topk in &data.topks {
        let topk = *topk as usize;
        let mut hits = Vec::with_capacity(topk);
        for index in offset..offset + topk {
            let mut row = columns.row(index, &output_fields, options.keep_dynamic_field);
            if !primary.is_empty() && !row.contains_key(primary) {
                if let Some(id) = ids.get(index) {
                    row.insert(primary.to_string(), id.clone());
                }
            }
            row.insert(SCORE_KEY.to_string(), FieldValue::Float(round_score(data.scores[index], options.round_decimal)));
            hits.push(row);
        }
        results.push(hits);
        offset += topk;
    }
    debug!("Formatted {} hits across {} queries", total, results.len());
    Ok(results)
}

/// Rows of a query response, dynamic keys lifted.
pub fn format_query_result(results: &QueryResults, options: &FormatOptions<'_>) -> Result<Vec<RowData>> {
    let columns = ColumnSet::decode(&results.fields_data, options)?;
    let num_rows = columns.columns
        .values()
        .map(Vec::len)
        .max()
        .unwrap_or(0);
    columns.check_len(num_rows)?;
    let output_fields = output_names(&results.output_fields, &results.fields_data);
    let rows: Vec<RowData> = (0..num_rows)
        .map(|index| columns.row(index, &output_fields, options.keep_dynamic_field))
        .collect();
    debug!("Formatted {} query rows", rows.len());
    Ok(rows)
}

/// Primary keys carried by a response or mutation result.
pub fn id_values(ids: Option<&Ids>) -> Vec<FieldValue> {
    match ids.and_then(|i| i.id_field.as_ref()) {
        Some(ids::IdField::IntId(a)) => a.data.iter().map(|v| FieldValue::Int(*v)).collect(),
        Some(ids::IdField::StrId(a)) => a.data.iter().cloned().map(FieldValue::String).collect(),
        None => Vec::new(),
    }
}

/// Truncates (not rounds) the decimal form of `score` to `digits` places.
pub fn round_score(score: f32, digits: i32) -> f64 {
    if digits < 0 {
        return score as f64;
    }
    let text = score.to_string();
    let truncated = match text.split_once('.') {
        Some((whole, fraction)) => {
            let keep = (digits as usize).min(fraction.len());
            if keep == 0 {
                whole.to_string()
            } else {
                format!("{}.{}", whole, &fraction[..keep])
            }
        }
        None => text,
    };
    truncated.parse::<f64>().unwrap_or(score as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::{ field_data, scalar_field, JsonArray, LongArray, ScalarField, StringArray };
    use crate::registry::DataType;

    fn long_column(name: &str, values: Vec<i64>) -> FieldData {
        FieldData {
            r#type: DataType::Int64 as i32,
            field_name: name.to_string(),
            field: Some(
                field_data::Field::Scalars(ScalarField {
                    data: Some(scalar_field::Data::LongData(LongArray { data: values })),
                })
            ),
            ..Default::default()
        }
    }

    fn dynamic_column(values: &[&str]) -> FieldData {
        FieldData {
            r#type: DataType::Json as i32,
            field_name: "$meta".to_string(),
            is_dynamic: true,
            field: Some(
                field_data::Field::Scalars(ScalarField {
                    data: Some(
                        scalar_field::Data::JsonData(JsonArray {
                            data: values
                                .iter()
                                .map(|v| v.as_bytes().to_vec())
                                .collect(),
                        })
                    ),
                })
            ),
            ..Default::default()
        }
    }

    #[test]
    fn topks_slice_by_cumulative_offset() {
        let data = SearchResultData {
            topks: vec![2, 0, 2],
            scores: vec![0.9, 0.8, 0.7, 0.6],
            fields_data: vec![long_column("id", vec![1, 2, 3, 4])],
            ..Default::default()
        };
        let transformers = Transformers::new();
        let batches = format_search_result(&data, &FormatOptions::new(&transformers)).unwrap();
        assert_eq!(batches.len(), 3);
        assert_eq!(
            batches.iter().map(Vec::len).collect::<Vec<_>>(),
            vec![2, 0, 2]
        );
        assert_eq!(batches[2][0]["id"], FieldValue::Int(3));
        assert_eq!(batches[2][1]["id"], FieldValue::Int(4));
    }

    #[test]
    fn undeclared_outputs_come_from_the_dynamic_column() {
        let data = SearchResultData {
            topks: vec![2],
            scores: vec![0.5, 0.25],
            output_fields: vec!["id".into(), "color".into()],
            fields_data: vec![long_column("id", vec![7, 8]), dynamic_column(&[r#"{"color":"red"}"#, "{}"])],
            ..Default::default()
        };
        let transformers = Transformers::new();
        let batches = format_search_result(&data, &FormatOptions::new(&transformers)).unwrap();
        assert_eq!(batches[0][0]["color"], FieldValue::String("red".into()));
        assert!(!batches[0][1].contains_key("color"));
        assert!(!batches[0][0].contains_key("$meta"));
        assert_eq!(batches[0][1][SCORE_KEY], FieldValue::Float(0.25));
    }

    #[test]
    fn primary_keys_fill_in_from_ids() {
        let data = SearchResultData {
            topks: vec![1],
            scores: vec![1.0],
            ids: Some(Ids {
                id_field: Some(ids::IdField::StrId(StringArray { data: vec!["a".into()] })),
            }),
            primary_field_name: "pk".into(),
            ..Default::default()
        };
        let transformers = Transformers::new();
        let batches = format_search_result(&data, &FormatOptions::new(&transformers)).unwrap();
        assert_eq!(batches[0][0]["pk"], FieldValue::String("a".into()));
    }

    #[test]
    fn short_columns_are_a_decode_error() {
        let data = SearchResultData {
            topks: vec![3],
            scores: vec![0.1, 0.2, 0.3],
            fields_data: vec![long_column("id", vec![1])],
            ..Default::default()
        };
        let transformers = Transformers::new();
        let err = format_search_result(&data, &FormatOptions::new(&transformers)).unwrap_err();
        assert!(matches!(err, MarshalError::Decode(_)));
    }

    #[test]
    fn scores_truncate_to_the_requested_places() {
        assert_eq!(round_score(3.14159, 2), 3.14);
        assert_eq!(round_score(0.987654, 3), 0.987);
        assert_eq!(round_score(2.5, 0), 2.0);
        assert_eq!(round_score(1.0, 4), 1.0);
        assert_eq!(round_score(0.5, -1), 0.5);
    }

    #[test]
    fn single_query_outcome_is_flat() {
        let rows = vec![RowData::new(), RowData::new()];
        assert_eq!(SearchOutcome::from_batches(vec![rows.clone()], 1), SearchOutcome::Single(rows.clone()));
        let batched = SearchOutcome::from_batches(vec![rows.clone(), vec![]], 2);
        assert_eq!(batched.len(), 2);
        assert!(matches!(batched, SearchOutcome::Batch(ref b) if b.len() == 2));
        assert_eq!(SearchOutcome::from_batches(vec![], 1), SearchOutcome::Single(vec![]));
    }

    #[test]
    fn query_rows_lift_dynamic_keys() {
        let results = QueryResults {
            fields_data: vec![long_column("id", vec![1, 2]), dynamic_column(&[r#"{"n":1}"#, r#"{"n":2}"#])],
            ..Default::default()
        };
        let transformers = Transformers::new();
        let rows = format_query_result(&results, &FormatOptions::new(&transformers)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["n"], FieldValue::Int(2));
        assert!(!rows[1].contains_key("$meta"));

        let keep = FormatOptions { keep_dynamic_field: true, ..FormatOptions::new(&transformers) };
        let rows = format_query_result(&results, &keep).unwrap();
        assert!(rows[0].contains_key("$meta"));
    }
}
